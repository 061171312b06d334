use std::collections::HashMap;

use crate::chain::log_check::{LogCheckResult, TestLogCheckResult};

const TEST_STARTED: &str = "##teamcity[testStarted name='";
const TEST_FINISHED: &str = "##teamcity[testFinished name='";
const THREAD_DUMP_START: &str = "Full thread dump";
const THREAD_DUMP_END: &str = "JNI global references";

/// Log lines worth showing next to a failed test.
const WARN_MARKERS: &[&str] = &[
    "java.lang.AssertionError",
    "java.lang.OutOfMemoryError",
    "LEAK:",
    "Critical system error detected",
    "Found long running cache future",
    "Possible starvation in striped pool",
];

/// Single pass over a TeamCity build log.
#[derive(Debug, Default)]
pub struct LogScanner {
    current_test: Option<String>,
    last_started_test: Option<String>,
    dump: Option<Vec<String>>,
    last_thread_dump: Option<String>,
    tests: HashMap<String, TestLogCheckResult>,
}

impl LogScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed_line(&mut self, line: &str) {
        if let Some(name) = service_message_name(line, TEST_STARTED) {
            self.finish_dump();
            self.tests.entry(name.clone()).or_default();
            self.last_started_test = Some(name.clone());
            self.current_test = Some(name);
            return;
        }

        if let Some(name) = service_message_name(line, TEST_FINISHED) {
            if self.current_test.as_deref() == Some(name.as_str()) {
                self.current_test = None;
            }
            return;
        }

        if line.contains(THREAD_DUMP_START) {
            self.finish_dump();
            self.dump = Some(vec![line.to_string()]);
        } else if let Some(dump) = self.dump.as_mut() {
            dump.push(line.to_string());
            if line.contains(THREAD_DUMP_END) {
                self.finish_dump();
            }
        }

        if let Some(test) = &self.current_test {
            let entry = self.tests.entry(test.clone()).or_default();
            entry.log_size_bytes += line.len() as u64 + 1;
            if WARN_MARKERS.iter().any(|marker| line.contains(marker)) {
                entry.warns.push(line.trim().to_string());
            }
        }
    }

    fn finish_dump(&mut self) {
        if let Some(lines) = self.dump.take() {
            self.last_thread_dump = Some(lines.join("\n"));
        }
    }

    pub fn finish(mut self) -> LogCheckResult {
        self.finish_dump();

        LogCheckResult {
            last_started_test: self.current_test.or(self.last_started_test),
            last_thread_dump: self.last_thread_dump,
            test_log_check_result: self.tests,
        }
    }
}

pub fn analyze_log(text: &str) -> LogCheckResult {
    let mut scanner = LogScanner::new();
    for line in text.lines() {
        scanner.feed_line(line);
    }
    scanner.finish()
}

/// Value of the `name` attribute of a service message, unescaped.
fn service_message_name(line: &str, prefix: &str) -> Option<String> {
    let start = line.find(prefix)? + prefix.len();
    let rest = &line[start..];

    let mut name = String::new();
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '|' => match chars.next()? {
                'n' => name.push('\n'),
                'r' => name.push('\r'),
                other => name.push(other),
            },
            '\'' => return Some(name),
            c => name.push(c),
        }
    }

    None
}
