use std::fmt::Write;

use comfy_table::{Cell, Color as TableColor};

use crate::report::{ChainReport, SuiteReport};

use super::styling::{emphasis, failure_count, heading, label, value, warning};
use super::tables::{create_table, cyan_header, fail_rate_cell, result_cell, scheduled_cell};

/// Failures listed per suite before the rest is elided.
const FAILURES_PER_SUITE: usize = 5;

/// Prints a human-readable triage summary of a chain to stdout.
///
/// Shows the chain overview, a table of failed suites in ranking order and,
/// per suite, the failing tests with their log warnings.
pub fn print_summary(report: &ChainReport) {
    println!("{}", render_summary(report));
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", emphasis(emoji), heading(title));
}

fn suite_label(suite: &SuiteReport) -> String {
    match &suite.contact_person {
        Some(person) => format!("{}\n{}", suite.name, person),
        None => suite.name.clone(),
    }
}

fn render_suite_failures(output: &mut String, suite: &SuiteReport) {
    let _ = writeln!(output, "  {} {}", value("•"), emphasis(&suite.name));

    for failure in suite.test_failures.iter().take(FAILURES_PER_SUITE) {
        let occurrences = if failure.occurrences > 1 {
            format!(" x{}", failure.occurrences)
        } else {
            String::new()
        };
        let _ = writeln!(output, "      {}{}", failure.name, label(occurrences));
        for line in &failure.warnings {
            let _ = writeln!(output, "        {}", warning(line));
        }
    }

    if suite.test_failures.len() > FAILURES_PER_SUITE {
        let _ = writeln!(
            output,
            "      {}",
            label(format!(
                "... and {} more",
                suite.test_failures.len() - FAILURES_PER_SUITE
            ))
        );
    }

    for consumer in &suite.log_consumers {
        let _ = writeln!(output, "      {} {}", label("log:"), consumer.name);
    }

    if let Some(url) = &suite.web_url_thread_dump {
        let _ = writeln!(output, "      {} {}", label("thread dump:"), url);
    }
}

fn render_summary(report: &ChainReport) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "🔗", "Chain");
    let _ = write!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n\n",
        label("Chain:"),
        value(&report.suite_name),
        label("Branch:"),
        value(&report.branch_name),
        label("Build:"),
        value(&report.web_to_build),
        label("Suites:"),
        emphasis(report.total_suites),
        label("Failed suites:"),
        failure_count(report.failed_suites.len()),
        label("Failed tests:"),
        failure_count(report.failed_tests),
        label("Duration:"),
        label(&report.duration_printable)
    );

    if report.failed_suites.is_empty() {
        let _ = writeln!(output, "{}", warning("No failed suites found."));
        return output;
    }

    add_section_header(
        &mut output,
        "❌",
        &format!("Failed Suites (by {})", report.ranking),
    );

    let mut suites_table = create_table();
    suites_table.set_header(cyan_header(&[
        "#",
        "Suite",
        "Result",
        "Tests",
        "Fail Rate",
        "Running / Queued",
        "Duration",
    ]));

    for (idx, suite) in report.failed_suites.iter().enumerate() {
        suites_table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(suite_label(suite)),
            result_cell(&suite.result),
            Cell::new(suite.failed_tests).fg(if suite.failed_tests > 0 {
                TableColor::Red
            } else {
                TableColor::Green
            }),
            fail_rate_cell(suite.failure_rate.as_deref()),
            scheduled_cell(suite.running_build_count, suite.queued_build_count),
            Cell::new(&suite.duration_printable),
        ]);
    }

    let _ = writeln!(output, "{suites_table}\n");

    add_section_header(&mut output, "🧪", "Failures");
    for suite in &report.failed_suites {
        render_suite_failures(&mut output, suite);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::TestFailureReport;
    use chrono::Utc;

    fn suite(name: &str, failures: usize) -> SuiteReport {
        SuiteReport {
            name: name.to_string(),
            suite_id: format!("Ignite_{name}"),
            branch_name: "<default>".to_string(),
            result: String::new(),
            web_to_hist: String::new(),
            web_to_build: String::new(),
            contact_person: Some("Alice".to_string()),
            test_failures: (0..failures)
                .map(|i| TestFailureReport {
                    name: format!("{name}Test.test{i}"),
                    occurrences: 1,
                    ..TestFailureReport::default()
                })
                .collect(),
            top_long_running: vec![],
            warn_only: vec![],
            log_consumers: vec![],
            web_url_thread_dump: None,
            running_build_count: Some(1),
            queued_build_count: None,
            failures: None,
            runs: None,
            failure_rate: Some("40.0".to_string()),
            user_commits: String::new(),
            failed_tests: failures,
            duration_printable: "5m 00s".to_string(),
        }
    }

    fn report(failed_suites: Vec<SuiteReport>) -> ChainReport {
        ChainReport {
            server_id: "apache".to_string(),
            suite_id: "Ignite_RunAll".to_string(),
            suite_name: "Run All".to_string(),
            branch_name: "<default>".to_string(),
            build_id: Some(1),
            web_to_build: "https://ci.example.org/viewLog.html?buildId=1".to_string(),
            web_to_hist: String::new(),
            collected_at: Utc::now(),
            ranking: "name".to_string(),
            total_suites: 3,
            failed_tests: failed_suites.iter().map(|s| s.failed_tests).sum(),
            failed_to_finish: 0,
            duration_printable: "1h 00m 00s".to_string(),
            failed_suites,
        }
    }

    #[test]
    fn test_render_summary_without_failures() {
        let output = render_summary(&report(vec![]));

        assert!(output.contains("Run All"));
        assert!(output.contains("No failed suites found."));
        assert!(!output.contains("Failed Suites"));
    }

    #[test]
    fn test_render_summary_lists_failed_suites() {
        let output = render_summary(&report(vec![suite("Cache", 7), suite("Queries", 1)]));

        assert!(output.contains("Failed Suites (by name)"));
        assert!(output.contains("Cache"));
        assert!(output.contains("Alice"));
        assert!(output.contains("40.0%"));
        assert!(output.contains("1 / ?"));
        assert!(output.contains("CacheTest.test4"));
        assert!(!output.contains("CacheTest.test5"));
        assert!(output.contains("... and 2 more"));
        assert!(output.contains("QueriesTest.test0"));
    }
}
