use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{done, emphasis, heading, in_progress};

/// Spinner over the two phases of a chain run: resolving the chain on the
/// server, then rendering the report.
pub struct PhaseProgress {
    pb: ProgressBar,
}

impl PhaseProgress {
    pub fn start_resolving(what: &str) -> Self {
        eprintln!("{}  {}", emphasis("⚙️"), heading("Phases"));
        let pb = create_spinner(in_progress(format!("Phase 1/2: Resolving {what}")).to_string());
        Self { pb }
    }

    pub fn finish_resolving_start_report(self, suites: usize) -> Self {
        self.pb.finish_with_message(
            done(format!("Phase 1/2: Resolved chain with {suites} suites ✓")).to_string(),
        );
        let pb = create_spinner(in_progress("Phase 2/2: Building report").to_string());
        Self { pb }
    }

    pub fn finish_report(self) {
        self.pb
            .finish_with_message(done("Phase 2/2: Report ready ✓").to_string());
        eprintln!();
    }

    /// Stops the spinner when resolution fails.
    pub fn abandon(self, reason: &str) {
        self.pb.abandon_with_message(reason.to_string());
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
        pb.set_style(spinner_style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
