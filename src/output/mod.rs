mod exports;
mod progress;
mod styling;
mod summary;
mod tables;

pub use exports::export_json;
pub use progress::PhaseProgress;
pub use styling::{label, title};
pub use summary::print_summary;

/// Prints the `ChainLens` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        title("🔗 ChainLens"),
        label(env!("CARGO_PKG_VERSION")),
        label("Build-chain failure triage")
    );
}
