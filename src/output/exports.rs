use anyhow::Result;
use std::io::Write;

use crate::report::ChainReport;

/// Writes the report as JSON, one document per call.
pub fn export_json(report: &ChainReport, pretty: bool, output: &mut dyn Write) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(report)?
    };
    writeln!(output, "{json}")?;
    Ok(())
}
