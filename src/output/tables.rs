use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

/// Suite result: crashes and timeouts red, other problems yellow.
pub fn result_cell(result: &str) -> Cell {
    match result {
        "" => Cell::new("Tests").fg(TableColor::Yellow),
        "JVM CRASH" | "TIMEOUT" | "Out Of Memory Error" => Cell::new(result).fg(TableColor::Red),
        _ => Cell::new(result).fg(TableColor::Yellow),
    }
}

/// Historical failure percentage, e.g. `"12.5"`.
pub fn fail_rate_cell(fail_rate: Option<&str>) -> Cell {
    let Some(text) = fail_rate else {
        return Cell::new("N/A").fg(TableColor::DarkGrey);
    };

    let rate: f64 = text.parse().unwrap_or(0.0);
    let text = format!("{text}%");
    if rate >= 50.0 {
        Cell::new(text).fg(TableColor::Red)
    } else if rate >= 25.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Green)
    }
}

/// Running/queued counts; unknown while the queries are still in flight.
pub fn scheduled_cell(running: Option<usize>, queued: Option<usize>) -> Cell {
    let show = |count: Option<usize>| count.map_or_else(|| "?".to_string(), |c| c.to_string());

    if running.is_none() && queued.is_none() {
        return Cell::new("-").fg(TableColor::DarkGrey);
    }

    Cell::new(format!("{} / {}", show(running), show(queued)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduled_cell_text() {
        assert_eq!(scheduled_cell(None, None).content(), "-");
        assert_eq!(scheduled_cell(Some(1), None).content(), "1 / ?");
        assert_eq!(scheduled_cell(Some(1), Some(4)).content(), "1 / 4");
    }

    #[test]
    fn test_result_cell_text() {
        assert_eq!(result_cell("").content(), "Tests");
        assert_eq!(result_cell("TIMEOUT").content(), "TIMEOUT");
        assert_eq!(fail_rate_cell(None).content(), "N/A");
        assert_eq!(fail_rate_cell(Some("12.5")).content(), "12.5%");
    }
}
