//! Log-facing formatting helpers for progress reporting.

/// Format a one-row status table, each column padded to the wider of its
/// header and cell.
pub fn format_table(headers: &[&str], row: &[String]) -> String {
    let widths: Vec<usize> = headers
        .iter()
        .zip(row)
        .map(|(header, cell)| header.len().max(cell.len()))
        .collect();

    let header_line: Vec<String> = headers
        .iter()
        .zip(widths.iter().copied())
        .map(|(header, width)| format!("{header:<width$}"))
        .collect();
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let cells: Vec<String> = row
        .iter()
        .zip(widths.iter().copied())
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();

    format!(
        "| {} |\n|-{}-|\n| {} |\n",
        header_line.join(" | "),
        separator.join("-|-"),
        cells.join(" | ")
    )
}

/// Format elapsed seconds as "Xm Ys" or "Ys".
pub fn format_elapsed(secs: u64) -> String {
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
