//! Terminal output for `depsync --list`.

use crate::manifest::DependencyRecord;
use colored::*;

const COLUMNS: [&str; 4] = ["Name", "Path", "Repository", "Commit"];
const MIN_COLUMN: usize = 8;

/// Render records as a box-drawn table sized to `max_width`.
pub fn render_records(records: &[DependencyRecord], max_width: usize) -> String {
    let rows: Vec<[String; 4]> = records.iter().map(row_cells).collect();

    let mut widths = COLUMNS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    shrink_to_fit(&mut widths, max_width);

    let rule = |left: &str, mid: &str, right: &str| {
        let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        format!("  {}{}{}", left, segments.join(mid), right)
    };
    let line = |cells: &[String], bold: bool| {
        let mut out = String::from("  │");
        for (cell, &width) in cells.iter().zip(&widths) {
            let text = console::truncate_str(cell, width, "...");
            let padding = width.saturating_sub(console::measure_text_width(&text));
            let text = if bold {
                text.bold().to_string()
            } else {
                text.to_string()
            };
            out.push_str(&format!(" {}{} │", text, " ".repeat(padding)));
        }
        out
    };

    let header: Vec<String> = COLUMNS.iter().map(|c| c.to_string()).collect();
    let mut lines = vec![
        rule("┌", "┬", "┐"),
        line(&header, true),
        rule("├", "┼", "┤"),
    ];
    lines.extend(rows.iter().map(|row| line(row, false)));
    lines.push(rule("└", "┴", "┘"));
    lines.join("\n")
}

pub fn print_records(records: &[DependencyRecord]) {
    if records.is_empty() {
        println!("{} No matching dependencies in manifest.", "ℹ".blue());
        return;
    }
    let (_height, width) = console::Term::stdout().size();
    println!("{}", render_records(records, width as usize));

    let incomplete = records.iter().filter(|r| !r.is_complete()).count();
    if incomplete > 0 {
        println!(
            "{} {} record(s) lack a repository or commit and would abort a sync.",
            "!".yellow(),
            incomplete
        );
    }
}

fn row_cells(record: &DependencyRecord) -> [String; 4] {
    let missing = || "-".to_string();
    [
        record.name.clone(),
        record.path.clone(),
        record.repository_url.clone().unwrap_or_else(missing),
        record.commit_hash.clone().unwrap_or_else(missing),
    ]
}

/// Trim the widest column one char at a time until the table fits.
fn shrink_to_fit(widths: &mut [usize], max_width: usize) {
    let overhead = 3 + 3 * widths.len();
    let available = max_width.saturating_sub(overhead);

    while widths.iter().sum::<usize>() > available {
        let Some(widest) = widths
            .iter_mut()
            .filter(|w| **w > MIN_COLUMN)
            .max_by_key(|w| **w)
        else {
            break;
        };
        *widest -= 1;
    }
}
