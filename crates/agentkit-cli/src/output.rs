use serde::Serialize;

/// Cells longer than this are cut and end in `…`.
const MAX_CELL: usize = 48;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

/// Left-aligned columns sized by character count, a dashed rule under the
/// header, no trailing spaces.
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let clipped: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().take(headers.len()).map(|c| clip(c)).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &clipped {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let header: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    push_line(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, &rule, &widths);
    for row in &clipped {
        push_line(&mut out, row, &widths);
    }
    out
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let mut line = String::new();
    for (i, (cell, w)) in cells.iter().zip(widths).enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        line.push_str(cell);
        let pad = w.saturating_sub(cell.chars().count());
        line.extend(std::iter::repeat(' ').take(pad));
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

fn clip(cell: &str) -> String {
    if cell.chars().count() <= MAX_CELL {
        return cell.to_string();
    }
    let mut cut: String = cell.chars().take(MAX_CELL - 1).collect();
    cut.push('…');
    cut
}
