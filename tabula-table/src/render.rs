use std::fmt;
use crate::{Table, TableView};

// Column-aligned text rendering. Columns without a format are hidden.
impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let schema = self.schema();
        let shown: Vec<usize> = (0..schema.len()).filter(|&i| schema.format_at(i).is_some()).collect();
        let mut cells: Vec<Vec<String>> = Vec::with_capacity(self.len() + 2);
        cells.push(shown.iter().map(|&i| schema.name(i).to_string()).collect());
        cells.push(shown.iter().map(|&i| schema.type_at(i).to_string()).collect());
        for row in self.rows() {
            cells.push(
                shown
                    .iter()
                    .map(|&i| match schema.format_at(i) {
                        Some(fmt) => fmt.render(&row[i]),
                        None => String::new(),
                    })
                    .collect(),
            );
        }
        let widths: Vec<usize> = (0..shown.len())
            .map(|c| cells.iter().map(|r| r[c].chars().count()).max().unwrap_or(0))
            .collect();
        if let Some(title) = self.title() {
            writeln!(f, "{title}")?;
        }
        for (n, row) in cells.iter().enumerate() {
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(cell, w)| format!("{cell:<w$}"))
                .collect();
            writeln!(f, "{}", line.join("  ").trim_end())?;
            if n == 1 {
                let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
                writeln!(f, "{}", rule.join("  "))?;
            }
        }
        Ok(())
    }
}
