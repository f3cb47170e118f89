/// Monospace text table for WhatsApp messages (rendered inside a ``` block)
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    col_widths: Vec<usize>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Table {
            col_widths: headers.iter().map(|h| h.chars().count()).collect(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        for (width, col) in self.col_widths.iter_mut().zip(&row) {
            *width = (*width).max(col.chars().count());
        }
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let mut output = String::from("```\n");
        output.push_str(&self.render_row(&self.headers));
        output.push('\n');
        output.push_str(
            &self
                .col_widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("-+-"),
        );
        output.push('\n');
        for row in &self.rows {
            output.push_str(&self.render_row(row));
            output.push('\n');
        }
        output.push_str("```");
        output
    }

    // `{:<width$}` pads by chars, so accented descriptions stay aligned
    fn render_row(&self, row: &[String]) -> String {
        row.iter()
            .zip(&self.col_widths)
            .map(|(col, &width)| format!("{:<width$}", col, width = width))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accented_rows_align() {
        let mut table = Table::new(&["Fecha", "Descripción", "Monto"]);
        table.add_row(vec!["03/05".into(), "mercancía".into(), "-75.25".into()]);
        table.add_row(vec!["02/05".into(), "3 coca colas".into(), "45.00".into()]);

        let rendered = table.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "```");
        assert!(lines[1].starts_with("Fecha | Descripción "));

        let columns = |line: &str, sep: char| -> Vec<usize> {
            line.chars()
                .enumerate()
                .filter(|(_, c)| *c == sep)
                .map(|(i, _)| i)
                .collect()
        };
        let separators = columns(lines[2], '+');
        assert_eq!(columns(lines[3], '|'), separators);
        assert_eq!(columns(lines[4], '|'), separators);
        assert!(rendered.ends_with("```"));
    }
}
