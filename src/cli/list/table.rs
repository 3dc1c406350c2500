use std::fmt::{self, Write};

/// One line of a table. Cells are plain text.
pub(crate) struct Row {
    cells: Vec<String>,
}

impl Row {
    fn is_awk_safe(&self) -> bool {
        !self
            .cells
            .iter()
            .any(|cell| cell.contains(|c: char| c.is_whitespace()))
    }
}

impl From<Vec<String>> for Row {
    fn from(value: Vec<String>) -> Self {
        Row { cells: value }
    }
}

impl From<Vec<&str>> for Row {
    fn from(value: Vec<&str>) -> Self {
        Row {
            cells: value.into_iter().map(str::to_owned).collect(),
        }
    }
}

/// A whitespace-aligned table. Header cells never contain whitespace, so the
/// output can be split into columns with `awk`.
pub(crate) struct Table {
    header: Row,
    body: Vec<Row>,
    print_header: bool,
}

impl Table {
    pub(crate) fn with_header<R: Into<Row>>(header: R) -> Table {
        let header = header.into();

        debug_assert!(header.is_awk_safe(), "table header contains whitespace");

        Table {
            header,
            body: Vec::new(),
            print_header: true,
        }
    }

    pub(crate) fn print_header(&mut self, print_header: bool) {
        self.print_header = print_header;
    }

    pub(crate) fn add_row<R: Into<Row>>(&mut self, row: R) {
        let row = row.into();

        debug_assert_eq!(
            row.cells.len(),
            self.header.cells.len(),
            "row width does not match the header"
        );

        self.body.push(row);
    }

    fn visible_rows(&self) -> impl Iterator<Item = &Row> {
        let header = if self.print_header {
            Some(&self.header)
        } else {
            None
        };

        header.into_iter().chain(self.body.iter())
    }

    fn column_widths(&self) -> Vec<usize> {
        let mut widths = vec![0usize; self.header.cells.len()];

        for row in self.visible_rows() {
            for (width, cell) in widths.iter_mut().zip(&row.cells) {
                *width = (*width).max(cell.chars().count());
            }
        }

        widths
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.column_widths();

        for row in self.visible_rows() {
            let last = row.cells.len().saturating_sub(1);

            for (i, (cell, width)) in row.cells.iter().zip(&widths).enumerate() {
                if i == last {
                    // No trailing padding
                    f.write_str(cell)?;
                } else {
                    write!(f, "{:<width$}  ", cell, width = *width)?;
                }
            }

            f.write_char('\n')?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment() {
        let mut table = Table::with_header(vec!["PROVIDER", "PRIORITY"]);
        table.add_row(vec!["openai", "10"]);
        table.add_row(vec!["ollama", "20"]);

        assert_eq!(
            table.to_string(),
            "PROVIDER  PRIORITY\nopenai    10\nollama    20\n"
        );

        table.print_header(false);

        assert_eq!(table.to_string(), "openai  10\nollama  20\n");
    }
}
