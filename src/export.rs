//! Side-by-side delimited-text export of session tables.
//!
//! Each profile turns its channels into one or more [`Table`]s; the
//! [`ExportFormatter`] lays them out next to each other with a block of empty
//! margin columns between neighbours. A table that runs out of rows before the
//! longest one is padded with as many empty fields as it has columns, so every
//! line carries the same number of fields.
//!
//! ```text
//! Time,Formatted Time,Patch ECG,Patch Pace,,,,Time,Formatted Time,Respiration
//! 00.00,00:00:00:00,0.12,0.074,,,,00.00,00:00:00:00,3.5
//! 00.01,00:00:00:01,0.11,1.074,,,,,,
//! ```

use crate::types::Sample;

/// Empty columns inserted between adjacent tables.
pub const DEFAULT_MARGIN: usize = 3;

/// One exported table: a header row and data rows of equal width.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: AsRef<str>>(headers: &[S]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.as_ref().to_owned()).collect(),
            rows: Vec::new(),
        }
    }

    /// `Time, Formatted Time, <name>` rows for a single channel snapshot.
    pub fn from_samples(value_header: &str, samples: &[Sample]) -> Self {
        let mut table = Self::new(&["Time", "Formatted Time", value_header]);
        for s in samples {
            table.push_row(vec![s.time_column(), s.timestamp_label.clone(), s.value.to_string()]);
        }
        table
    }

    /// Rows shorter than the header are padded; longer ones are cut.
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.width(), String::new());
        self.rows.push(row);
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Joins tables column-wise into comma-separated text.
///
/// Output is a pure function of the input tables: no sorting, no clocks, no
/// locale-dependent formatting.
#[derive(Debug, Clone)]
pub struct ExportFormatter {
    margin: usize,
    line_ending: &'static str,
}

impl Default for ExportFormatter {
    fn default() -> Self {
        Self {
            margin: DEFAULT_MARGIN,
            line_ending: "\r\n",
        }
    }
}

impl ExportFormatter {
    pub fn new(margin: usize, line_ending: &'static str) -> Self {
        Self {
            margin,
            line_ending,
        }
    }

    pub fn format(&self, tables: &[Table]) -> String {
        let rows = tables.iter().map(Table::len).max().unwrap_or(0);
        let mut out = String::new();

        self.write_line(&mut out, tables.iter().map(|t| t.headers.as_slice()));
        let empty: Vec<Vec<String>> = tables.iter().map(|t| vec![String::new(); t.width()]).collect();
        for i in 0..rows {
            let cells = tables
                .iter()
                .zip(&empty)
                .map(|(t, pad)| t.rows.get(i).unwrap_or(pad).as_slice());
            self.write_line(&mut out, cells);
        }
        out
    }

    fn write_line<'a>(&self, out: &mut String, blocks: impl Iterator<Item = &'a [String]>) {
        let gap = ",".repeat(self.margin + 1);
        for (n, block) in blocks.enumerate() {
            if n > 0 {
                out.push_str(&gap);
            }
            out.push_str(&block.join(","));
        }
        out.push_str(self.line_ending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: usize, tag: &str) -> Table {
        let mut t = Table::new(headers);
        for r in 0..rows {
            t.push_row((0..headers.len()).map(|c| format!("{tag}{r}{c}")).collect());
        }
        t
    }

    #[test]
    fn pads_exhausted_tables() {
        let a = table(&["a0", "a1", "a2", "a3"], 5, "a");
        let b = table(&["b0", "b1", "b2"], 3, "b");
        let out = ExportFormatter::default().format(&[a, b]);
        let lines: Vec<&str> = out.split("\r\n").filter(|l| !l.is_empty()).collect();

        assert_eq!(lines.len(), 6);
        for line in &lines {
            assert_eq!(line.split(',').count(), 4 + 3 + 3);
        }
        assert_eq!(lines[0], "a0,a1,a2,a3,,,,b0,b1,b2");
        assert_eq!(lines[3], "a20,a21,a22,a23,,,,b20,b21,b22");
        assert_eq!(lines[4], "a30,a31,a32,a33,,,,,,");
        assert_eq!(lines[5], "a40,a41,a42,a43,,,,,,");
    }

    #[test]
    fn shorter_first_table_is_padded_too() {
        let a = table(&["x", "y"], 1, "a");
        let b = table(&["z"], 2, "b");
        let out = ExportFormatter::new(1, "\n").format(&[a, b]);
        assert_eq!(out, "x,y,,z\na00,a01,,b00\n,,,b10\n");
    }

    #[test]
    fn deterministic() {
        let make = || vec![table(&["a", "b"], 3, "p"), table(&["c"], 7, "q")];
        let f = ExportFormatter::default();
        assert_eq!(f.format(&make()), f.format(&make()));
    }

    #[test]
    fn push_row_normalises_width() {
        let mut t = Table::new(&["a", "b", "c"]);
        t.push_row(vec!["1".into()]);
        t.push_row(vec!["1".into(), "2".into(), "3".into(), "4".into()]);
        assert_eq!(t.rows[0], vec!["1", "", ""]);
        assert_eq!(t.rows[1], vec!["1", "2", "3"]);
    }

    #[test]
    fn sample_table_columns() {
        let s = vec![Sample::new(0, 1.5, std::time::Duration::from_millis(1010))];
        let t = Table::from_samples("Respiration", &s);
        assert_eq!(t.headers, vec!["Time", "Formatted Time", "Respiration"]);
        assert_eq!(t.rows[0], vec!["01.01", "00:00:01:01", "1.5"]);
    }
}
