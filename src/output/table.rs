#![forbid(unsafe_code)]

use std::io;

/// Column-aligned plain-text table, or CSV with `--csv`.
#[derive(Debug, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row(&mut self, cols: impl IntoIterator<Item = impl Into<String>>) {
        self.rows.push(cols.into_iter().map(Into::into).collect());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn print(&self, csv: bool) -> io::Result<()> {
        let out = io::stdout().lock();
        if csv {
            self.write_csv(out)
        } else {
            self.write_aligned(out)
        }
    }

    fn write_csv(&self, out: impl io::Write) -> io::Result<()> {
        let mut wtr = csv::Writer::from_writer(out);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()
    }

    fn write_aligned(&self, mut out: impl io::Write) -> io::Result<()> {
        let ncols = self
            .rows
            .iter()
            .map(Vec::len)
            .chain([self.headers.len()])
            .max()
            .unwrap_or(0);
        let mut widths = vec![0usize; ncols];
        for row in std::iter::once(&self.headers).chain(&self.rows) {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }

        for row in std::iter::once(&self.headers).chain(&self.rows) {
            let mut line = String::new();
            for (i, cell) in row.iter().enumerate() {
                if i > 0 {
                    line.push_str("  ");
                }
                line.push_str(cell);
                let pad = widths[i].saturating_sub(cell.chars().count());
                line.extend(std::iter::repeat_n(' ', pad));
            }
            writeln!(out, "{}", line.trim_end())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut t = Table::new(["ISSUE", "STATUS", "PATH"]);
        t.row(["#42", "PR merged", "/src/app-issue-42-add-dark-mode-support"]);
        t.row(["#3", "orphaned folder", "/src/app-issue-3-gamma"]);
        t
    }

    #[test]
    fn aligns_columns_without_trailing_spaces() {
        let mut buf = Vec::new();
        sample().write_aligned(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ISSUE  STATUS           PATH");
        assert_eq!(lines[2], "#3     orphaned folder  /src/app-issue-3-gamma");
        assert!(lines.iter().all(|l| !l.ends_with(' ')));
    }

    #[test]
    fn csv_quotes_commas() {
        let mut t = Table::new(["NUMBER", "TITLE"]);
        t.row(["7", "Fix a, b"]);
        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "NUMBER,TITLE\n7,\"Fix a, b\"\n");
    }
}
