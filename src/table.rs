use std::io::Read;
use std::path::Path;

use anyhow::Context;

/// A header-addressed table of string cells, loaded wholesale from a CSV
/// file. Uploaded facility tables carry arbitrary columns, so rows stay
/// untyped and callers look cells up by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn from_csv_path(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Self::from_csv_reader(file)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_csv_str(data: &str) -> anyhow::Result<Self> {
        Self::from_csv_reader(data.as_bytes())
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> anyhow::Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .context("missing header row")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record.context("unreadable csv record")?;
            let mut row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            // Ragged rows are padded rather than rejected.
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn to_csv_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        Ok(writer.into_inner()?)
    }

    /// Full-replace write: the serialized table is buffered in memory and
    /// written in one call, so a failed run never leaves a partial file.
    pub fn write_csv_path(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let bytes = self.to_csv_bytes()?;
        std::fs::write(path, bytes)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell lookup by column name; `None` when the column does not exist.
    pub fn get(&self, row: usize, name: &str) -> Option<&str> {
        let idx = self.column_index(name)?;
        self.rows.get(row).and_then(|r| r.get(idx)).map(|s| s.as_str())
    }

    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    /// Adds a column, or overwrites it in place when the header already
    /// exists. Values must match the current row count.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) -> anyhow::Result<()> {
        anyhow::ensure!(
            values.len() == self.rows.len(),
            "column {} has {} values for {} rows",
            name,
            values.len(),
            self.rows.len()
        );
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.headers.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_csv() {
        let input = "facility_id,facility_name\nf1,General Hospital\nf2,Mercy West\n";
        let table = Table::from_csv_str(input).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "facility_name"), Some("General Hospital"));

        let bytes = table.to_csv_bytes().unwrap();
        let reparsed = Table::from_csv_str(std::str::from_utf8(&bytes).unwrap()).unwrap();
        assert_eq!(table, reparsed);
    }

    #[test]
    fn pads_ragged_rows() {
        let table = Table::from_csv_str("a,b,c\n1,2\n").unwrap();
        assert_eq!(table.get(0, "c"), Some(""));
    }

    #[test]
    fn set_column_overwrites_or_appends() {
        let mut table = Table::from_csv_str("a\n1\n2\n").unwrap();
        table.set_column("a", vec!["x".into(), "y".into()]).unwrap();
        table.set_column("b", vec!["3".into(), "4".into()]).unwrap();
        assert_eq!(table.get(1, "a"), Some("y"));
        assert_eq!(table.get(0, "b"), Some("3"));
        assert!(table.set_column("c", vec!["only one".into()]).is_err());
    }

    #[test]
    fn missing_column_reads_as_none() {
        let table = Table::from_csv_str("a\n1\n").unwrap();
        assert_eq!(table.get(0, "zzz"), None);
    }
}
