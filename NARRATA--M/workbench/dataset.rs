//! Delimited-table ingestion and the immutable datasets built from it.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::WorkbenchConfig, error::SchemaError};

/// 1-based position of a record within its dataset.
pub type RecordId = usize;

/// Which slot an upload fills.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DatasetRole {
    /// Data the classifiers learn from.
    Training,
    /// Held-out data for batch evaluation.
    Test,
}

impl DatasetRole {
    /// Capitalised label used in operator messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Training => "Training",
            Self::Test => "Test",
        }
    }
}

impl fmt::Display for DatasetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Header plus rows of a delimited text table, every row padded to the header width.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Parses `text` whose first line is the header row.
    ///
    /// Every source line is split on its own: fields are trimmed, blank lines
    /// skipped, short rows padded with empty strings and surplus fields
    /// dropped. Double-quoted fields may contain the delimiter and `""` is a
    /// literal quote; a quote left open ends with its line.
    pub fn parse(text: &str, delimiter: u8) -> Result<Self, SchemaError> {
        let mut lines = text.lines().zip(1_u64..);
        let headers = match lines.next() {
            Some((line, number)) => split_line(line, delimiter, number)?,
            None => Vec::new(),
        };

        let width = headers.len();
        let mut rows = Vec::new();
        for (line, number) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let mut row = split_line(line, delimiter, number)?;
            row.resize(width, String::new());
            rows.push(row);
        }
        Ok(Self { headers, rows })
    }

    /// Column names in source order.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows in source order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Index of the first column called `name`.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Cell at `row` (0-based) under column `name`.
    #[must_use]
    pub fn value(&self, row: usize, name: &str) -> Option<&str> {
        let column = self.column(name)?;
        self.rows.get(row).map(|cells| cells[column].as_str())
    }
}

fn split_line(line: &str, delimiter: u8, number: u64) -> Result<Vec<String>, SchemaError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(line.as_bytes());
    let mut record = csv::StringRecord::new();
    reader
        .read_record(&mut record)
        .map_err(|err| SchemaError::MalformedRow {
            line: number,
            reason: err.to_string(),
        })?;
    Ok(record.iter().map(ToOwned::to_owned).collect())
}

/// One narrative with its optional ground truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Position within the dataset, starting at 1.
    pub id: RecordId,
    /// Narrative text.
    pub text: String,
    /// Ground-truth classification; `None` when the cell was empty.
    pub label: Option<String>,
    /// Remaining source columns in header order.
    pub extra: IndexMap<String, String>,
}

/// Immutable ordered records from one upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    id: Uuid,
    role: DatasetRole,
    loaded_at: DateTime<Utc>,
    columns: Vec<String>,
    records: Vec<Record>,
}

impl Dataset {
    /// Parses an upload and validates that both configured columns exist.
    pub fn parse(
        text: &str,
        role: DatasetRole,
        config: &WorkbenchConfig,
    ) -> Result<Self, SchemaError> {
        let table = Table::parse(text, config.delimiter_byte())?;
        let narrative = table.column(&config.narrative_column);
        let label = table.column(&config.label_column);
        let (Some(narrative), Some(label)) = (narrative, label) else {
            let missing = [
                (narrative, &config.narrative_column),
                (label, &config.label_column),
            ]
            .into_iter()
            .filter(|(index, _)| index.is_none())
            .map(|(_, name)| name.clone())
            .collect();
            return Err(SchemaError::MissingColumn { missing });
        };

        let headers = table.headers();
        let records = table
            .rows()
            .iter()
            .enumerate()
            .map(|(idx, cells)| Record {
                id: idx + 1,
                text: cells[narrative].clone(),
                label: Some(cells[label].clone()).filter(|value| !value.is_empty()),
                extra: headers
                    .iter()
                    .zip(cells)
                    .enumerate()
                    .filter(|(column, _)| *column != narrative && *column != label)
                    .map(|(_, (header, cell))| (header.clone(), cell.clone()))
                    .collect(),
            })
            .collect();

        Ok(Self::assemble(role, headers.to_vec(), records))
    }

    /// Builds a dataset directly from `(text, label)` pairs.
    #[must_use]
    pub fn from_pairs(role: DatasetRole, pairs: Vec<(String, Option<String>)>) -> Self {
        let records = pairs
            .into_iter()
            .enumerate()
            .map(|(idx, (text, label))| Record {
                id: idx + 1,
                text,
                label,
                extra: IndexMap::new(),
            })
            .collect();
        Self::assemble(role, Vec::new(), records)
    }

    fn assemble(role: DatasetRole, columns: Vec<String>, records: Vec<Record>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            loaded_at: Utc::now(),
            columns,
            records,
        }
    }

    /// Identity of this upload.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Slot the dataset was loaded into.
    #[must_use]
    pub const fn role(&self) -> DatasetRole {
        self.role
    }

    /// Load time.
    #[must_use]
    pub const fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Source header, empty for programmatic datasets.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Records in file order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Record by 1-based id.
    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<&Record> {
        id.checked_sub(1).and_then(|idx| self.records.get(idx))
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Count per ground-truth label in first-seen order; unlabeled records are skipped.
    #[must_use]
    pub fn label_distribution(&self) -> IndexMap<String, usize> {
        let mut counts = IndexMap::new();
        for label in self.records.iter().filter_map(|record| record.label.as_ref()) {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Dataset, SchemaError> {
        Dataset::parse(text, DatasetRole::Training, &WorkbenchConfig::default())
    }

    #[test]
    fn counts_only_non_blank_lines() {
        let text = "NARRATIVE,classification\nstole a bike,THEFT\n\n   \nbroke a window,VANDALISM\n";
        let dataset = parse(text).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.records()[0].id, 1);
        assert_eq!(dataset.records()[1].id, 2);
        assert_eq!(dataset.get(2).unwrap().label.as_deref(), Some("VANDALISM"));
        assert!(dataset.get(0).is_none());
    }

    #[test]
    fn missing_columns_are_schema_errors() {
        let err = parse("TEXT,classification\nsomething,THEFT\n").unwrap_err();
        assert_eq!(err.to_string(), "missing required column");
        assert_eq!(
            err,
            SchemaError::MissingColumn {
                missing: vec!["NARRATIVE".into()]
            }
        );

        let err = parse("NARRATIVE\n").unwrap_err();
        assert!(matches!(err, SchemaError::MissingColumn { missing } if missing == ["classification"]));
    }

    #[test]
    fn empty_input_fails_header_check() {
        let err = parse("").unwrap_err();
        assert!(matches!(err, SchemaError::MissingColumn { missing } if missing.len() == 2));
    }

    #[test]
    fn header_only_is_an_empty_dataset() {
        let dataset = parse("NARRATIVE,classification\n").unwrap();
        assert!(dataset.is_empty());
    }

    #[test]
    fn short_rows_pad_and_values_are_trimmed() {
        let text = " ID , NARRATIVE , classification , precinct\n7,  fled on foot  \n";
        let dataset = parse(text).unwrap();
        let record = &dataset.records()[0];
        assert_eq!(record.text, "fled on foot");
        assert_eq!(record.label, None);
        assert_eq!(record.extra.get("ID").map(String::as_str), Some("7"));
        assert_eq!(record.extra.get("precinct").map(String::as_str), Some(""));
        assert_eq!(dataset.columns(), ["ID", "NARRATIVE", "classification", "precinct"]);
    }

    #[test]
    fn quoted_fields_keep_delimiters() {
        let text = "NARRATIVE,classification\n\"took a wallet, then ran\",THEFT\n";
        let dataset = parse(text).unwrap();
        assert_eq!(dataset.records()[0].text, "took a wallet, then ran");
        assert_eq!(dataset.records()[0].label.as_deref(), Some("THEFT"));
    }

    #[test]
    fn unclosed_quote_stays_on_its_line() {
        let text = "NARRATIVE,classification\n\"stole a bike,THEFT\nbroke a window,VANDALISM\nsprayed a wall,VANDALISM\n";
        let dataset = parse(text).unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.records()[0].text, "stole a bike,THEFT");
        assert_eq!(dataset.records()[0].label, None);
        assert_eq!(dataset.get(2).unwrap().text, "broke a window");
        assert_eq!(dataset.get(3).unwrap().label.as_deref(), Some("VANDALISM"));
    }

    #[test]
    fn first_line_is_always_the_header() {
        let err = parse("\nNARRATIVE,classification\nstole,THEFT\n").unwrap_err();
        assert!(matches!(err, SchemaError::MissingColumn { missing } if missing.len() == 2));
    }

    #[test]
    fn extra_fields_are_dropped() {
        let table = Table::parse("a,b\n1,2,3\n", b',').unwrap();
        assert_eq!(table.rows()[0], vec!["1".to_string(), "2".to_string()]);
        assert_eq!(table.value(0, "b"), Some("2"));
        assert_eq!(table.value(0, "c"), None);
    }

    #[test]
    fn crlf_and_alternate_delimiters() {
        let config = WorkbenchConfig {
            delimiter: ';',
            ..WorkbenchConfig::default()
        };
        let text = "NARRATIVE;classification\r\nforged a cheque;FRAUD\r\n";
        let dataset = Dataset::parse(text, DatasetRole::Test, &config).unwrap();
        assert_eq!(dataset.role(), DatasetRole::Test);
        assert_eq!(dataset.records()[0].label.as_deref(), Some("FRAUD"));
    }

    #[test]
    fn label_distribution_keeps_first_seen_order() {
        let text = "NARRATIVE,classification\na,THEFT\nb,FRAUD\nc,THEFT\nd,\n";
        let dist = parse(text).unwrap().label_distribution();
        assert_eq!(dist.get_index(0), Some((&"THEFT".to_string(), &2)));
        assert_eq!(dist.get_index(1), Some((&"FRAUD".to_string(), &1)));
        assert_eq!(dist.len(), 2);
    }

    #[test]
    fn each_upload_gets_a_fresh_identity() {
        let text = "NARRATIVE,classification\na,THEFT\n";
        assert_ne!(parse(text).unwrap().id(), parse(text).unwrap().id());
    }
}
