use std::{env, fs, path::Path};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

/// Runtime settings for parsing, orchestration and export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbenchConfig {
    /// Header naming the narrative text column.
    pub narrative_column: String,
    /// Header naming the ground-truth label column.
    pub label_column: String,
    /// Field delimiter for uploads and exports.
    pub delimiter: char,
    /// Characters of narrative kept in exported previews.
    pub preview_chars: usize,
    /// Appended to previews that were cut.
    pub truncation_marker: String,
    /// Pause after each training progress step, in milliseconds.
    pub progress_delay_ms: u64,
    /// Adds `<variant>_Correct` columns to exports.
    pub export_correctness_columns: bool,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            narrative_column: "NARRATIVE".into(),
            label_column: "classification".into(),
            delimiter: ',',
            preview_chars: 100,
            truncation_marker: "...".into(),
            progress_delay_ms: 0,
            export_correctness_columns: true,
        }
    }
}

impl WorkbenchConfig {
    /// Reads a TOML (`.toml`) or JSON config file; missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&contents)
                .with_context(|| format!("parsing workbench config {}", path.display()))?
        } else {
            serde_json::from_str(&contents)
                .with_context(|| format!("parsing workbench config {}", path.display()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Applies `NARRATA_*` environment overrides on top of `self`.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup("NARRATA_NARRATIVE_COLUMN") {
            self.narrative_column = value;
        }
        if let Some(value) = lookup("NARRATA_LABEL_COLUMN") {
            self.label_column = value;
        }
        if let Some(value) = lookup("NARRATA_DELIMITER") {
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(delimiter), None) => self.delimiter = delimiter,
                _ => anyhow::bail!("NARRATA_DELIMITER must be a single character, got {value:?}"),
            }
        }
        if let Some(value) = lookup("NARRATA_PREVIEW_CHARS") {
            self.preview_chars = value
                .parse()
                .with_context(|| format!("NARRATA_PREVIEW_CHARS={value}"))?;
        }
        if let Some(value) = lookup("NARRATA_PROGRESS_DELAY_MS") {
            self.progress_delay_ms = value
                .parse()
                .with_context(|| format!("NARRATA_PROGRESS_DELAY_MS={value}"))?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Rejects settings the parser or exporter cannot honour.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.narrative_column.trim().is_empty(),
            "narrative column name is empty"
        );
        ensure!(!self.label_column.trim().is_empty(), "label column name is empty");
        ensure!(
            self.narrative_column != self.label_column,
            "narrative and label columns must differ"
        );
        ensure!(
            !matches!(self.delimiter, '"' | '\n' | '\r') && self.delimiter.is_ascii(),
            "unsupported delimiter {:?}",
            self.delimiter
        );
        ensure!(self.preview_chars > 0, "preview length must be positive");
        Ok(())
    }

    /// Delimiter as the single byte the table reader expects.
    #[must_use]
    pub(crate) fn delimiter_byte(&self) -> u8 {
        u8::try_from(self.delimiter).unwrap_or(b',')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_columns() {
        let config = WorkbenchConfig::default();
        assert_eq!(config.narrative_column, "NARRATIVE");
        assert_eq!(config.label_column, "classification");
        assert_eq!(config.preview_chars, 100);
        config.validate().unwrap();
    }

    #[test]
    fn file_keeps_defaults_for_missing_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("workbench.json");
        fs::write(&path, r#"{ "label_column": "category", "delimiter": ";" }"#).unwrap();
        let config = WorkbenchConfig::from_file(&path).unwrap();
        assert_eq!(config.label_column, "category");
        assert_eq!(config.delimiter, ';');
        assert_eq!(config.narrative_column, "NARRATIVE");
    }

    #[test]
    fn toml_files_are_accepted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("workbench.toml");
        fs::write(&path, "narrative_column = \"TEXT\"\npreview_chars = 40\n").unwrap();
        let config = WorkbenchConfig::from_file(&path).unwrap();
        assert_eq!(config.narrative_column, "TEXT");
        assert_eq!(config.preview_chars, 40);
        assert_eq!(config.label_column, "classification");
    }

    #[test]
    fn env_overrides_apply() {
        let config = WorkbenchConfig::default()
            .with_overrides(lookup(&[
                ("NARRATA_LABEL_COLUMN", "offense"),
                ("NARRATA_DELIMITER", "\t"),
                ("NARRATA_PREVIEW_CHARS", "40"),
            ]))
            .unwrap();
        assert_eq!(config.label_column, "offense");
        assert_eq!(config.delimiter, '\t');
        assert_eq!(config.preview_chars, 40);
    }

    #[test]
    fn rejects_bad_overrides() {
        assert!(WorkbenchConfig::default()
            .with_overrides(lookup(&[("NARRATA_DELIMITER", ";;")]))
            .is_err());
        assert!(WorkbenchConfig::default()
            .with_overrides(lookup(&[("NARRATA_LABEL_COLUMN", "NARRATIVE")]))
            .is_err());
        assert!(WorkbenchConfig::default()
            .with_overrides(lookup(&[("NARRATA_PREVIEW_CHARS", "0")]))
            .is_err());
    }
}
