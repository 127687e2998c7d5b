//! Delimited-text export of evaluation rows.

use std::{fs, path::Path};

use anyhow::Context;

use crate::{config::WorkbenchConfig, error::ExportError, evaluation::Evaluation};

/// File name offered to save dialogs.
pub const DEFAULT_EXPORT_FILE: &str = "classification_results.csv";

/// Cuts `text` to `limit` characters, appending `marker` only when something was cut.
#[must_use]
pub fn excerpt(text: &str, limit: usize, marker: &str) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{marker}", &text[..cut]),
        None => text.to_owned(),
    }
}

/// Serializes `evaluation` as `ID, Narrative, Actual, <variant>...` rows,
/// followed by `<variant>_Correct` columns when configured.
pub fn export_table(
    evaluation: &Evaluation,
    config: &WorkbenchConfig,
) -> Result<Vec<u8>, ExportError> {
    if evaluation.is_empty() {
        return Err(ExportError::NoResults);
    }
    let variants: Vec<&str> = evaluation.variants().collect();
    let mut writer = csv::WriterBuilder::new()
        .delimiter(config.delimiter_byte())
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());

    let mut header: Vec<String> = ["ID", "Narrative", "Actual"]
        .iter()
        .map(ToString::to_string)
        .collect();
    header.extend(variants.iter().map(ToString::to_string));
    if config.export_correctness_columns {
        header.extend(variants.iter().map(|variant| format!("{variant}_Correct")));
    }
    writer.write_record(&header).map_err(write_failed)?;

    for row in evaluation.rows() {
        let mut fields = vec![
            row.id.to_string(),
            excerpt(&row.narrative, config.preview_chars, &config.truncation_marker),
            row.actual.clone().unwrap_or_default(),
        ];
        fields.extend(variants.iter().map(|variant| {
            row.predictions
                .get(*variant)
                .cloned()
                .flatten()
                .unwrap_or_default()
        }));
        if config.export_correctness_columns {
            fields.extend(variants.iter().map(|variant| {
                row.correct
                    .get(*variant)
                    .copied()
                    .unwrap_or(false)
                    .to_string()
            }));
        }
        writer.write_record(&fields).map_err(write_failed)?;
    }

    writer
        .into_inner()
        .map_err(|err| ExportError::Write(err.to_string()))
}

/// Saves exported bytes to `path`, creating missing parent directories.
pub fn write_export(path: impl AsRef<Path>, bytes: &[u8]) -> anyhow::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating export dir {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("writing export {}", path.display()))
}

fn write_failed(err: csv::Error) -> ExportError {
    ExportError::Write(err.to_string())
}
