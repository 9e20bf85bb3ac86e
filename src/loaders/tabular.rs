use std::path::Path;

use anyhow::{Context, Result};

use super::Document;
use crate::error::LoadError;

/// Each CSV record becomes a block of `header: value` lines.
pub async fn load_csv(path: &Path) -> Result<Document, LoadError> {
    let path = path.to_path_buf();
    let rows = tokio::task::spawn_blocking(move || read_csv_rows(&path))
        .await
        .map_err(|err| LoadError::Csv(format!("CSV parsing task panicked: {err}")))?
        .map_err(|err| LoadError::Csv(format!("{err:#}")))?;

    let document = Document::from_fragments(rows);
    if document.is_empty() {
        return Err(LoadError::EmptyCsv);
    }
    Ok(document)
}

fn read_csv_rows(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open CSV: {}", path.display()))?;

    let headers = reader
        .headers()
        .context("failed to read CSV header")?
        .iter()
        .map(|header| header.trim().trim_start_matches('\u{FEFF}').to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("failed to parse CSV record {}", index + 1))?;
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| format!("{}: {}", header, value.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        rows.push(row);
    }

    Ok(rows)
}
