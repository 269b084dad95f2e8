//! Reading exported viewing histories.
//!
//! A history export is a CSV file with a header row; the only column used is
//! `Title`. Everything else (dates, profile names) is ignored.

use thiserror::Error;
use tracing::debug;

const TITLE_COLUMN: &str = "Title";

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("export is not valid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("export has no `{TITLE_COLUMN}` column")]
    MissingTitleColumn,
}

/// Extract the raw title of every row, in file order. Blank titles are dropped.
pub fn read_titles(bytes: &[u8]) -> Result<Vec<String>, HistoryError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    let column = headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}') == TITLE_COLUMN)
        .ok_or(HistoryError::MissingTitleColumn)?;

    let mut titles = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(title) = record.get(column) {
            if !title.trim().is_empty() {
                titles.push(title.to_string());
            }
        }
    }

    debug!(rows = titles.len(), "read history export");
    Ok(titles)
}
