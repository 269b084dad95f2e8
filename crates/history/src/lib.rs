#![allow(clippy::collapsible_if)]
pub mod classifier;
pub mod export;

pub use classifier::{Classification, SeriesEntry, classify};
pub use export::{HistoryError, read_titles};
