#![allow(clippy::type_complexity)]
pub mod cache;
pub mod import;
pub mod lookup;
pub mod normalize;
pub mod provider;
pub mod streaming;

use std::collections::BTreeMap;

use omnibase_core::types::MediaKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("not found")]
    NotFound,
}

/// Catalog result after normalization, in the shape stored in the collection.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub year: Option<i64>,
    pub director: String,
    /// Genre names joined with `", "`.
    pub genre: String,
    #[serde(rename = "poster")]
    pub poster_url: String,
    pub imdb_id: String,
    pub tmdb_id: String,
    /// The user's own rating; always 0 (unrated) for catalog results.
    #[serde(rename = "rating")]
    pub own_rating: u8,
    /// Upstream rating on a 0–10 scale.
    pub imdb_rating: Option<f64>,
    pub notes: String,
    /// Provider name → offers.
    #[serde(rename = "streamingInfo")]
    pub availability: BTreeMap<String, Vec<Offer>>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Offer {
    pub link: String,
    #[serde(rename = "type")]
    pub kind: String,
}
