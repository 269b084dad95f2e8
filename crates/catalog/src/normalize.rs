//! Reduce heterogeneous catalog payloads to a [`CanonicalRecord`].
//!
//! Each concern (payload envelope, poster, genres, availability) is probed
//! through a small enum of the upstream shapes we know about, ending in a
//! catch-all. Supporting a new upstream shape means adding a variant and
//! its matcher. Nothing here fails loudly: unknown shapes yield `None`.

use std::collections::BTreeMap;

use omnibase_core::types::MediaKind;
use serde_json::{Map, Value};
use tracing::warn;

use crate::{CanonicalRecord, Offer};

pub const PLACEHOLDER_POSTER: &str = "https://placehold.co/300x450/e2e8f0/1e293b?text=No+Poster";

/// Width-keyed poster map, best candidate first.
const POSTER_WIDTH_KEYS: &[&str] = &["300", "500", "original"];
/// Vertical poster image set, best candidate first.
const VERTICAL_POSTER_KEYS: &[&str] = &["w480", "w720", "w600", "w360", "w240"];

const PREVIEW_CHARS: usize = 100;

/// Where the candidate list sits in a payload.
#[derive(Debug)]
enum PayloadShape<'a> {
    /// Bare list, as returned by title search and stored in the cache.
    Listed(&'a [Value]),
    /// Object wrapping the list in `results`.
    Results(&'a [Value]),
    Unrecognized,
}

impl<'a> PayloadShape<'a> {
    fn detect(payload: &'a Value) -> Self {
        if let Value::Array(items) = payload {
            return Self::Listed(items);
        }
        match payload.get("results") {
            Some(Value::Array(items)) => Self::Results(items),
            _ => Self::Unrecognized,
        }
    }

    fn first(&self) -> Option<&'a Value> {
        match self {
            Self::Listed(items) | Self::Results(items) => items.first(),
            Self::Unrecognized => None,
        }
    }
}

#[derive(Debug)]
enum PosterSource<'a> {
    WidthKeyed(&'a Map<String, Value>),
    VerticalPoster(&'a Map<String, Value>),
    Missing,
}

impl<'a> PosterSource<'a> {
    fn detect(record: &'a Map<String, Value>) -> Self {
        if let Some(urls) = record.get("posterURLs") {
            return match urls {
                Value::Object(map) => Self::WidthKeyed(map),
                _ => Self::Missing,
            };
        }
        match record.get("imageSet").and_then(|s| s.get("verticalPoster")) {
            Some(Value::Object(map)) => Self::VerticalPoster(map),
            _ => Self::Missing,
        }
    }

    fn resolve(&self) -> String {
        let (map, keys) = match self {
            Self::WidthKeyed(map) => (*map, POSTER_WIDTH_KEYS),
            Self::VerticalPoster(map) => (*map, VERTICAL_POSTER_KEYS),
            Self::Missing => return PLACEHOLDER_POSTER.to_string(),
        };
        keys.iter()
            .filter_map(|k| map.get(*k).and_then(Value::as_str))
            .find(|url| !url.is_empty())
            .unwrap_or(PLACEHOLDER_POSTER)
            .to_string()
    }
}

#[derive(Debug)]
enum Availability<'a> {
    /// Already keyed by provider.
    ProviderMap(&'a Map<String, Value>),
    /// Flat offer list with a nested provider name on each offer.
    OfferList(&'a [Value]),
    Missing,
}

impl<'a> Availability<'a> {
    fn detect(record: &'a Map<String, Value>) -> Self {
        if let Some(info) = record.get("streamingInfo") {
            return match info {
                Value::Object(map) => Self::ProviderMap(map),
                _ => Self::Missing,
            };
        }
        match record.get("offers") {
            Some(Value::Array(offers)) => Self::OfferList(offers),
            _ => Self::Missing,
        }
    }

    fn collect(&self) -> BTreeMap<String, Vec<Offer>> {
        let mut out: BTreeMap<String, Vec<Offer>> = BTreeMap::new();
        match self {
            Self::ProviderMap(map) => {
                for (provider, offers) in *map {
                    let Some(offers) = offers.as_array() else {
                        continue;
                    };
                    let entry = out.entry(provider.clone()).or_default();
                    for offer in offers {
                        entry.push(Offer {
                            link: str_field(offer, "link"),
                            kind: offer
                                .get("type")
                                .or_else(|| offer.get("streamingType"))
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                        });
                    }
                }
            }
            Self::OfferList(offers) => {
                for offer in *offers {
                    let provider = offer
                        .get("provider")
                        .and_then(|p| p.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_lowercase();
                    if provider.is_empty() {
                        continue;
                    }
                    let kind = match offer.get("type").and_then(Value::as_str) {
                        Some("subscription") => "flatrate".to_string(),
                        other => other.unwrap_or_default().to_string(),
                    };
                    out.entry(provider).or_default().push(Offer {
                        link: str_field(offer, "url"),
                        kind,
                    });
                }
            }
            Self::Missing => {}
        }
        out
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn map_str(record: &Map<String, Value>, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Either a string or a number, rendered as a string.
fn id_field(record: &Map<String, Value>, key: &str) -> String {
    match record.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn join_names(values: &[Value]) -> String {
    let named: Option<Vec<&str>> = values
        .iter()
        .map(|g| g.get("name").and_then(Value::as_str))
        .collect();
    let plain: Option<Vec<&str>> = values.iter().map(Value::as_str).collect();
    named.or(plain).unwrap_or_default().join(", ")
}

fn genres(record: &Map<String, Value>) -> String {
    match record.get("genres") {
        Some(Value::Array(values)) => join_names(values),
        _ => String::new(),
    }
}

fn directors(record: &Map<String, Value>) -> String {
    match record.get("directors") {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    }
}

fn year(record: &Map<String, Value>) -> Option<i64> {
    let raw = record
        .get("year")
        .filter(|v| !v.is_null())
        .or_else(|| record.get("releaseYear"))?;
    raw.as_i64()
        .or_else(|| raw.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Explicit IMDb rating, else the generic rating scaled down when it is on a 0–100 scale.
fn upstream_rating(record: &Map<String, Value>) -> Option<f64> {
    if let Some(rating) = record.get("imdbRating").filter(|v| !v.is_null()) {
        return rating
            .as_f64()
            .or_else(|| rating.as_str().and_then(|s| s.trim().parse().ok()));
    }
    let raw = record.get("rating")?.as_f64()?;
    Some(if raw > 10.0 { raw / 10.0 } else { raw })
}

fn kind(record: &Map<String, Value>) -> MediaKind {
    let discriminator = match record.get("showType") {
        Some(show_type) => show_type.as_str(),
        None => record.get("type").and_then(Value::as_str),
    };
    MediaKind::from_upstream(discriminator)
}

fn preview(value: &Value) -> String {
    value.to_string().chars().take(PREVIEW_CHARS).collect()
}

/// Normalize a payload that is either parsed JSON or a JSON-encoded string.
pub fn normalize(raw: &Value) -> Option<CanonicalRecord> {
    if let Value::String(text) = raw {
        return normalize_text(text);
    }

    let shape = PayloadShape::detect(raw);
    if matches!(shape, PayloadShape::Unrecognized) {
        warn!(payload = %preview(raw), "unrecognized catalog payload shape");
        return None;
    }
    let Some(Value::Object(record)) = shape.first() else {
        return None;
    };

    Some(CanonicalRecord {
        title: map_str(record, "title"),
        kind: kind(record),
        year: year(record),
        director: directors(record),
        genre: genres(record),
        poster_url: PosterSource::detect(record).resolve(),
        imdb_id: id_field(record, "imdbId"),
        tmdb_id: id_field(record, "tmdbId"),
        own_rating: 0,
        imdb_rating: upstream_rating(record),
        notes: map_str(record, "overview"),
        availability: Availability::detect(record).collect(),
    })
}

pub fn normalize_text(text: &str) -> Option<CanonicalRecord> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::String(_)) => None,
        Ok(value) => normalize(&value),
        Err(e) => {
            let head: String = text.chars().take(PREVIEW_CHARS).collect();
            warn!(error = %e, payload = %head, "catalog payload is not JSON");
            None
        }
    }
}
