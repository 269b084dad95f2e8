use serde::{Deserialize, Serialize};

/// Kind of a stored title, serialized into the record's `type` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Movie,
    Series,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
        }
    }

    /// Upstream payloads mark series with the literal `"series"`; anything else is a movie.
    pub fn from_upstream(value: Option<&str>) -> Self {
        match value {
            Some("series") => Self::Series,
            _ => Self::Movie,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance marker written on records created by a history import.
pub const NETFLIX_IMPORT_SOURCE: &str = "netflix_import";
