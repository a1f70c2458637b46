//! Row normalization
//!
//! Converts one untrusted joined row (song + album + artist links) into a
//! [`Song`], or rejects it. Parsing and validation are a single step that
//! returns a [`RowOutcome`]; nothing here panics or returns an error, since a
//! bad row is filtered, not reported.
//!
//! Accepted row shape (PostgREST embedding of `songs`):
//!
//! ```text
//! {
//!   "id": "…", "user_id": "…", "title": "…", "song_path": "…",
//!   "image_path": "…", "lyrics_path": "…" | null, "created_at": "…",
//!   "album_id": "…" | null, "duration": 183.4,
//!   "album": { "id": "…", "title": "…", "created_at": "…" } | null,
//!   "song_artists": [ { "artists": { "id": "…", "name": "…", "created_at": "…" } | null } ]
//! }
//! ```

use crate::models::{Album, Artist, Song};
use bridge_traits::RawRow;
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Why a row was excluded from a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Row was null or missing altogether
    Absent,
    /// Row is not a JSON object
    Malformed(String),
    /// Identifier is missing or empty
    MissingId,
    /// Title is missing or empty
    MissingTitle,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Absent => write!(f, "row is absent"),
            RejectReason::Malformed(detail) => write!(f, "row is malformed: {}", detail),
            RejectReason::MissingId => write!(f, "row has no id"),
            RejectReason::MissingTitle => write!(f, "row has no title"),
        }
    }
}

/// Result of parsing one raw row
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Valid(Song),
    Rejected(RejectReason),
}

impl RowOutcome {
    pub fn into_song(self) -> Option<Song> {
        match self {
            RowOutcome::Valid(song) => Some(song),
            RowOutcome::Rejected(_) => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, RowOutcome::Valid(_))
    }

    /// Like [`into_song`](Self::into_song), logging the reason at `debug`
    /// when the row is dropped.
    pub fn accept(self) -> Option<Song> {
        match self {
            RowOutcome::Valid(song) => Some(song),
            RowOutcome::Rejected(reason) => {
                tracing::debug!(%reason, "Rejected song row");
                None
            }
        }
    }
}

// Every field reader below is lenient: a value of an unusable JSON type reads
// as absent, so only the id and title can disqualify an object row.
#[derive(Debug, Deserialize)]
struct RawSongRow {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    song_path: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    image_path: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    lyrics_path: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    album_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient_object")]
    album: Option<RawAlbum>,
    #[serde(default, deserialize_with = "lenient_object")]
    song_artists: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct RawAlbum {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawArtistLink {
    #[serde(default, deserialize_with = "lenient_object")]
    artists: Option<RawArtist>,
}

#[derive(Debug, Deserialize)]
struct RawArtist {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    created_at: Option<String>,
}

/// Strings as-is, numbers in decimal form, anything else absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Numbers, or strings that parse as one.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// A nested relation that does not have the expected shape reads as absent.
fn lenient_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Parse and validate one raw joined row.
pub fn parse_row(row: &RawRow) -> RowOutcome {
    if row.is_null() {
        return RowOutcome::Rejected(RejectReason::Absent);
    }

    if !row.is_object() {
        return RowOutcome::Rejected(RejectReason::Malformed(format!(
            "expected object, found {}",
            json_kind(row)
        )));
    }

    let raw = match RawSongRow::deserialize(row) {
        Ok(raw) => raw,
        Err(err) => return RowOutcome::Rejected(RejectReason::Malformed(err.to_string())),
    };

    let Some(id) = non_empty(raw.id) else {
        return RowOutcome::Rejected(RejectReason::MissingId);
    };
    let Some(title) = non_empty(raw.title) else {
        return RowOutcome::Rejected(RejectReason::MissingTitle);
    };

    // Links without an artist are relation gaps, not errors
    let artists = raw
        .song_artists
        .unwrap_or_default()
        .into_iter()
        .filter_map(|link| RawArtistLink::deserialize(link).ok())
        .filter_map(|link| link.artists)
        .map(|artist| Artist {
            id: artist.id.unwrap_or_default(),
            name: artist.name.unwrap_or_default(),
            created_at: artist.created_at.unwrap_or_default(),
        })
        .collect();

    let album = raw.album.map(|album| Album {
        id: album.id.unwrap_or_default(),
        title: album.title.unwrap_or_default(),
        created_at: album.created_at.unwrap_or_default(),
    });

    RowOutcome::Valid(Song {
        id,
        user_id: raw.user_id.unwrap_or_default(),
        title,
        song_path: raw.song_path.unwrap_or_default(),
        image_path: raw.image_path.unwrap_or_default(),
        lyrics_path: non_empty(raw.lyrics_path),
        created_at: raw.created_at.unwrap_or_default(),
        album_id: raw.album_id,
        duration: raw.duration.unwrap_or_default(),
        artists,
        album,
    })
}

/// Convert a row into a [`Song`], or `None` when it is absent or invalid.
pub fn normalize(row: Option<&RawRow>) -> Option<Song> {
    parse_row(row?).accept()
}
