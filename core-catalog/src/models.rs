//! Domain models for the song catalog
//!
//! These are the validated, application-facing shapes. Backend rows never
//! reach this module directly; they go through [`crate::normalize`] first.

use serde::{Deserialize, Serialize};

/// A song as exposed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    /// Unique identifier (never empty)
    pub id: String,
    /// Uploading user
    pub user_id: String,
    /// Song title (never empty)
    pub title: String,
    /// Storage path of the audio asset
    pub song_path: String,
    /// Storage path of the cover image
    pub image_path: String,
    /// Storage path of the lyrics asset, if any
    pub lyrics_path: Option<String>,
    /// Creation timestamp as stored by the backend
    pub created_at: String,
    /// Album reference
    pub album_id: Option<String>,
    /// Duration in seconds
    pub duration: f64,
    /// Credited artists, in link-table order
    pub artists: Vec<Artist>,
    /// Album, when the relation resolved
    pub album: Option<Album>,
}

impl Song {
    /// Validate the identity fields every song must carry
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("Song id cannot be empty".to_string());
        }

        if self.title.is_empty() {
            return Err("Song title cannot be empty".to_string());
        }

        Ok(())
    }

    /// Artist names joined for display, e.g. `"A, B"`
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Music artist
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

/// Album
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub title: String,
    pub created_at: String,
}
