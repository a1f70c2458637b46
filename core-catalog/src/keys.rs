//! Cache keys for song collections
//!
//! Every paged list is cached under a [`CacheKey`] derived from its collection
//! kind and (for user-scoped kinds) the user it belongs to. Keys are value
//! types: equal inputs always produce equal keys, and keys for different
//! users never collide.

use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of song collection a list pages through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    /// Every song in the catalog
    AllSongs,
    /// Songs a user has liked
    LikedSongs,
    /// Songs a user has uploaded
    UserSongs,
}

impl CollectionKind {
    /// Whether lists of this kind are partitioned per user.
    pub fn requires_scope(self) -> bool {
        !matches!(self, CollectionKind::AllSongs)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CollectionKind::AllSongs => "songs",
            CollectionKind::LikedSongs => "liked_songs",
            CollectionKind::UserSongs => "user_songs",
        }
    }

    fn segments(self) -> &'static [&'static str] {
        match self {
            CollectionKind::AllSongs => &["songs", "all"],
            CollectionKind::LikedSongs => &["songs", "liked"],
            CollectionKind::UserSongs => &["user", "songs"],
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "songs" | "all-songs" => Ok(CollectionKind::AllSongs),
            "liked_songs" | "liked-songs" => Ok(CollectionKind::LikedSongs),
            "user_songs" | "user-songs" => Ok(CollectionKind::UserSongs),
            other => Err(CatalogError::InvalidInput {
                field: "collection".to_string(),
                message: format!("Unknown collection kind '{}'", other),
            }),
        }
    }
}

/// Structured identity of one cached paged list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    kind: CollectionKind,
    scope: Option<String>,
}

impl CacheKey {
    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Namespace segments followed by the scope, if any.
    pub fn segments(&self) -> Vec<&str> {
        let mut segments = self.kind.segments().to_vec();
        if let Some(scope) = &self.scope {
            segments.push(scope);
        }
        segments
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments().join("/"))
    }
}

/// Build the cache key for a collection.
///
/// An empty scope is treated as absent. `AllSongs` ignores the scope.
pub fn build_key(kind: CollectionKind, scope: Option<&str>) -> CacheKey {
    let scope = if kind.requires_scope() {
        scope.filter(|s| !s.is_empty()).map(str::to_string)
    } else {
        None
    };

    CacheKey { kind, scope }
}

/// A concrete collection: kind plus the user it is scoped to.
///
/// Scoped variants carry an `Option` because hosts may open a list before
/// the signed-in user is known; such lists are unscoped and unfiltered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SongCollection {
    AllSongs,
    LikedSongs { user_id: Option<String> },
    UserSongs { user_id: Option<String> },
}

impl SongCollection {
    pub fn new(kind: CollectionKind, user_id: Option<&str>) -> Self {
        let user_id = user_id.filter(|s| !s.is_empty()).map(str::to_string);
        match kind {
            CollectionKind::AllSongs => SongCollection::AllSongs,
            CollectionKind::LikedSongs => SongCollection::LikedSongs { user_id },
            CollectionKind::UserSongs => SongCollection::UserSongs { user_id },
        }
    }

    pub fn all() -> Self {
        SongCollection::AllSongs
    }

    pub fn liked(user_id: impl Into<String>) -> Self {
        let user_id: String = user_id.into();
        Self::new(CollectionKind::LikedSongs, Some(&user_id))
    }

    pub fn user_songs(user_id: impl Into<String>) -> Self {
        let user_id: String = user_id.into();
        Self::new(CollectionKind::UserSongs, Some(&user_id))
    }

    pub fn kind(&self) -> CollectionKind {
        match self {
            SongCollection::AllSongs => CollectionKind::AllSongs,
            SongCollection::LikedSongs { .. } => CollectionKind::LikedSongs,
            SongCollection::UserSongs { .. } => CollectionKind::UserSongs,
        }
    }

    pub fn scope(&self) -> Option<&str> {
        match self {
            SongCollection::AllSongs => None,
            SongCollection::LikedSongs { user_id } | SongCollection::UserSongs { user_id } => {
                user_id.as_deref()
            }
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        build_key(self.kind(), self.scope())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_display() {
        assert_eq!(build_key(CollectionKind::AllSongs, None).to_string(), "songs/all");
        assert_eq!(
            build_key(CollectionKind::LikedSongs, Some("u1")).to_string(),
            "songs/liked/u1"
        );
        assert_eq!(
            build_key(CollectionKind::UserSongs, Some("u1")).to_string(),
            "user/songs/u1"
        );
    }

    #[test]
    fn test_keys_are_deterministic() {
        assert_eq!(
            build_key(CollectionKind::LikedSongs, Some("u1")),
            build_key(CollectionKind::LikedSongs, Some("u1"))
        );
    }

    #[test]
    fn test_distinct_inputs_give_distinct_keys() {
        let keys: HashSet<_> = [
            build_key(CollectionKind::AllSongs, None),
            build_key(CollectionKind::LikedSongs, Some("u1")),
            build_key(CollectionKind::LikedSongs, Some("u2")),
            build_key(CollectionKind::LikedSongs, None),
            build_key(CollectionKind::UserSongs, Some("u1")),
            build_key(CollectionKind::UserSongs, None),
        ]
        .into_iter()
        .collect();

        assert_eq!(keys.len(), 6);
    }

    #[test]
    fn test_empty_scope_is_absent() {
        assert_eq!(
            build_key(CollectionKind::LikedSongs, Some("")),
            build_key(CollectionKind::LikedSongs, None)
        );
        assert_eq!(build_key(CollectionKind::UserSongs, None).to_string(), "user/songs");
    }

    #[test]
    fn test_all_songs_ignores_scope() {
        assert_eq!(
            build_key(CollectionKind::AllSongs, Some("u1")),
            build_key(CollectionKind::AllSongs, None)
        );
    }

    #[test]
    fn test_collection_kind_from_str() {
        assert_eq!(
            "liked-songs".parse::<CollectionKind>().unwrap(),
            CollectionKind::LikedSongs
        );
        assert_eq!(
            "songs".parse::<CollectionKind>().unwrap(),
            CollectionKind::AllSongs
        );
        assert!(matches!(
            "playlists".parse::<CollectionKind>(),
            Err(CatalogError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_collection_cache_key() {
        let collection = SongCollection::liked("u1");
        assert_eq!(collection.kind(), CollectionKind::LikedSongs);
        assert_eq!(collection.scope(), Some("u1"));
        assert_eq!(collection.cache_key().segments(), vec!["songs", "liked", "u1"]);

        assert_eq!(
            SongCollection::new(CollectionKind::UserSongs, Some("")),
            SongCollection::UserSongs { user_id: None }
        );
    }
}
