//! Property-style tests for row normalization
//!
//! Rows are generated from a small grid of field variations rather than a
//! property-testing crate; each case checks one rule across every variation.

use core_catalog::{normalize, parse_row, RejectReason, RowOutcome};
use serde_json::{json, Map, Value};

fn base_row(id: Value, title: Value) -> Value {
    json!({
        "id": id,
        "user_id": "u1",
        "title": title,
        "song_path": "songs/x.mp3",
        "image_path": "images/x.png",
        "created_at": "2024-05-01T10:00:00+00:00",
        "album_id": null,
        "duration": 95.0,
        "album": null,
        "song_artists": []
    })
}

fn artist_link(index: usize) -> Value {
    json!({
        "artists": {
            "id": format!("a{}", index),
            "name": format!("Artist {}", index),
            "created_at": "2023-01-01T00:00:00+00:00"
        }
    })
}

fn missing_values() -> Vec<Option<Value>> {
    vec![None, Some(Value::Null), Some(json!(""))]
}

fn with_field(mut row: Value, field: &str, value: Option<Value>) -> Value {
    let object: &mut Map<String, Value> = row.as_object_mut().unwrap();
    match value {
        Some(value) => {
            object.insert(field.to_string(), value);
        }
        None => {
            object.remove(field);
        }
    }
    row
}

#[test]
fn test_rows_missing_id_are_always_rejected() {
    for id in missing_values() {
        for title in [json!("Song"), Value::Null] {
            let row = with_field(base_row(Value::Null, title), "id", id.clone());
            assert_eq!(normalize(Some(&row)), None, "row: {}", row);
            assert_eq!(
                parse_row(&row),
                RowOutcome::Rejected(RejectReason::MissingId)
            );
        }
    }
}

#[test]
fn test_rows_missing_title_are_always_rejected() {
    for title in missing_values() {
        for id in [json!("s1"), json!(7)] {
            let row = with_field(base_row(id, Value::Null), "title", title.clone());
            assert_eq!(normalize(Some(&row)), None, "row: {}", row);
        }
    }
}

#[test]
fn test_artist_count_and_order_match_links() {
    for count in 0..6 {
        let links: Vec<Value> = (0..count).map(artist_link).collect();
        let row = with_field(
            base_row(json!("s1"), json!("Song")),
            "song_artists",
            Some(Value::Array(links)),
        );

        let song = normalize(Some(&row)).unwrap();
        assert_eq!(song.artists.len(), count);
        for (index, artist) in song.artists.iter().enumerate() {
            assert_eq!(artist.id, format!("a{}", index));
        }
    }
}

#[test]
fn test_null_artists_are_dropped_and_order_kept() {
    // Every subset of five links with the masked positions nulled out
    for mask in 0u32..32 {
        let links: Vec<Value> = (0..5)
            .map(|index| {
                if mask & (1 << index) != 0 {
                    json!({ "artists": null })
                } else {
                    artist_link(index)
                }
            })
            .collect();
        let row = with_field(
            base_row(json!("s1"), json!("Song")),
            "song_artists",
            Some(Value::Array(links)),
        );

        let song = normalize(Some(&row)).unwrap();
        let expected: Vec<String> = (0..5)
            .filter(|index| mask & (1 << index) == 0)
            .map(|index| format!("a{}", index))
            .collect();
        let actual: Vec<String> = song.artists.into_iter().map(|artist| artist.id).collect();
        assert_eq!(actual, expected, "mask {:05b}", mask);
    }
}

#[test]
fn test_album_projection() {
    let row = with_field(
        base_row(json!("s1"), json!("Song")),
        "album",
        Some(json!({ "id": 12, "title": "Dusk", "created_at": "2022-02-02", "cover": "x" })),
    );

    let album = normalize(Some(&row)).unwrap().album.unwrap();
    assert_eq!(album.id, "12");
    assert_eq!(album.title, "Dusk");
    assert_eq!(album.created_at, "2022-02-02");
}

#[test]
fn test_only_non_objects_and_missing_keys_are_rejected() {
    let rejected = [
        json!([]),
        json!("s1"),
        json!({}),
        json!({ "id": [1, 2], "title": "x" }),
        json!({ "id": "s1", "title": {} }),
    ];
    for shape in rejected {
        assert!(!parse_row(&shape).is_valid(), "shape: {}", shape);
    }

    let accepted = [
        json!({ "id": "s1", "title": 5 }),
        json!({ "id": "s1", "title": "x", "duration": "long" }),
        json!({ "id": "s1", "title": "x", "duration": "183.4" }),
        json!({ "id": "s1", "title": "x", "album": "none" }),
        json!({ "id": "s1", "title": "x", "album": { "created_at": 1714557600 } }),
        json!({ "id": "s1", "title": "x", "song_artists": [{ "artists": 3 }] }),
        json!({ "id": "s1", "title": "x", "song_artists": { "artists": [] } }),
    ];
    for shape in accepted {
        assert!(parse_row(&shape).is_valid(), "shape: {}", shape);
    }
}
