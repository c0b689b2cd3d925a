//!
//! src/transform.rs
//!
//! Flattens one raw playlist payload into album, artist and track record
//! sets. Pure computation; the normalizer job does all the storage I/O.
//!
//! Deduplication compares whole records, not ids: two entries sharing an id
//! but differing in any other field are both kept. Each extractor scans what
//! it has collected so far before appending, so output is in first-seen order.
//!

use serde::Deserialize;
use serde_json::Value;

use crate::errors::PipelineError;
use crate::types::{
    AlbumRecord, ArtistRecord, RawPlaylistPayload, RecordSets, TrackRecord
};

/// Milliseconds to minutes rounded to two places.
/// Rounds the exact binary value of the quotient (ties to even); scaling by
/// 100 first would add its own rounding error and shift some results.
pub fn milli_to_min(milliseconds: u64) -> f64 {
    let minutes = milliseconds as f64 / 60000.0;
    format!("{minutes:.2}").parse().unwrap_or(minutes)
}

fn push_unique<T: PartialEq>(records: &mut Vec<T>, record: T) {
    if !records.contains(&record) {
        records.push(record);
    }
}

pub fn extract_albums(payload: &RawPlaylistPayload) -> Vec<AlbumRecord> {
    let mut albums = Vec::new();
    for item in &payload.tracks.items {
        let album = &item.track.album;
        push_unique(&mut albums, AlbumRecord {
            album_id: album.id.clone(),
            album_name: album.name.clone(),
            release_date: album.release_date.clone(),
            total_tracks: album.total_tracks,
        });
    }
    albums
}

pub fn extract_artists(payload: &RawPlaylistPayload) -> Vec<ArtistRecord> {
    let mut artists = Vec::new();
    for item in &payload.tracks.items {
        for artist in &item.track.artists {
            push_unique(&mut artists, ArtistRecord {
                artist_id: artist.id.clone(),
                artist_name: artist.name.clone(),
            });
        }
    }
    artists
}

pub fn extract_tracks(payload: &RawPlaylistPayload) -> Result<Vec<TrackRecord>, PipelineError> {
    let mut tracks = Vec::new();
    for item in &payload.tracks.items {
        let track = &item.track;
        let first_artist = track.artists.first().ok_or_else(|| PipelineError::Transform(
            format!("track {} has no artists", track.id)
        ))?;
        push_unique(&mut tracks, TrackRecord {
            track_id: track.id.clone(),
            track_name: track.name.clone(),
            duration_minutes: milli_to_min(track.duration_ms),
            popularity: track.popularity,
            album_id: track.album.id.clone(),
            artist_id: first_artist.id.clone(),
        });
    }
    Ok(tracks)
}

/// Decodes the payload shape, then runs the three extractors.
/// Any absent or null field fails the whole transform.
pub fn transform(raw: &Value) -> Result<RecordSets, PipelineError> {
    let payload = RawPlaylistPayload::deserialize(raw)
        .map_err(|e| PipelineError::Transform(e.to_string()))?;

    let albums  = extract_albums(&payload);
    let artists = extract_artists(&payload);
    let tracks  = extract_tracks(&payload)?;

    tracing::debug!(
        albums = albums.len(),
        artists = artists.len(),
        tracks = tracks.len(),
        "transform.done"
    );
    Ok( RecordSets { albums, artists, tracks } )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn item(track_id: &str, album: Value, artists: Value) -> Value {
        json!({
            "added_at": "2024-01-01T00:00:00Z",
            "track": {
                "id": track_id,
                "name": format!("Track {track_id}"),
                "duration_ms": 180000,
                "popularity": 55,
                "explicit": false,
                "album": album,
                "artists": artists
            }
        })
    }

    fn album(id: &str) -> Value {
        json!({
            "id": id,
            "name": format!("Album {id}"),
            "release_date": "2023-10-06",
            "total_tracks": 12,
            "album_type": "album"
        })
    }

    fn artist(id: &str, name: &str) -> Value {
        json!({ "id": id, "name": name, "type": "artist" })
    }

    fn payload(items: Vec<Value>) -> Value {
        json!({ "id": "pl", "name": "Top 50", "tracks": { "total": items.len(), "items": items } })
    }

    #[test]
    fn milli_to_min_rounds_to_two_places() {
        assert_eq!(milli_to_min(180000), 3.0);
        assert_eq!(milli_to_min(125000), 2.08);
        assert_eq!(milli_to_min(0), 0.0);
        assert_eq!(milli_to_min(215_600), 3.59);
    }

    #[test]
    fn milli_to_min_rounds_the_quotient_not_a_scaled_copy() {
        // the quotient's binary value sits just above or below the midpoint
        assert_eq!(milli_to_min(300), 0.01);
        assert_eq!(milli_to_min(900), 0.01);
        assert_eq!(milli_to_min(1500), 0.03);
        assert_eq!(milli_to_min(195_900), 3.27);
    }

    #[test]
    fn milli_to_min_exact_tie_goes_to_even() {
        // 7500 ms is exactly 0.125 minutes
        assert_eq!(milli_to_min(7500), 0.12);
    }

    #[test]
    fn identical_albums_collapse_to_one() {
        let raw = payload(vec![
            item("t1", album("a1"), json!([artist("r1", "One")])),
            item("t2", album("a1"), json!([artist("r2", "Two")])),
            item("t3", album("a1"), json!([artist("r3", "Three")])),
        ]);
        let sets = transform(&raw).unwrap();
        assert_eq!(sets.albums.len(), 1);
        assert_eq!(sets.albums[0], AlbumRecord {
            album_id: "a1".into(),
            album_name: "Album a1".into(),
            release_date: "2023-10-06".into(),
            total_tracks: 12,
        });
        assert_eq!(sets.tracks.len(), 3);
    }

    #[test]
    fn same_artist_id_with_different_name_is_kept_twice() {
        let raw = payload(vec![
            item("t1", album("a1"), json!([artist("r1", "Beyonce")])),
            item("t2", album("a1"), json!([artist("r1", "Beyoncé")])),
        ]);
        let sets = transform(&raw).unwrap();
        assert_eq!(sets.artists, vec![
            ArtistRecord { artist_id: "r1".into(), artist_name: "Beyonce".into() },
            ArtistRecord { artist_id: "r1".into(), artist_name: "Beyoncé".into() },
        ]);
    }

    #[test]
    fn track_links_only_the_first_artist() {
        let raw = payload(vec![
            item("t1", album("a1"), json!([
                artist("r1", "Lead"),
                artist("r2", "Feature"),
                artist("r3", "Other"),
            ])),
        ]);
        let sets = transform(&raw).unwrap();
        assert_eq!(sets.tracks[0].artist_id, "r1");
        // every contributor still lands in the artist set
        assert_eq!(sets.artists.len(), 3);
    }

    #[test]
    fn artists_keep_first_seen_order() {
        let raw = payload(vec![
            item("t1", album("a1"), json!([artist("r2", "B"), artist("r1", "A")])),
            item("t2", album("a2"), json!([artist("r1", "A"), artist("r3", "C")])),
        ]);
        let ids: Vec<_> = transform(&raw).unwrap()
            .artists.into_iter()
            .map(|a| a.artist_id)
            .collect();
        assert_eq!(ids, ["r2", "r1", "r3"]);
    }

    #[test]
    fn repeated_track_is_deduplicated() {
        let entry = item("t1", album("a1"), json!([artist("r1", "A")]));
        let raw = payload(vec![entry.clone(), entry]);
        let sets = transform(&raw).unwrap();
        assert_eq!(sets.tracks.len(), 1);
        assert_eq!(sets.albums.len(), 1);
        assert_eq!(sets.artists.len(), 1);
    }

    #[test]
    fn empty_playlist_yields_empty_sets() {
        let sets = transform(&payload(vec![])).unwrap();
        assert_eq!(sets, RecordSets::default());
    }

    #[test]
    fn references_resolve_within_payload() {
        let raw = payload(vec![
            item("t1", album("a1"), json!([artist("r1", "A"), artist("r2", "B")])),
            item("t2", album("a2"), json!([artist("r2", "B")])),
            item("t3", album("a1"), json!([artist("r3", "C")])),
        ]);
        let sets = transform(&raw).unwrap();
        for track in &sets.tracks {
            assert!(sets.albums.iter().any(|a| a.album_id == track.album_id));
            assert!(sets.artists.iter().any(|a| a.artist_id == track.artist_id));
        }
    }

    #[test]
    fn null_field_fails_whole_transform() {
        let mut broken = item("t2", album("a2"), json!([artist("r2", "B")]));
        broken["track"]["album"]["release_date"] = Value::Null;
        let raw = payload(vec![
            item("t1", album("a1"), json!([artist("r1", "A")])),
            broken,
        ]);
        assert!(matches!(transform(&raw), Err(PipelineError::Transform(_))));
    }

    #[test]
    fn missing_track_fails_whole_transform() {
        let raw = payload(vec![json!({ "track": null })]);
        assert!(matches!(transform(&raw), Err(PipelineError::Transform(_))));

        let raw = json!({ "id": "pl" });
        assert!(matches!(transform(&raw), Err(PipelineError::Transform(_))));
    }

    #[test]
    fn track_without_artists_fails() {
        let raw = payload(vec![item("t1", album("a1"), json!([]))]);
        assert!(matches!(transform(&raw), Err(PipelineError::Transform(m)) if m.contains("t1")));
    }
}
