//!
//! src/types.rs
//!
//! Shapes of the raw playlist payload as the catalog returns it and of the
//! three flattened record kinds written out by the normalizer
//!

use serde::{Deserialize, Serialize};

/// Only the fields the normalizer reads; everything else in the response is
/// ignored. No field is optional, a null or absent value fails decoding.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlaylistPayload {
    pub tracks: PlaylistTracks,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistTracks {
    pub items: Vec<PlaylistItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistItem {
    pub track: RawTrack,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTrack {
    pub id: String,
    pub name: String,
    pub duration_ms: u64,
    pub popularity: u32,
    pub album: RawAlbum,
    pub artists: Vec<RawArtist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAlbum {
    pub id: String,
    pub name: String,
    pub release_date: String,
    pub total_tracks: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawArtist {
    pub id: String,
    pub name: String,
}

/// Fixed CSV header per record kind, written even when there are no rows
pub trait Tabular: Serialize {
    const HEADERS: &'static [&'static str];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbumRecord {
    pub album_id: String,
    pub album_name: String,
    pub release_date: String,
    pub total_tracks: u32,
}

impl Tabular for AlbumRecord {
    const HEADERS: &'static [&'static str] =
        &["album_id", "album_name", "release_date", "total_tracks"];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistRecord {
    pub artist_id: String,
    pub artist_name: String,
}

impl Tabular for ArtistRecord {
    const HEADERS: &'static [&'static str] = &["artist_id", "artist_name"];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRecord {
    pub track_id: String,
    pub track_name: String,
    pub duration_minutes: f64,
    pub popularity: u32,
    pub album_id: String,
    // first listed artist only
    pub artist_id: String,
}

impl Tabular for TrackRecord {
    const HEADERS: &'static [&'static str] = &[
        "track_id", "track_name", "duration_minutes", "popularity", "album_id", "artist_id"
    ];
}

/// The three record sets derived from one payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSets {
    pub albums: Vec<AlbumRecord>,
    pub artists: Vec<ArtistRecord>,
    pub tracks: Vec<TrackRecord>,
}
