//!
//! src/tabular.rs
//!
//! Renders record sets as CSV bodies: header row, comma separated values,
//! no index column
//!

use crate::errors::PipelineError;
use crate::types::Tabular;

pub fn to_csv<T: Tabular>(records: &[T]) -> Result<Vec<u8>, PipelineError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    // header goes out by hand so an empty set still gets one
    writer.write_record(T::HEADERS)?;
    for record in records {
        writer.serialize(record)?;
    }

    writer.into_inner()
        .map_err(|e| PipelineError::Csv(format!("flush: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlbumRecord, ArtistRecord, TrackRecord};

    #[test]
    fn track_rows_follow_header() {
        let body = to_csv(&[TrackRecord {
            track_id: "t1".into(),
            track_name: "Paint The Town Red".into(),
            duration_minutes: 3.0,
            popularity: 91,
            album_id: "a1".into(),
            artist_id: "r1".into(),
        }]).unwrap();

        assert_eq!(
            String::from_utf8(body).unwrap(),
            "track_id,track_name,duration_minutes,popularity,album_id,artist_id\n\
             t1,Paint The Town Red,3.0,91,a1,r1\n"
        );
    }

    #[test]
    fn fields_with_commas_are_quoted() {
        let body = to_csv(&[ArtistRecord {
            artist_id: "r1".into(),
            artist_name: "Tyler, The Creator".into(),
        }]).unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            "artist_id,artist_name\nr1,\"Tyler, The Creator\"\n"
        );
    }

    #[test]
    fn empty_set_still_has_header() {
        let body = to_csv::<AlbumRecord>(&[]).unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            "album_id,album_name,release_date,total_tracks\n"
        );
    }
}
