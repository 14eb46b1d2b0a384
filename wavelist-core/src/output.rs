//! Playlist file writer (spec §6): `.m3u8` extended format plus a JSON
//! sidecar with the same basename.

use crate::error::Result;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use wavelist_common::model::Playlist;

#[derive(Debug, Serialize)]
struct SidecarTrack {
    track_id: String,
    position: usize,
    title: String,
    artist: String,
    album: String,
    duration_seconds: u32,
    selection_reason: String,
}

#[derive(Debug, Serialize)]
struct SidecarValidation {
    status: String,
    compliance_percentage: f64,
    gap_analysis: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Sidecar {
    id: uuid::Uuid,
    name: String,
    spec_id: uuid::Uuid,
    tracks: Vec<SidecarTrack>,
    validation: SidecarValidation,
    cost_actual: String,
    generation_time_seconds: f64,
    created_at: chrono::DateTime<chrono::Utc>,
}

/// Write `playlist` to `<output_dir>/<basename>.m3u8` and
/// `<output_dir>/<basename>.json`. Returns the two paths written.
pub fn write_playlist(output_dir: &Path, basename: &str, playlist: &Playlist) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(output_dir)?;
    let m3u8_path = output_dir.join(format!("{basename}.m3u8"));
    let json_path = output_dir.join(format!("{basename}.json"));

    let mut m3u8 = String::new();
    m3u8.push_str("#EXTM3U\n");
    m3u8.push_str(&format!("#PLAYLIST:{}\n", playlist.name));
    let mut ordered = playlist.tracks.clone();
    ordered.sort_by_key(|t| t.position_in_playlist);
    for track in &ordered {
        m3u8.push_str(&format!(
            "#EXTINF:{},{} - {}\n{}\n",
            track.duration_seconds, track.artist, track.title, track.track_id
        ));
    }
    let mut file = std::fs::File::create(&m3u8_path)?;
    file.write_all(m3u8.as_bytes())?;

    let sidecar = Sidecar {
        id: playlist.id,
        name: playlist.name.clone(),
        spec_id: playlist.spec_id,
        tracks: ordered
            .iter()
            .map(|t| SidecarTrack {
                track_id: t.track_id.clone(),
                position: t.position_in_playlist,
                title: t.title.clone(),
                artist: t.artist.clone(),
                album: t.album.clone(),
                duration_seconds: t.duration_seconds,
                selection_reason: t.selection_reasoning.clone(),
            })
            .collect(),
        validation: SidecarValidation {
            status: format!("{:?}", playlist.validation.status).to_uppercase(),
            compliance_percentage: playlist.validation.compliance_percentage,
            gap_analysis: playlist.validation.gap_analysis.clone(),
        },
        cost_actual: playlist.cost_actual.to_string(),
        generation_time_seconds: playlist.generation_time_seconds,
        created_at: playlist.created_at,
    };
    std::fs::write(&json_path, serde_json::to_vec_pretty(&sidecar)?)?;

    Ok((m3u8_path, json_path))
}
