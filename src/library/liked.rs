// Liked-tracks store
// A keyed set persisted as one JSON array. Every mutation rewrites the file;
// storage trouble is logged and never reaches the caller.

use crate::catalog::Track;
use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikedTrack {
    #[serde(flatten)]
    pub track: Track,
    #[serde(rename = "dateAdded")]
    pub date_added: i64, // epoch millis
}

/// On-disk shape accepted at load time; older files have no `dateAdded`.
#[derive(Deserialize)]
struct StoredTrack {
    #[serde(flatten)]
    track: Track,
    #[serde(rename = "dateAdded", default)]
    date_added: Option<i64>,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub struct LikedTracksStore {
    path: PathBuf,
    tracks: Vec<LikedTrack>, // insertion order
}

impl LikedTracksStore {
    /// Load the store backing `path`. A missing or unreadable file gives an
    /// empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let tracks = match Self::load(&path) {
            Ok(tracks) => {
                info!(count = tracks.len(), "Loaded liked tracks");
                tracks
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Error loading liked tracks, starting empty");
                Vec::new()
            }
        };
        Self { path, tracks }
    }

    fn load(path: &Path) -> Result<Vec<LikedTrack>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)?;
        let stored: Vec<StoredTrack> = serde_json::from_str(&content)?;

        let now = now_millis();
        let mut tracks: Vec<LikedTrack> = Vec::with_capacity(stored.len());
        for record in stored {
            if tracks.iter().any(|t| t.track.id == record.track.id) {
                warn!(id = %record.track.id, "Skipping duplicate liked track");
                continue;
            }
            let date_added = match record.date_added {
                Some(ts) if ts > 0 => ts,
                _ => now,
            };
            tracks.push(LikedTrack { track: record.track, date_added });
        }
        Ok(tracks)
    }

    fn save(&self) {
        if let Err(e) = self.write() {
            error!(path = %self.path.display(), error = %e, "Error saving liked tracks");
        } else {
            debug!(count = self.tracks.len(), "Saved liked tracks");
        }
    }

    fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(&self.tracks)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_liked(&self, track_id: &str) -> bool {
        self.tracks.iter().any(|t| t.track.id == track_id)
    }

    /// Returns whether the track is liked afterwards.
    pub fn toggle_like(&mut self, track: &Track) -> bool {
        if self.is_liked(&track.id) {
            self.remove_from_liked(&track.id);
            false
        } else {
            self.add_to_liked(track);
            true
        }
    }

    pub fn add_to_liked(&mut self, track: &Track) {
        if self.is_liked(&track.id) {
            return;
        }
        info!("Adding to liked tracks: {}", track.name);
        self.tracks.push(LikedTrack {
            track: track.clone(),
            date_added: now_millis(),
        });
        self.save();
    }

    pub fn remove_from_liked(&mut self, track_id: &str) {
        let before = self.tracks.len();
        self.tracks.retain(|t| t.track.id != track_id);
        if self.tracks.len() != before {
            info!(id = track_id, "Removed from liked tracks");
            self.save();
        }
    }

    pub fn clear(&mut self) {
        info!("Clearing all liked tracks");
        self.tracks.clear();
        self.save();
    }

    pub fn liked_tracks(&self) -> &[LikedTrack] {
        &self.tracks
    }

    pub fn count(&self) -> usize {
        self.tracks.len()
    }

    /// Liked tracks matching `query` on name, artist or album; an empty query
    /// matches everything.
    pub fn search(&self, query: &str) -> Vec<&LikedTrack> {
        self.tracks.iter().filter(|t| t.track.matches(query)).collect()
    }

    /// The plain tracks, ready to hand to the queue.
    pub fn playable(&self, query: &str) -> Vec<Track> {
        self.search(query).into_iter().map(|t| t.track.clone()).collect()
    }
}

/// "Just now", "42 sec ago", "3 hr ago", "2 weeks ago" and so on, relative to `now_ms`.
pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let seconds = (now_ms - timestamp_ms).max(0) / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;
    let weeks = days / 7;
    let months = days / 30;
    let years = days / 365;

    fn plural(n: i64, unit: &str) -> String {
        if n == 1 {
            format!("1 {} ago", unit)
        } else {
            format!("{} {}s ago", n, unit)
        }
    }

    if seconds < 60 {
        if seconds <= 5 {
            "Just now".to_string()
        } else {
            format!("{} sec ago", seconds)
        }
    } else if minutes < 60 {
        format!("{} min ago", minutes)
    } else if hours < 24 {
        format!("{} hr ago", hours)
    } else if days < 7 {
        plural(days, "day")
    } else if weeks < 4 {
        plural(weeks, "week")
    } else if months < 12 {
        plural(months.max(1), "month")
    } else {
        plural(years.max(1), "year")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn track(id: &str, name: &str, artist: &str) -> Track {
        Track::new(id, name, format!("https://cdn.example/{}.mp3", id)).with_artist(format!("a-{}", id), artist)
    }

    fn store_in(dir: &TempDir) -> LikedTracksStore {
        LikedTracksStore::open(dir.path().join("liked-tracks.json"))
    }

    #[test]
    fn test_toggle_like_adds_then_removes() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let t = track("1", "Blue Hour", "Nia");

        let before = now_millis();
        assert!(store.toggle_like(&t));
        assert!(store.is_liked("1"));
        assert_eq!(store.count(), 1);
        assert!(store.liked_tracks()[0].date_added >= before);

        assert!(!store.toggle_like(&t));
        assert!(!store.is_liked("1"));
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_add_and_remove_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let t = track("1", "Blue Hour", "Nia");

        store.add_to_liked(&t);
        let first_added = store.liked_tracks()[0].date_added;
        store.add_to_liked(&t);
        assert_eq!(store.count(), 1);
        assert_eq!(store.liked_tracks()[0].date_added, first_added);

        store.remove_from_liked("1");
        store.remove_from_liked("1");
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_every_mutation_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("liked.json");
        let mut store = LikedTracksStore::open(&path);

        store.add_to_liked(&track("1", "Blue Hour", "Nia"));
        store.add_to_liked(&track("2", "Tidewater", "Oren"));
        store.remove_from_liked("1");

        let reopened = LikedTracksStore::open(&path);
        let ids: Vec<&str> = reopened.liked_tracks().iter().map(|t| t.track.id.as_str()).collect();
        assert_eq!(ids, vec!["2"]);
        assert_eq!(reopened.liked_tracks()[0], store.liked_tracks()[0]);

        store.clear();
        assert_eq!(LikedTracksStore::open(&path).count(), 0);
    }

    #[test]
    fn test_legacy_records_get_backfilled_date() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("liked.json");
        fs::write(
            &path,
            r#"[{"id":"7","name":"Old Song","audio":"https://cdn.example/7.mp3"},
                {"id":"8","name":"Dated","audio":"https://cdn.example/8.mp3","dateAdded":1700000000000}]"#,
        )
        .unwrap();

        let before = now_millis();
        let store = LikedTracksStore::open(&path);
        assert_eq!(store.count(), 2);
        assert!(store.liked_tracks()[0].date_added >= before);
        assert_eq!(store.liked_tracks()[1].date_added, 1_700_000_000_000);
    }

    #[test]
    fn test_corrupt_file_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("liked.json");
        fs::write(&path, "{ not json").unwrap();

        let store = LikedTracksStore::open(&path);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_duplicate_ids_collapse_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("liked.json");
        fs::write(
            &path,
            r#"[{"id":"7","name":"A","audio":"u","dateAdded":5},{"id":"7","name":"A again","audio":"u","dateAdded":9}]"#,
        )
        .unwrap();

        let store = LikedTracksStore::open(&path);
        assert_eq!(store.count(), 1);
        assert_eq!(store.liked_tracks()[0].track.name, "A");
    }

    #[test]
    fn test_search_matches_name_and_artist() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.add_to_liked(&track("1", "Blue Hour", "Nia"));
        store.add_to_liked(&track("2", "Tidewater", "Oren"));

        assert_eq!(store.search("blue").len(), 1);
        assert_eq!(store.search("OREN")[0].track.id, "2");
        assert_eq!(store.search("").len(), 2);
        assert_eq!(store.playable("tide").len(), 1);
    }

    #[test]
    fn test_format_relative_time() {
        let now = 1_000_000_000_000;
        let sec = 1000;
        let min = 60 * sec;
        let hr = 60 * min;
        let day = 24 * hr;

        assert_eq!(format_relative_time(now - 3 * sec, now), "Just now");
        assert_eq!(format_relative_time(now + 10 * sec, now), "Just now");
        assert_eq!(format_relative_time(now - 42 * sec, now), "42 sec ago");
        assert_eq!(format_relative_time(now - min, now), "1 min ago");
        assert_eq!(format_relative_time(now - 5 * hr, now), "5 hr ago");
        assert_eq!(format_relative_time(now - day, now), "1 day ago");
        assert_eq!(format_relative_time(now - 3 * day, now), "3 days ago");
        assert_eq!(format_relative_time(now - 14 * day, now), "2 weeks ago");
        assert_eq!(format_relative_time(now - 29 * day, now), "1 month ago");
        assert_eq!(format_relative_time(now - 90 * day, now), "3 months ago");
        assert_eq!(format_relative_time(now - 800 * day, now), "2 years ago");
    }
}
