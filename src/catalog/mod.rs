// Catalog records - what the remote music API hands back
// The player core only ever looks at `results`; headers are checked and dropped

pub mod client;

pub use client::{CatalogClient, TrackFeed};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single playable catalog item. Value object: built once from the API
/// response and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub duration: u32, // seconds
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub artist_id: String,
    #[serde(default)]
    pub album_name: String,
    #[serde(default)]
    pub album_id: String,
    #[serde(default)]
    pub album_image: String,
    pub audio: String, // playable stream URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audiodownload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shorturl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shareurl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub audiodownload_allowed: bool,
}

impl Track {
    /// Minimal constructor for records that did not come from the API.
    pub fn new(id: impl Into<String>, name: impl Into<String>, audio: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            duration: 0,
            artist_name: String::new(),
            artist_id: String::new(),
            album_name: String::new(),
            album_id: String::new(),
            album_image: String::new(),
            audio: audio.into(),
            audiodownload: None,
            shorturl: None,
            shareurl: None,
            image: None,
            audiodownload_allowed: false,
        }
    }

    pub fn with_artist(mut self, artist_id: impl Into<String>, artist_name: impl Into<String>) -> Self {
        self.artist_id = artist_id.into();
        self.artist_name = artist_name.into();
        self
    }

    pub fn with_album(mut self, album_id: impl Into<String>, album_name: impl Into<String>) -> Self {
        self.album_id = album_id.into();
        self.album_name = album_name.into();
        self
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration = seconds;
        self
    }

    pub fn display_artist(&self) -> &str {
        if self.artist_name.is_empty() {
            "Unknown Artist"
        } else {
            &self.artist_name
        }
    }

    /// "Song - Artist", the way the now-playing line shows it
    pub fn display_line(&self) -> String {
        format!("{} - {}", self.name, self.display_artist())
    }

    pub fn duration_string(&self) -> String {
        format_clock(f64::from(self.duration))
    }

    /// Case-insensitive match over name, artist and album
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        [&self.name, &self.artist_name, &self.album_name]
            .iter()
            .any(|field| field.to_lowercase().contains(&query))
    }
}

/// Formats seconds as `m:ss`, or `h:mm:ss` past the hour.
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub releasedate: String,
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub artist_id: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shareurl: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub joindate: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shareurl: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub creationdate: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseHeaders {
    pub status: String,
    #[serde(default)]
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<String>,
    #[serde(default)]
    pub results_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub headers: ResponseHeaders,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

/// Sort orders understood by the catalog. Not every endpoint accepts every
/// order; the catalog rejects mismatches with an API error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    PopularityTotal,
    PopularityMonth,
    PopularityWeek,
    #[serde(rename = "releasedate")]
    ReleaseDate,
    Name,
    #[serde(rename = "joindate")]
    JoinDate,
    #[serde(rename = "creationdate")]
    CreationDate,
}

impl Order {
    pub fn as_str(&self) -> &'static str {
        match self {
            Order::PopularityTotal => "popularity_total",
            Order::PopularityMonth => "popularity_month",
            Order::PopularityWeek => "popularity_week",
            Order::ReleaseDate => "releasedate",
            Order::Name => "name",
            Order::JoinDate => "joindate",
            Order::CreationDate => "creationdate",
        }
    }
}

/// Listing parameters shared by the tracks/albums/artists/playlists endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogQuery {
    pub order: Option<Order>,
    pub tags: Option<String>,
    pub search: Option<String>,
    pub featured: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl CatalogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn featured(mut self, featured: bool) -> Self {
        self.featured = Some(featured);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(order) = self.order {
            params.push(("order", order.as_str().to_string()));
        }
        if let Some(tags) = &self.tags {
            params.push(("tags", tags.clone()));
        }
        if let Some(search) = &self.search {
            params.push(("search", search.clone()));
        }
        if let Some(featured) = self.featured {
            params.push(("featured", featured.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset", offset.to_string()));
        }
        params
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("catalog returned HTTP {0}")]
    Status(u16),
    #[error("catalog reported an error: {0}")]
    Api(String),
    #[error("malformed catalog response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid catalog URL: {0}")]
    InvalidUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_keep_only_set_fields() {
        let params = CatalogQuery::new()
            .order(Order::PopularityTotal)
            .tags("rock")
            .limit(20)
            .offset(40)
            .to_params();

        assert_eq!(
            params,
            vec![
                ("order", "popularity_total".to_string()),
                ("tags", "rock".to_string()),
                ("limit", "20".to_string()),
                ("offset", "40".to_string()),
            ]
        );
        assert!(CatalogQuery::new().to_params().is_empty());
    }

    #[test]
    fn test_track_tolerates_sparse_records() {
        let json = r#"{"id":"42","name":"Lanterns","audio":"https://cdn.example/42.mp3"}"#;
        let track: Track = serde_json::from_str(json).unwrap();

        assert_eq!(track.id, "42");
        assert_eq!(track.duration, 0);
        assert_eq!(track.display_artist(), "Unknown Artist");
        assert!(track.audiodownload.is_none());
    }

    #[test]
    fn test_track_matches_name_artist_album() {
        let track = Track::new("1", "Night Drive", "u")
            .with_artist("a1", "Kavinsky")
            .with_album("al1", "OutRun");

        assert!(track.matches("night"));
        assert!(track.matches("KAVIN"));
        assert!(track.matches("outrun"));
        assert!(track.matches("   "));
        assert!(!track.matches("jazz"));
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0.0), "0:00");
        assert_eq!(format_clock(65.9), "1:05");
        assert_eq!(format_clock(3725.0), "1:02:05");
        assert_eq!(format_clock(f64::NAN), "0:00");
        assert_eq!(Track::new("1", "x", "u").with_duration(200).duration_string(), "3:20");
    }
}
