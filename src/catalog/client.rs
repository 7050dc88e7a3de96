// HTTP client for the Jamendo-style catalog API
// Every call is a GET on `{base}/{endpoint}/?client_id=..&format=json&...`

use super::{Album, ApiResponse, Artist, CatalogError, CatalogQuery, Order, Playlist, Track};
use futures::future::BoxFuture;
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.jamendo.com/v3.0";
const DEFAULT_LIMIT: u32 = 50;

/// Source of "more tracks" for queue auto-extension and queue seeding.
/// Kept as a trait so the controller can be driven without a network.
pub trait TrackFeed: Send + Sync {
    fn popular_page(&self, offset: u32, limit: u32) -> BoxFuture<'static, Result<Vec<Track>, CatalogError>>;
}

#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            client_id: client_id.into(),
        }
    }

    /// Build the request URL. Caller params override the defaults
    /// (`limit` in particular).
    pub fn endpoint_url(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Url, CatalogError> {
        let mut pairs: Vec<(&str, String)> = vec![
            ("client_id", self.client_id.clone()),
            ("format", "json".to_string()),
            ("limit", DEFAULT_LIMIT.to_string()),
        ];
        for (key, value) in params {
            match pairs.iter_mut().find(|(existing, _)| *existing == *key) {
                Some(slot) => slot.1 = value.clone(),
                None => pairs.push((*key, value.clone())),
            }
        }

        let base = format!("{}/{}/", self.base_url.trim_end_matches('/'), endpoint.trim_matches('/'));
        Url::parse_with_params(&base, &pairs).map_err(|e| CatalogError::InvalidUrl(e.to_string()))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<ApiResponse<T>, CatalogError> {
        let url = self.endpoint_url(endpoint, params)?;
        debug!(endpoint, "catalog request");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(endpoint, status = status.as_u16(), "catalog request rejected");
            return Err(CatalogError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let parsed = parse_response(&body)?;
        debug!(endpoint, results = parsed.results.len(), "catalog response");
        Ok(parsed)
    }

    fn track_params(params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        let mut params = params;
        params.push(("audioformat", "mp32".to_string()));
        params.push(("include", "musicinfo".to_string()));
        params
    }

    pub async fn tracks(&self, query: &CatalogQuery) -> Result<ApiResponse<Track>, CatalogError> {
        self.request("tracks", &Self::track_params(query.to_params())).await
    }

    pub async fn track_by_id(&self, id: &str) -> Result<ApiResponse<Track>, CatalogError> {
        self.request("tracks", &Self::track_params(vec![("id", id.to_string())])).await
    }

    pub async fn search_tracks(&self, search: &str, limit: u32) -> Result<ApiResponse<Track>, CatalogError> {
        let params = vec![("search", search.to_string()), ("limit", limit.to_string())];
        self.request("tracks", &Self::track_params(params)).await
    }

    pub async fn albums(&self, query: &CatalogQuery) -> Result<ApiResponse<Album>, CatalogError> {
        self.request("albums", &query.to_params()).await
    }

    pub async fn album_tracks(&self, album_id: &str) -> Result<ApiResponse<Track>, CatalogError> {
        self.request("albums/tracks", &Self::track_params(vec![("id", album_id.to_string())]))
            .await
    }

    pub async fn artists(&self, query: &CatalogQuery) -> Result<ApiResponse<Artist>, CatalogError> {
        self.request("artists", &query.to_params()).await
    }

    pub async fn artist_tracks(&self, artist_id: &str, limit: u32) -> Result<ApiResponse<Track>, CatalogError> {
        let params = vec![("id", artist_id.to_string()), ("limit", limit.to_string())];
        self.request("artists/tracks", &Self::track_params(params)).await
    }

    pub async fn artist_albums(&self, artist_id: &str, limit: u32) -> Result<ApiResponse<Album>, CatalogError> {
        let params = vec![("id", artist_id.to_string()), ("limit", limit.to_string())];
        self.request("artists/albums", &params).await
    }

    pub async fn playlists(&self, query: &CatalogQuery) -> Result<ApiResponse<Playlist>, CatalogError> {
        self.request("playlists", &query.to_params()).await
    }

    pub async fn playlist_tracks(&self, playlist_id: &str) -> Result<ApiResponse<Track>, CatalogError> {
        self.request("playlists/tracks", &Self::track_params(vec![("id", playlist_id.to_string())]))
            .await
    }

    pub async fn featured_tracks(&self, limit: u32) -> Result<ApiResponse<Track>, CatalogError> {
        self.tracks(&CatalogQuery::new().featured(true).order(Order::PopularityTotal).limit(limit))
            .await
    }

    pub async fn popular_tracks(&self, limit: u32) -> Result<ApiResponse<Track>, CatalogError> {
        self.tracks(&CatalogQuery::new().order(Order::PopularityTotal).limit(limit)).await
    }

    pub async fn new_releases(&self, limit: u32) -> Result<ApiResponse<Track>, CatalogError> {
        self.tracks(&CatalogQuery::new().order(Order::ReleaseDate).limit(limit)).await
    }

    pub async fn tracks_by_genre(&self, genre: &str, limit: u32) -> Result<ApiResponse<Track>, CatalogError> {
        self.tracks(&CatalogQuery::new().tags(genre).order(Order::PopularityTotal).limit(limit))
            .await
    }
}

impl TrackFeed for CatalogClient {
    fn popular_page(&self, offset: u32, limit: u32) -> BoxFuture<'static, Result<Vec<Track>, CatalogError>> {
        let client = self.clone();
        Box::pin(async move {
            let query = CatalogQuery::new()
                .order(Order::PopularityTotal)
                .limit(limit)
                .offset(offset);
            Ok(client.tracks(&query).await?.results)
        })
    }
}

/// Parse a response body, treating an API-level failure header as an error
/// even when the HTTP status was 2xx.
pub fn parse_response<T: DeserializeOwned>(body: &str) -> Result<ApiResponse<T>, CatalogError> {
    let parsed: ApiResponse<T> = serde_json::from_str(body)?;
    if parsed.headers.status.eq_ignore_ascii_case("failed") {
        let message = parsed
            .headers
            .error_message
            .clone()
            .unwrap_or_else(|| format!("code {}", parsed.headers.code));
        return Err(CatalogError::Api(message));
    }
    Ok(parsed)
}
