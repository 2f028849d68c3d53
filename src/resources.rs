//! Related-resource lookups for enrichment
//!
//! Two optional collaborators: a video index (YouTube Data API v3) and a web
//! search index (Google Custom Search). Both degrade to an empty list when
//! unconfigured or failing; neither ever fails the enrichment.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::EnricherConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{VideoResource, WebResource};

/// Keywords queried against the web index
const WEB_QUERY_KEYWORDS: usize = 3;

/// GET a JSON document, mapping non-2xx answers to `Upstream`
///
/// Request URLs are stripped from transport errors because they carry API keys.
async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    query: &[(&str, &str)],
) -> AppResult<T> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| AppError::from(e.without_url()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Upstream(format!("{url} returned {status}")));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| AppError::Upstream(format!("invalid response from {url}: {}", e.without_url())))
}

#[derive(Debug, Deserialize)]
struct VideoSearchResponse {
    #[serde(default)]
    items: Vec<VideoSearchItem>,
}

#[derive(Debug, Deserialize)]
struct VideoSearchItem {
    id: VideoSearchId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSearchId {
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    #[serde(default)]
    snippet: VideoSnippet,
    #[serde(default)]
    statistics: VideoStatistics,
}

#[derive(Debug, Default, Deserialize)]
struct VideoSnippet {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    /// The API sends counts as decimal strings
    #[serde(default)]
    view_count: Option<Value>,
}

impl VideoStatistics {
    fn views(&self) -> u64 {
        match &self.view_count {
            Some(Value::String(s)) => s.parse().unwrap_or(0),
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            _ => 0,
        }
    }
}

/// Video index client
pub struct VideoIndex {
    client: Client,
    api_base: String,
    api_key: Option<SecretString>,
    limit: usize,
}

impl VideoIndex {
    pub fn new(client: Client, config: &EnricherConfig) -> Self {
        Self {
            client,
            api_base: config.youtube_api_base.trim_end_matches('/').to_owned(),
            api_key: config.youtube_api_key.clone(),
            limit: config.result_limit,
        }
    }

    /// Most-viewed videos for the joined keywords
    ///
    /// Empty when no key is configured, no keywords are given, the index has
    /// no hits, or any call fails.
    pub async fn related_videos(&self, keywords: &[String]) -> Vec<VideoResource> {
        let Some(key) = &self.api_key else {
            debug!("video index disabled");
            return Vec::new();
        };
        if keywords.is_empty() || self.limit == 0 {
            return Vec::new();
        }

        match self.search(key.expose_secret(), &keywords.join(" ")).await {
            Ok(videos) => videos,
            Err(e) => {
                warn!(error = %e, "video index lookup failed");
                Vec::new()
            }
        }
    }

    async fn search(&self, key: &str, query: &str) -> AppResult<Vec<VideoResource>> {
        let limit = self.limit.to_string();
        let search: VideoSearchResponse = get_json(
            &self.client,
            &format!("{}/search", self.api_base),
            &[
                ("part", "snippet"),
                ("type", "video"),
                ("q", query),
                ("key", key),
                ("maxResults", &limit),
            ],
        )
        .await?;

        let mut videos = Vec::new();
        for video_id in search.items.into_iter().filter_map(|i| i.id.video_id) {
            let details: VideoListResponse = get_json(
                &self.client,
                &format!("{}/videos", self.api_base),
                &[("part", "statistics,snippet"), ("id", &video_id), ("key", key)],
            )
            .await?;
            if let Some(info) = details.items.into_iter().next() {
                videos.push(VideoResource {
                    title: info.snippet.title,
                    url: format!("https://www.youtube.com/watch?v={video_id}"),
                    views: info.statistics.views(),
                });
            }
        }

        videos.sort_by(|a, b| b.views.cmp(&a.views));
        videos.truncate(self.limit);
        Ok(videos)
    }
}

#[derive(Debug, Deserialize)]
struct WebSearchResponse {
    #[serde(default)]
    items: Vec<WebSearchItem>,
}

#[derive(Debug, Deserialize)]
struct WebSearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Web search client
pub struct WebSearch {
    client: Client,
    api_base: String,
    api_key: Option<SecretString>,
    cx: Option<String>,
    limit: usize,
}

impl WebSearch {
    pub fn new(client: Client, config: &EnricherConfig) -> Self {
        Self {
            client,
            api_base: config.search_api_base.clone(),
            api_key: config.search_api_key.clone(),
            cx: config.google_cx.clone(),
            limit: config.result_limit,
        }
    }

    /// Pages found for the first few keywords, one query per keyword
    ///
    /// A failing keyword is skipped. Empty when credentials are missing.
    pub async fn related_pages(&self, keywords: &[String]) -> Vec<WebResource> {
        let (Some(key), Some(cx)) = (&self.api_key, &self.cx) else {
            debug!("web search disabled");
            return Vec::new();
        };

        let mut pages = Vec::new();
        for keyword in keywords.iter().take(WEB_QUERY_KEYWORDS) {
            let result: AppResult<WebSearchResponse> = get_json(
                &self.client,
                &self.api_base,
                &[("key", key.expose_secret()), ("cx", cx), ("q", keyword)],
            )
            .await;
            match result {
                Ok(response) => pages.extend(response.items.into_iter().map(|item| WebResource {
                    title: item.title,
                    url: item.link,
                    snippet: item.snippet,
                })),
                Err(e) => warn!(keyword = %keyword, error = %e, "web search failed"),
            }
        }

        pages.truncate(self.limit);
        pages
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use reqwest::Client;
    use secrecy::SecretString;
    use serde_json::json;

    use super::{VideoIndex, WebSearch};
    use crate::config::{EnricherConfig, ResourceConfig};
    use crate::test_support::spawn_router;

    fn config(base: &str) -> EnricherConfig {
        let mut config = EnricherConfig::offline(ResourceConfig::new("/unused"));
        config.youtube_api_base = base.to_owned();
        config.search_api_base = format!("{base}/customsearch");
        config.youtube_api_key = Some(SecretString::new("yt-key".into()));
        config.search_api_key = Some(SecretString::new("yt-key".into()));
        config.google_cx = Some("cx-1".to_owned());
        config.result_limit = 2;
        config
    }

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| (*w).to_owned()).collect()
    }

    async fn fake_video_index(search_items: serde_json::Value) -> String {
        let router = Router::new()
            .route(
                "/search",
                get(move || {
                    let items = search_items.clone();
                    async move { Json(json!({ "items": items })) }
                }),
            )
            .route(
                "/videos",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    let id = q.get("id").cloned().unwrap_or_default();
                    let views = match id.as_str() {
                        "low" => "10",
                        "mid" => "500",
                        "high" => "90000",
                        _ => return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))),
                    };
                    (
                        StatusCode::OK,
                        Json(json!({"items": [{
                            "snippet": {"title": format!("video {id}")},
                            "statistics": {"viewCount": views}
                        }]})),
                    )
                }),
            );
        spawn_router(router).await
    }

    #[tokio::test]
    async fn ranks_videos_by_views_and_truncates() {
        let base = fake_video_index(json!([
            {"id": {"videoId": "low"}},
            {"id": {"videoId": "high"}},
            {"id": {"videoId": "mid"}},
        ]))
        .await;
        let index = VideoIndex::new(Client::new(), &config(&base));

        let videos = index.related_videos(&keywords(&["serverless"])).await;
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].views, 90_000);
        assert_eq!(videos[0].url, "https://www.youtube.com/watch?v=high");
        assert_eq!(videos[1].title, "video mid");
    }

    #[tokio::test]
    async fn zero_hits_is_an_empty_list() {
        let base = fake_video_index(json!([])).await;
        let index = VideoIndex::new(Client::new(), &config(&base));
        assert!(index.related_videos(&keywords(&["nothing"])).await.is_empty());
    }

    #[tokio::test]
    async fn failing_statistics_call_empties_the_list() {
        let base = fake_video_index(json!([
            {"id": {"videoId": "high"}},
            {"id": {"videoId": "broken"}},
        ]))
        .await;
        let index = VideoIndex::new(Client::new(), &config(&base));
        assert!(index.related_videos(&keywords(&["serverless"])).await.is_empty());
    }

    #[tokio::test]
    async fn no_key_disables_video_lookup() {
        let mut cfg = config("http://127.0.0.1:9");
        cfg.youtube_api_key = None;
        let index = VideoIndex::new(Client::new(), &cfg);
        assert!(index.related_videos(&keywords(&["serverless"])).await.is_empty());
    }

    #[tokio::test]
    async fn web_search_queries_first_three_keywords_only() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let router = Router::new().route(
            "/customsearch",
            get(move |Query(q): Query<HashMap<String, String>>| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let kw = q.get("q").cloned().unwrap_or_default();
                    if kw == "broken" {
                        return (StatusCode::FORBIDDEN, Json(json!({})));
                    }
                    (
                        StatusCode::OK,
                        Json(json!({"items": [{
                            "title": format!("About {kw}"),
                            "link": format!("https://example.com/{kw}"),
                            "snippet": "..."
                        }]})),
                    )
                }
            }),
        );
        let base = spawn_router(router).await;
        let mut cfg = config(&base);
        cfg.result_limit = 5;
        let search = WebSearch::new(Client::new(), &cfg);

        let pages = search
            .related_pages(&keywords(&["alpha", "broken", "gamma", "delta"]))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let urls: Vec<_> = pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/alpha", "https://example.com/gamma"]);
    }

    #[tokio::test]
    async fn missing_cx_disables_web_search() {
        let mut cfg = config("http://127.0.0.1:9");
        cfg.google_cx = None;
        let search = WebSearch::new(Client::new(), &cfg);
        assert!(search.related_pages(&keywords(&["alpha"])).await.is_empty());
    }
}
