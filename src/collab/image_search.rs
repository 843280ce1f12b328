use crate::collab::config::IMAGE_SEARCH_KEY_HEADER;
use crate::collab::{CollabError, ImageSearch, SearchHit};
use crate::http::build_client;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

/// JSON image-search API client (`POST {q, num}` → `{images: [...]}`).
#[derive(Debug, Clone)]
pub struct HttpImageSearch {
    endpoint: String,
    api_key: Option<String>,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    images: Vec<ImageResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResult {
    image_url: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    image_width: Option<u32>,
    #[serde(default)]
    image_height: Option<u32>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

impl HttpImageSearch {
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("IMAGE_SEARCH_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())?;
        Some(Self {
            endpoint,
            api_key: std::env::var("IMAGE_SEARCH_API_KEY").ok(),
            http: build_client(),
        })
    }
}

fn hits_from_response(payload: SearchResponse, limit: usize) -> Vec<SearchHit> {
    payload
        .images
        .into_iter()
        .filter_map(|image| {
            let url = image.image_url?.trim().to_string();
            let scheme_ok = reqwest::Url::parse(&url)
                .map(|parsed| matches!(parsed.scheme(), "http" | "https"))
                .unwrap_or(false);
            scheme_ok.then(|| SearchHit {
                url,
                thumbnail_url: image.thumbnail_url,
                width: image.image_width,
                height: image.image_height,
                domain: image.domain,
                title: image.title,
            })
        })
        .take(limit)
        .collect()
}

#[async_trait]
impl ImageSearch for HttpImageSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, CollabError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "q": query, "num": limit }));
        if let Some(key) = &self.api_key {
            request = request.header(IMAGE_SEARCH_KEY_HEADER.as_str(), key);
        }
        let response = request.send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(CollabError::Rejected("image search rate limited".into()));
        }
        if !response.status().is_success() {
            return Err(CollabError::Status(response.status().as_u16()));
        }
        let payload: SearchResponse = response
            .json()
            .await
            .map_err(|err| CollabError::Deserialize(err.to_string()))?;
        Ok(hits_from_response(payload, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_skip_missing_and_non_http_urls() {
        let payload: SearchResponse = serde_json::from_value(json!({
            "images": [
                {"imageUrl": "https://shop.example.com/a.jpg", "imageWidth": 800, "imageHeight": 600, "domain": "shop.example.com"},
                {"title": "no url"},
                {"imageUrl": "ftp://files.example.com/b.jpg"},
                {"imageUrl": "https://cdn.example.com/c.png", "thumbnailUrl": "https://cdn.example.com/c_t.png"},
            ]
        }))
        .expect("payload");
        let hits = hits_from_response(payload, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].width, Some(800));
        assert_eq!(hits[0].domain.as_deref(), Some("shop.example.com"));
        assert_eq!(
            hits[1].thumbnail_url.as_deref(),
            Some("https://cdn.example.com/c_t.png")
        );
    }

    #[test]
    fn hits_respect_limit() {
        let images = (0..5)
            .map(|i| json!({"imageUrl": format!("https://img.example.com/{i}.jpg")}))
            .collect::<Vec<_>>();
        let payload: SearchResponse =
            serde_json::from_value(json!({ "images": images })).expect("payload");
        assert_eq!(hits_from_response(payload, 3).len(), 3);
    }
}
