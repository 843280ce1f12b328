use crate::collab::config::{
    HERO_RPC, JOBS_TABLE, MATERIALIZE_FUNCTION, PROCESS_QUEUE_FUNCTION, PRODUCTS_TABLE,
};
use crate::collab::{
    AssetStore, CatalogFilter, CatalogItem, CatalogQuery, CollabError, EnhancementJob,
    EnhancementQueue, EnqueueOutcome, HeroCommit, ImageRef,
};
use crate::http::build_client;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use urlencoding::encode;

const PRODUCT_COLUMNS: &str = "id,name,brand,store,images_approved,hero_approved,images:product_images(id,url,thumbnail_url,width,height,is_primary,position)";

/// PostgREST + edge-function client backing the catalog, the enhancement queue,
/// asset materialization and hero commits.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    base_url: String,
    service_key: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct MaterializeResponse {
    url: String,
}

impl SupabaseClient {
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SUPABASE_URL").ok()?;
        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .or_else(|_| std::env::var("SUPABASE_SERVICE_KEY"))
            .or_else(|_| std::env::var("SUPABASE_KEY"))
            .ok()?;
        Some(Self::new(base_url, service_key))
    }

    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            http: build_client(),
        }
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    fn rest(&self, path: &str) -> String {
        format!("{}/rest/v1/{path}", self.base_url)
    }

    fn function(&self, name: &str) -> String {
        format!("{}/functions/v1/{name}", self.base_url)
    }

    fn products_url(&self, filter: &CatalogFilter, page: u32, limit: u32) -> String {
        let mut query = vec![
            format!("select={PRODUCT_COLUMNS}"),
            "order=id.asc".to_string(),
            format!("offset={}", page as u64 * limit as u64),
            format!("limit={limit}"),
        ];
        if filter.missing_hero {
            query.push("hero_image_id=is.null".to_string());
        }
        if let Some(brand) = filter.brand.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            query.push(format!("brand=eq.{}", encode(brand)));
        }
        if let Some(store) = filter.store.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query.push(format!("store=eq.{}", encode(store)));
        }
        if let Some(term) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query.push(format!("name=ilike.*{}*", encode(term)));
        }
        format!("{}?{}", self.rest(&PRODUCTS_TABLE), query.join("&"))
    }
}

async fn ensure_success(response: Response) -> Result<Response, CollabError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(CollabError::Status(response.status().as_u16()))
    }
}

#[async_trait]
impl CatalogQuery for SupabaseClient {
    async fn list(
        &self,
        filter: &CatalogFilter,
        page: u32,
        limit: u32,
    ) -> Result<Vec<CatalogItem>, CollabError> {
        let url = self.products_url(filter, page, limit);
        debug!(target = "hermes.collab", %url, "catalog_list");
        let response = self.authed(self.http.get(url)).send().await?;
        let payload: Vec<CatalogItem> = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|err| CollabError::Deserialize(err.to_string()))?;
        Ok(payload)
    }
}

#[async_trait]
impl AssetStore for SupabaseClient {
    async fn upload(&self, url: &str) -> Result<String, CollabError> {
        let response = self
            .authed(self.http.post(self.function(&MATERIALIZE_FUNCTION)))
            .json(&json!({ "url": url }))
            .send()
            .await?;
        let payload: MaterializeResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|err| CollabError::Deserialize(err.to_string()))?;
        if payload.url.trim().is_empty() {
            return Err(CollabError::Deserialize("empty canonical url".into()));
        }
        Ok(payload.url)
    }
}

#[async_trait]
impl EnhancementQueue for SupabaseClient {
    async fn enqueue(&self, item_id: &str, url: &str) -> Result<EnqueueOutcome, CollabError> {
        let response = self
            .authed(self.http.post(self.rest(&JOBS_TABLE)))
            .header("Prefer", "return=minimal")
            .json(&json!({
                "product_id": item_id,
                "source_url": url,
                "status": "pending",
            }))
            .send()
            .await?;
        // A unique index on open jobs per product turns a duplicate into 409.
        if response.status() == StatusCode::CONFLICT {
            return Ok(EnqueueOutcome::AlreadyQueued);
        }
        ensure_success(response).await?;
        Ok(EnqueueOutcome::Queued)
    }

    async fn trigger_processing(&self, batch_size: u32) -> Result<(), CollabError> {
        let response = self
            .authed(self.http.post(self.function(&PROCESS_QUEUE_FUNCTION)))
            .json(&json!({ "batch_size": batch_size }))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn get_latest(&self, item_id: &str) -> Result<Option<EnhancementJob>, CollabError> {
        let url = format!(
            "{}?product_id=eq.{}&select=status,result_url,error_message&order=created_at.desc&limit=1",
            self.rest(&JOBS_TABLE),
            encode(item_id)
        );
        let response = self.authed(self.http.get(url)).send().await?;
        let mut rows: Vec<EnhancementJob> = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|err| CollabError::Deserialize(err.to_string()))?;
        Ok(rows.pop())
    }
}

#[async_trait]
impl HeroCommit for SupabaseClient {
    async fn set_hero(&self, item_id: &str, image: &ImageRef) -> Result<(), CollabError> {
        let body = match image {
            ImageRef::Existing { image_id } => json!({
                "p_product_id": item_id,
                "p_image_id": image_id,
            }),
            ImageRef::Candidate { url, source } => json!({
                "p_product_id": item_id,
                "p_image_url": url,
                "p_source": source,
            }),
        };
        let response = self
            .authed(self.http.post(self.rest(&format!("rpc/{}", *HERO_RPC))))
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn approve_existing(&self, item_id: &str) -> Result<(), CollabError> {
        let url = format!("{}?id=eq.{}", self.rest(&PRODUCTS_TABLE), encode(item_id));
        let response = self
            .authed(self.http.patch(url))
            .header("Prefer", "return=minimal")
            .json(&json!({ "images_approved": true }))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn products_url_applies_filter_and_paging() {
        let client = SupabaseClient::new("https://db.example.com/", "key");
        let filter = CatalogFilter {
            brand: Some("Acme & Co".into()),
            search: Some("  mug ".into()),
            page: 2,
            ..CatalogFilter::default()
        };
        let url = client.products_url(&filter, filter.page, 25);
        assert!(url.starts_with("https://db.example.com/rest/v1/products?select="));
        assert!(url.contains("offset=50"));
        assert!(url.contains("limit=25"));
        assert!(url.contains("hero_image_id=is.null"));
        assert!(url.contains("brand=eq.Acme%20%26%20Co"));
        assert!(url.contains("name=ilike.*mug*"));
        assert!(!url.contains("store="));
    }

    #[test]
    fn products_url_without_missing_hero_filter() {
        let client = SupabaseClient::new("https://db.example.com", "key");
        let filter = CatalogFilter {
            missing_hero: false,
            ..CatalogFilter::default()
        };
        let url = client.products_url(&filter, 0, 10);
        assert!(!url.contains("hero_image_id"));
        assert!(url.contains("offset=0"));
    }

    #[test]
    fn job_rows_deserialize() {
        let rows: Vec<EnhancementJob> = serde_json::from_str(
            r#"[{"status":"completed","result_url":"https://cdn.example.com/x.png","error_message":null}]"#,
        )
        .expect("job rows");
        assert_eq!(rows[0].status, crate::collab::JobStatus::Completed);
        assert_eq!(
            rows[0].result_url.as_deref(),
            Some("https://cdn.example.com/x.png")
        );
    }
}
