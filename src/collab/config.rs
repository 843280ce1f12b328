use once_cell::sync::Lazy;
use std::env;

pub static PRODUCTS_TABLE: Lazy<String> =
    Lazy::new(|| env::var("CATALOG_PRODUCTS_TABLE").unwrap_or_else(|_| "products".to_string()));

pub static JOBS_TABLE: Lazy<String> = Lazy::new(|| {
    env::var("ENHANCEMENT_JOBS_TABLE").unwrap_or_else(|_| "image_enhancement_jobs".to_string())
});

pub static HERO_RPC: Lazy<String> =
    Lazy::new(|| env::var("HERO_COMMIT_RPC").unwrap_or_else(|_| "set_product_hero".to_string()));

pub static MATERIALIZE_FUNCTION: Lazy<String> = Lazy::new(|| {
    env::var("MATERIALIZE_FUNCTION").unwrap_or_else(|_| "materialize-image".to_string())
});

pub static PROCESS_QUEUE_FUNCTION: Lazy<String> = Lazy::new(|| {
    env::var("PROCESS_QUEUE_FUNCTION").unwrap_or_else(|_| "process-enhancement-queue".to_string())
});

pub static IMAGE_SEARCH_KEY_HEADER: Lazy<String> =
    Lazy::new(|| env::var("IMAGE_SEARCH_KEY_HEADER").unwrap_or_else(|_| "X-API-KEY".to_string()));
