use crate::collab::{
    AssetStore, CatalogFilter, CatalogImage, CatalogItem, CatalogQuery, CollabError,
    EnhancementJob, EnhancementQueue, EnqueueOutcome, HeroCommit, ImageRef, ImageSearch,
    JobStatus, SearchHit,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};

/// In-memory stand-in for every collaborator. Backs the service when no
/// Supabase project or search API is configured, and doubles as the fake in tests.
pub struct DemoBackend {
    products: Mutex<Vec<CatalogItem>>,
    heroes: Mutex<HashMap<String, ImageRef>>,
    jobs: Mutex<HashMap<String, DemoJob>>,
    latency: Duration,
    polls_until_complete: u32,
    search_results: usize,
    empty_queries: HashSet<String>,
    failing_queries: HashSet<String>,
    ignore_limit: bool,
    failed_jobs: HashMap<String, (u32, String)>,
    fail_list: bool,
    fail_commits: bool,
    fail_trigger: bool,
    fail_upload: bool,
    fail_enqueue: bool,
    counters: DemoCounters,
}

#[derive(Default)]
pub struct DemoCounters {
    pub list: AtomicUsize,
    pub search: AtomicUsize,
    pub upload: AtomicUsize,
    pub enqueue: AtomicUsize,
    pub trigger: AtomicUsize,
    pub get_latest: AtomicUsize,
    pub set_hero: AtomicUsize,
    pub approve_existing: AtomicUsize,
    search_in_flight: AtomicUsize,
    max_search_in_flight: AtomicUsize,
}

#[cfg(test)]
impl DemoCounters {
    pub fn max_search_in_flight(&self) -> usize {
        self.max_search_in_flight.load(Ordering::SeqCst)
    }
}

struct DemoJob {
    polls: u32,
}

impl DemoBackend {
    pub fn new(products: Vec<CatalogItem>) -> Self {
        Self {
            products: Mutex::new(products),
            heroes: Mutex::new(HashMap::new()),
            jobs: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            polls_until_complete: 3,
            search_results: 6,
            empty_queries: HashSet::new(),
            failing_queries: HashSet::new(),
            ignore_limit: false,
            failed_jobs: HashMap::new(),
            fail_list: false,
            fail_commits: false,
            fail_trigger: false,
            fail_upload: false,
            fail_enqueue: false,
            counters: DemoCounters::default(),
        }
    }

    pub fn seeded() -> Self {
        let products = [
            ("p-1001", "Cold Brew Coffee Maker", "Brewline", "Downtown"),
            ("p-1002", "Stainless Travel Mug 16oz", "Brewline", "Downtown"),
            ("p-1003", "Organic Green Tea 50ct", "Leafhouse", "Uptown"),
            ("p-1004", "Ceramic Pour Over Set", "Kiln & Co", "Uptown"),
            ("p-1005", "Burr Grinder Pro", "Brewline", "Airport"),
            ("p-1006", "Matcha Whisk Bamboo", "Leafhouse", "Airport"),
        ]
        .into_iter()
        .enumerate()
        .map(|(idx, (id, name, brand, store))| CatalogItem {
            id: id.to_string(),
            name: name.to_string(),
            brand: Some(brand.to_string()),
            store: Some(store.to_string()),
            images: if idx % 2 == 0 {
                vec![CatalogImage {
                    id: format!("{id}-img-0"),
                    url: format!("https://picsum.photos/seed/{id}-0/800/800"),
                    thumbnail_url: Some(format!("https://picsum.photos/seed/{id}-0/200/200")),
                    width: Some(800),
                    height: Some(800),
                    is_primary: false,
                    position: 0,
                }]
            } else {
                Vec::new()
            },
            images_approved: false,
            hero_approved: false,
        })
        .collect();
        Self::new(products).with_latency(Duration::from_millis(40))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
    }
}

#[cfg(test)]
impl DemoBackend {
    pub fn with_polls_until_complete(mut self, polls: u32) -> Self {
        self.polls_until_complete = polls.max(1);
        self
    }

    pub fn with_search_results(mut self, count: usize) -> Self {
        self.search_results = count;
        self
    }

    pub fn with_empty_search(mut self, query: &str) -> Self {
        self.empty_queries.insert(query.to_string());
        self
    }

    pub fn failing_search(mut self, query: &str) -> Self {
        self.failing_queries.insert(query.to_string());
        self
    }

    /// Returns every configured result regardless of the requested limit.
    pub fn ignoring_search_limit(mut self) -> Self {
        self.ignore_limit = true;
        self
    }

    /// The job for `item_id` reports `failed` on the given poll.
    pub fn with_failed_job(mut self, item_id: &str, on_poll: u32, message: &str) -> Self {
        self.failed_jobs
            .insert(item_id.to_string(), (on_poll, message.to_string()));
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_commits(mut self) -> Self {
        self.fail_commits = true;
        self
    }

    pub fn failing_trigger(mut self) -> Self {
        self.fail_trigger = true;
        self
    }

    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    pub fn failing_enqueue(mut self) -> Self {
        self.fail_enqueue = true;
        self
    }

    pub fn counters(&self) -> &DemoCounters {
        &self.counters
    }

    pub async fn hero_for(&self, item_id: &str) -> Option<ImageRef> {
        self.heroes.lock().await.get(item_id).cloned()
    }
}

fn slug(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn matches_filter(item: &CatalogItem, filter: &CatalogFilter, has_hero: bool) -> bool {
    let eq = |field: &Option<String>, wanted: &Option<String>| match wanted {
        Some(w) if !w.trim().is_empty() => field
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case(w.trim())),
        _ => true,
    };
    let name_ok = match filter.search.as_deref().map(str::trim) {
        Some(term) if !term.is_empty() => item.name.to_lowercase().contains(&term.to_lowercase()),
        _ => true,
    };
    (!filter.missing_hero || !has_hero)
        && eq(&item.brand, &filter.brand)
        && eq(&item.store, &filter.store)
        && name_ok
}

#[async_trait]
impl CatalogQuery for DemoBackend {
    async fn list(
        &self,
        filter: &CatalogFilter,
        page: u32,
        limit: u32,
    ) -> Result<Vec<CatalogItem>, CollabError> {
        self.counters.list.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_list {
            return Err(CollabError::Status(503));
        }
        let heroes = self.heroes.lock().await;
        let products = self.products.lock().await;
        Ok(products
            .iter()
            .filter(|item| matches_filter(item, filter, heroes.contains_key(&item.id)))
            .skip(page as usize * limit as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ImageSearch for DemoBackend {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, CollabError> {
        self.counters.search.fetch_add(1, Ordering::SeqCst);
        let now = self.counters.search_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters
            .max_search_in_flight
            .fetch_max(now, Ordering::SeqCst);
        self.pause().await;
        self.counters.search_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_queries.contains(query) {
            return Err(CollabError::Status(503));
        }
        if self.empty_queries.contains(query) {
            return Ok(Vec::new());
        }
        let seed = slug(query);
        let count = if self.ignore_limit {
            self.search_results
        } else {
            self.search_results.min(limit)
        };
        Ok((0..count)
            .map(|i| SearchHit {
                url: format!("https://picsum.photos/seed/{seed}-{i}/1200/1200"),
                thumbnail_url: Some(format!("https://picsum.photos/seed/{seed}-{i}/240/240")),
                width: Some(1200),
                height: Some(1200),
                domain: Some("picsum.photos".into()),
                title: Some(format!("{query} #{}", i + 1)),
            })
            .collect())
    }
}

#[async_trait]
impl AssetStore for DemoBackend {
    async fn upload(&self, url: &str) -> Result<String, CollabError> {
        self.counters.upload.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_upload {
            return Err(CollabError::Status(502));
        }
        if url.trim().is_empty() {
            return Err(CollabError::Rejected("empty source url".into()));
        }
        Ok(format!("https://assets.example.com/materialized/{}", slug(url)))
    }
}

#[async_trait]
impl EnhancementQueue for DemoBackend {
    async fn enqueue(&self, item_id: &str, _url: &str) -> Result<EnqueueOutcome, CollabError> {
        self.counters.enqueue.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_enqueue {
            return Err(CollabError::Request("connection reset".into()));
        }
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(item_id) {
            return Ok(EnqueueOutcome::AlreadyQueued);
        }
        jobs.insert(item_id.to_string(), DemoJob { polls: 0 });
        Ok(EnqueueOutcome::Queued)
    }

    async fn trigger_processing(&self, _batch_size: u32) -> Result<(), CollabError> {
        self.counters.trigger.fetch_add(1, Ordering::SeqCst);
        if self.fail_trigger {
            return Err(CollabError::Status(500));
        }
        Ok(())
    }

    async fn get_latest(&self, item_id: &str) -> Result<Option<EnhancementJob>, CollabError> {
        self.counters.get_latest.fetch_add(1, Ordering::SeqCst);
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(item_id) else {
            return Ok(None);
        };
        job.polls += 1;
        if let Some((on_poll, message)) = self.failed_jobs.get(item_id)
            && job.polls >= *on_poll
        {
            jobs.remove(item_id);
            return Ok(Some(EnhancementJob {
                status: JobStatus::Failed,
                result_url: None,
                error_message: Some(message.clone()),
            }));
        }
        if job.polls >= self.polls_until_complete {
            jobs.remove(item_id);
            return Ok(Some(EnhancementJob {
                status: JobStatus::Completed,
                result_url: Some(format!(
                    "https://assets.example.com/enhanced/{}.png",
                    slug(item_id)
                )),
                error_message: None,
            }));
        }
        let status = if job.polls == 1 {
            JobStatus::Pending
        } else {
            JobStatus::Processing
        };
        Ok(Some(EnhancementJob {
            status,
            result_url: None,
            error_message: None,
        }))
    }
}

#[async_trait]
impl HeroCommit for DemoBackend {
    async fn set_hero(&self, item_id: &str, image: &ImageRef) -> Result<(), CollabError> {
        self.counters.set_hero.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_commits {
            return Err(CollabError::Status(500));
        }
        self.heroes
            .lock()
            .await
            .insert(item_id.to_string(), image.clone());
        Ok(())
    }

    async fn approve_existing(&self, item_id: &str) -> Result<(), CollabError> {
        self.counters.approve_existing.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_commits {
            return Err(CollabError::Status(500));
        }
        let mut products = self.products.lock().await;
        let product = products
            .iter_mut()
            .find(|p| p.id == item_id)
            .ok_or_else(|| CollabError::Rejected(format!("unknown product {item_id}")))?;
        product.images_approved = true;
        Ok(())
    }
}
