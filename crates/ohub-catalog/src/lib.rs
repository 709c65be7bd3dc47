//! Catalog assembly: the local catalog merged with an optional external source,
//! with fallback on failure and last-request-wins across concurrent refreshes.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ohub_adapters::{
    ingest_raw_records, local_catalog, ExternalSource, FixtureSource, NoExternalSource,
    SearchExtractConfig, SearchExtractSource,
};
use ohub_core::Opportunity;
use ohub_storage::{HttpClientConfig, HttpFetcher};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info, warn};

pub const CRATE_NAME: &str = "ohub-catalog";

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub external_fixture: Option<PathBuf>,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub refresh_enabled: bool,
    pub refresh_cron: String,
}

impl CatalogConfig {
    pub fn from_env() -> Self {
        Self {
            external_fixture: std::env::var("OHUB_EXTERNAL_FIXTURE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            user_agent: std::env::var("OHUB_USER_AGENT")
                .unwrap_or_else(|_| "opportunity-hub/0.1".to_string()),
            http_timeout_secs: std::env::var("OHUB_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            refresh_enabled: std::env::var("OHUB_REFRESH_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            refresh_cron: std::env::var("OHUB_REFRESH_CRON")
                .unwrap_or_else(|_| "0 0 */6 * * *".to_string()),
        }
    }
}

/// Local entries first, then external entries whose name (case-insensitive)
/// is not already present. Later duplicates within `external` are dropped too.
pub fn merge_catalogs(local: &[Opportunity], external: Vec<Opportunity>) -> Vec<Opportunity> {
    let mut seen = local
        .iter()
        .map(|o| o.name.to_lowercase())
        .collect::<HashSet<_>>();
    let mut merged = local.to_vec();
    merged.extend(
        external
            .into_iter()
            .filter(|o| seen.insert(o.name.to_lowercase())),
    );
    merged
}

struct CatalogState {
    applied_generation: u64,
    catalog: Vec<Opportunity>,
    last_error: Option<String>,
}

pub struct CatalogService {
    local: Vec<Opportunity>,
    source: Arc<dyn ExternalSource>,
    generation: AtomicU64,
    state: Mutex<CatalogState>,
}

impl CatalogService {
    pub fn new(local: Vec<Opportunity>, source: Arc<dyn ExternalSource>) -> Self {
        let state = CatalogState {
            applied_generation: 0,
            catalog: local.clone(),
            last_error: None,
        };
        Self {
            local,
            source,
            generation: AtomicU64::new(0),
            state: Mutex::new(state),
        }
    }

    /// Service over the bundled local catalog and the source selected by `config`.
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        let local = local_catalog()?;
        let source = build_source(config)?;
        info!(
            local = local.len(),
            source = source.source_id(),
            "catalog service ready"
        );
        Ok(Self::new(local, source))
    }

    pub fn local(&self) -> &[Opportunity] {
        &self.local
    }

    pub fn source_id(&self) -> &'static str {
        self.source.source_id()
    }

    pub async fn get_catalog(&self) -> Vec<Opportunity> {
        self.get_catalog_at(Utc::now()).await
    }

    /// Fetch, map and merge external records. Never fails: on error or an
    /// empty external result the local catalog is returned. If a newer call
    /// has already been applied, this call's result is discarded and the
    /// current snapshot is returned instead.
    pub async fn get_catalog_at(&self, now: DateTime<Utc>) -> Vec<Opportunity> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let (catalog, error) = match self.source.fetch_raw_records().await {
            Ok(records) => {
                let external = ingest_raw_records(records, now);
                if external.is_empty() {
                    debug!(generation, "external source returned nothing; using local catalog");
                    (self.local.clone(), None)
                } else {
                    let merged = merge_catalogs(&self.local, external);
                    info!(generation, total = merged.len(), "merged external records");
                    (merged, None)
                }
            }
            Err(err) => {
                warn!(generation, error = %err, "external fetch failed; using local catalog");
                (self.local.clone(), Some(err.to_string()))
            }
        };

        let mut state = self.state.lock().await;
        if generation <= state.applied_generation {
            debug!(
                generation,
                applied = state.applied_generation,
                "discarding stale catalog result"
            );
            return state.catalog.clone();
        }
        state.applied_generation = generation;
        state.catalog = catalog.clone();
        state.last_error = error;
        catalog
    }

    /// The most recently applied catalog.
    pub async fn snapshot(&self) -> Vec<Opportunity> {
        self.state.lock().await.catalog.clone()
    }

    /// Error from the most recently applied fetch, if it failed.
    pub async fn last_error(&self) -> Option<String> {
        self.state.lock().await.last_error.clone()
    }
}

/// A fixture path wins over live search; without API keys nothing is fetched.
pub fn build_source(config: &CatalogConfig) -> Result<Arc<dyn ExternalSource>> {
    if let Some(path) = &config.external_fixture {
        return Ok(Arc::new(FixtureSource::new(path.clone())));
    }

    let search = SearchExtractConfig::from_env();
    if !search.is_configured() {
        return Ok(Arc::new(NoExternalSource));
    }

    let http = HttpFetcher::new(HttpClientConfig {
        timeout: Duration::from_secs(config.http_timeout_secs),
        user_agent: Some(config.user_agent.clone()),
        ..Default::default()
    })?;
    Ok(Arc::new(SearchExtractSource::new(http, search)))
}

pub async fn maybe_build_scheduler(
    service: Arc<CatalogService>,
    config: &CatalogConfig,
) -> Result<Option<JobScheduler>> {
    if !config.refresh_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let cron = config.refresh_cron.as_str();
    let job = Job::new_async(cron, move |_uuid, _l| {
        let service = service.clone();
        Box::pin(async move {
            let catalog = service.get_catalog().await;
            info!(total = catalog.len(), "scheduled catalog refresh finished");
        })
    })
    .with_context(|| format!("creating refresh job for cron {cron}"))?;
    sched.add(job).await.context("adding refresh job")?;
    info!(cron, "catalog refresh scheduled");
    Ok(Some(sched))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use ohub_adapters::{AdapterError, RawRecord};
    use ohub_core::{Category, Level, Mode};
    use tokio::sync::oneshot;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).single().unwrap()
    }

    fn local(id: &str, name: &str) -> Opportunity {
        Opportunity {
            id: id.to_string(),
            name: name.to_string(),
            organizer: "Local".to_string(),
            description: String::new(),
            category: Category::Opensource,
            mode: Mode::Online,
            level: Level::Intermediate,
            application_start: now(),
            application_end: now(),
            event_start: now(),
            event_end: now(),
            location: None,
            country: "Worldwide".to_string(),
            is_india_focused: false,
            eligibility: vec![],
            tech_stack: vec![],
            domains: vec![],
            stipend: None,
            prizes: None,
            selection_criteria: None,
            official_link: format!("https://local.example.org/{id}"),
            application_link: None,
            logo_url: None,
            banner_url: None,
            featured: false,
            verified: true,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn raw(name: &str) -> RawRecord {
        RawRecord {
            name: Some(name.to_string()),
            official_link: Some(format!("https://ext.example.org/{}", name.replace(' ', "-"))),
            ..Default::default()
        }
    }

    fn names(list: &[Opportunity]) -> Vec<&str> {
        list.iter().map(|o| o.name.as_str()).collect()
    }

    struct StaticSource(Result<Vec<RawRecord>, String>);

    #[async_trait]
    impl ExternalSource for StaticSource {
        fn source_id(&self) -> &'static str {
            "static"
        }

        async fn fetch_raw_records(&self) -> Result<Vec<RawRecord>, AdapterError> {
            self.0.clone().map_err(AdapterError::Message)
        }
    }

    /// Each call waits on the next gate in order, so tests control completion order.
    struct GatedSource {
        gates: std::sync::Mutex<VecDeque<oneshot::Receiver<Vec<RawRecord>>>>,
    }

    impl GatedSource {
        fn pending(&self) -> usize {
            self.gates.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ExternalSource for GatedSource {
        fn source_id(&self) -> &'static str {
            "gated"
        }

        async fn fetch_raw_records(&self) -> Result<Vec<RawRecord>, AdapterError> {
            let gate = self.gates.lock().unwrap().pop_front().expect("gate available");
            gate.await.map_err(|e| AdapterError::Message(e.to_string()))
        }
    }

    #[test]
    fn merge_prefers_local_on_case_insensitive_name_match() {
        let local = vec![local("gsoc-2025", "GSoC 2025")];
        let external = ingest_raw_records(vec![raw("gsoc 2025"), raw("HackBangalore")], now());

        let merged = merge_catalogs(&local, external);
        assert_eq!(names(&merged), vec!["GSoC 2025", "HackBangalore"]);
        assert_eq!(merged[0].id, "gsoc-2025");
    }

    #[test]
    fn merge_collapses_duplicates_within_external_batch() {
        let external = ingest_raw_records(vec![raw("Hack"), raw("HACK"), raw("Other")], now());
        let merged = merge_catalogs(&[], external);
        assert_eq!(names(&merged), vec!["Hack", "Other"]);
    }

    #[tokio::test]
    async fn failure_yields_exactly_the_local_catalog() {
        let local = vec![local("a", "A"), local("b", "B")];
        let service = CatalogService::new(
            local.clone(),
            Arc::new(StaticSource(Err("quota exceeded".into()))),
        );

        let catalog = service.get_catalog_at(now()).await;
        assert_eq!(catalog, local);
        assert_eq!(service.last_error().await.as_deref(), Some("quota exceeded"));
    }

    #[tokio::test]
    async fn empty_or_unmappable_external_result_falls_back() {
        let local = vec![local("a", "A")];
        let nameless = RawRecord {
            official_link: Some("https://x.example.org".into()),
            ..Default::default()
        };
        let service = CatalogService::new(local.clone(), Arc::new(StaticSource(Ok(vec![nameless]))));

        assert_eq!(service.get_catalog_at(now()).await, local);
        assert_eq!(service.last_error().await, None);
    }

    #[tokio::test]
    async fn success_merges_and_clears_last_error() {
        let service = CatalogService::new(
            vec![local("a", "A")],
            Arc::new(StaticSource(Ok(vec![raw("B")]))),
        );
        {
            let mut state = service.state.lock().await;
            state.last_error = Some("earlier failure".into());
        }

        let catalog = service.get_catalog_at(now()).await;
        assert_eq!(names(&catalog), vec!["A", "B"]);
        assert_eq!(names(&service.snapshot().await), vec!["A", "B"]);
        assert_eq!(service.last_error().await, None);
    }

    #[tokio::test]
    async fn snapshot_starts_as_local_catalog() {
        let local = vec![local("a", "A")];
        let service = CatalogService::new(local.clone(), Arc::new(NoExternalSource));
        assert_eq!(service.snapshot().await, local);
    }

    #[tokio::test]
    async fn stale_result_is_discarded_in_favour_of_newer_one() {
        let (older_tx, older_rx) = oneshot::channel();
        let (newer_tx, newer_rx) = oneshot::channel();
        let source = Arc::new(GatedSource {
            gates: std::sync::Mutex::new(VecDeque::from([older_rx, newer_rx])),
        });
        let service = Arc::new(CatalogService::new(vec![local("a", "A")], source.clone()));

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.get_catalog_at(now()).await }
        });
        while source.pending() == 2 {
            tokio::task::yield_now().await;
        }
        let second = tokio::spawn({
            let service = service.clone();
            async move { service.get_catalog_at(now()).await }
        });
        while source.pending() == 1 {
            tokio::task::yield_now().await;
        }

        newer_tx.send(vec![raw("Newer")]).unwrap();
        let newer = second.await.unwrap();
        assert_eq!(names(&newer), vec!["A", "Newer"]);

        older_tx.send(vec![raw("Older")]).unwrap();
        let older = first.await.unwrap();
        assert_eq!(names(&older), vec!["A", "Newer"]);
        assert_eq!(names(&service.snapshot().await), vec!["A", "Newer"]);
    }

    #[tokio::test]
    async fn scheduler_is_only_built_when_enabled() {
        let service = Arc::new(CatalogService::new(vec![], Arc::new(NoExternalSource)));
        let config = CatalogConfig {
            external_fixture: None,
            user_agent: "test".into(),
            http_timeout_secs: 1,
            refresh_enabled: false,
            refresh_cron: "0 0 */6 * * *".into(),
        };
        assert!(maybe_build_scheduler(service, &config).await.unwrap().is_none());
    }
}
