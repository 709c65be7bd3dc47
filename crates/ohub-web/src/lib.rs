//! Axum JSON API over the opportunity catalog.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{rejection::QueryRejection, Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use ohub_catalog::{maybe_build_scheduler, CatalogConfig, CatalogService};
use ohub_core::{
    days_until_deadline, featured_opportunities, filter_opportunities, is_urgent,
    opportunities_on_date, resolve_status, search_suggestions, sort_opportunities, Category,
    FilterCriteria, Level, Mode, Opportunity, SortKey, Status, StatusFilter, Tone,
};
use ohub_storage::BookmarkStore;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "ohub-web";

pub const DEFAULT_PER_PAGE: usize = 20;
pub const DEFAULT_FEATURED_LIMIT: usize = 4;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
    pub bookmarks: Arc<BookmarkStore>,
    fixed_now: Option<DateTime<Utc>>,
}

impl AppState {
    pub fn new(catalog: Arc<CatalogService>, bookmarks: Arc<BookmarkStore>) -> Self {
        Self {
            catalog,
            bookmarks,
            fixed_now: None,
        }
    }

    /// Evaluate statuses against a fixed instant instead of the wall clock.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.fixed_now.unwrap_or_else(Utc::now)
    }
}

/// Listing query string. List-valued parameters are comma separated.
#[derive(Debug, Deserialize, Default)]
struct OpportunitiesQuery {
    q: Option<String>,
    status: Option<String>,
    category: Option<String>,
    mode: Option<String>,
    level: Option<String>,
    domains: Option<String>,
    india: Option<String>,
    stipend: Option<String>,
    sort: Option<String>,
    page: Option<String>,
    per_page: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct FeaturedQuery {
    limit: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CalendarQuery {
    date: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SuggestionsQuery {
    q: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisplayMeta {
    pub category_label: &'static str,
    pub category_icon: &'static str,
    pub mode_label: &'static str,
    pub level_label: &'static str,
    pub status_label: &'static str,
    pub status_tone: Tone,
}

/// An entry plus everything derived from the current instant and bookmarks.
#[derive(Debug, Clone, Serialize)]
pub struct OpportunityView {
    #[serde(flatten)]
    pub opportunity: Opportunity,
    pub status: Status,
    pub days_until_deadline: i64,
    pub urgent: bool,
    pub bookmarked: bool,
    pub display: DisplayMeta,
}

impl OpportunityView {
    fn build(opportunity: Opportunity, now: DateTime<Utc>, bookmarked: &BTreeSet<String>) -> Self {
        let status = resolve_status(&opportunity, now);
        let display = DisplayMeta {
            category_label: opportunity.category.label(),
            category_icon: opportunity.category.icon(),
            mode_label: opportunity.mode.label(),
            level_label: opportunity.level.label(),
            status_label: status.label(),
            status_tone: status.tone(),
        };
        Self {
            days_until_deadline: days_until_deadline(opportunity.application_end, now),
            urgent: is_urgent(&opportunity, now),
            bookmarked: bookmarked.contains(&opportunity.id),
            status,
            display,
            opportunity,
        }
    }
}

#[derive(Debug, Serialize)]
struct ListingResponse {
    total: usize,
    page: usize,
    per_page: usize,
    total_pages: usize,
    sort: SortKey,
    active_filters: usize,
    criteria: FilterCriteria,
    items: Vec<OpportunityView>,
}

#[derive(Debug, Clone, Serialize)]
struct FacetCountRow {
    category: Category,
    label: &'static str,
    count: usize,
    selected: bool,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/opportunities", get(opportunities_handler))
        .route("/api/opportunities/{id}", get(opportunity_detail_handler))
        .route("/api/featured", get(featured_handler))
        .route("/api/calendar", get(calendar_handler))
        .route("/api/suggestions", get(suggestions_handler))
        .route("/api/facets", get(facets_handler))
        .route("/api/bookmarks", get(bookmarks_handler))
        .route("/api/bookmarks/{id}/toggle", post(bookmark_toggle_handler))
        .route("/api/catalog/refresh", post(refresh_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("OHUB_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let bookmarks_path =
        std::env::var("OHUB_BOOKMARKS_PATH").unwrap_or_else(|_| "./bookmarks.json".to_string());

    let config = CatalogConfig::from_env();
    let catalog = Arc::new(CatalogService::from_config(&config)?);
    let bookmarks = Arc::new(BookmarkStore::open(bookmarks_path).await);

    tokio::spawn({
        let catalog = catalog.clone();
        async move {
            let loaded = catalog.get_catalog().await;
            info!(total = loaded.len(), "initial catalog load finished");
        }
    });
    let scheduler = maybe_build_scheduler(catalog.clone(), &config).await?;
    if let Some(sched) = &scheduler {
        sched.start().await.context("starting refresh scheduler")?;
    }

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    info!(port, "serving opportunity API");
    axum::serve(listener, app(AppState::new(catalog, bookmarks))).await?;
    Ok(())
}

async fn opportunities_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<OpportunitiesQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let (criteria, sort) = match criteria_from_query(&query) {
        Ok(parsed) => parsed,
        Err(message) => return bad_request(message),
    };
    let (page, per_page) = match (
        parse_count("page", query.page.as_deref()),
        parse_count("per_page", query.per_page.as_deref()),
    ) {
        (Ok(page), Ok(per_page)) => (
            page.unwrap_or(1),
            per_page.unwrap_or(DEFAULT_PER_PAGE).max(1),
        ),
        (Err(message), _) | (_, Err(message)) => return bad_request(message),
    };
    let now = state.now();
    let catalog = state.catalog.snapshot().await;
    let filtered = sort_opportunities(filter_opportunities(&catalog, &criteria, now), sort);

    let total = filtered.len();
    let total_pages = total.max(1).div_ceil(per_page);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * per_page;

    let bookmarked = bookmarked_set(&state).await;
    let items = filtered
        .into_iter()
        .skip(start)
        .take(per_page)
        .map(|o| OpportunityView::build(o, now, &bookmarked))
        .collect();

    Json(ListingResponse {
        total,
        page,
        per_page,
        total_pages,
        sort,
        active_filters: criteria.active_filter_count(),
        criteria,
        items,
    })
    .into_response()
}

async fn opportunity_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let catalog = state.catalog.snapshot().await;
    match catalog.into_iter().find(|o| o.id == id) {
        Some(opportunity) => {
            let bookmarked = bookmarked_set(&state).await;
            Json(OpportunityView::build(opportunity, state.now(), &bookmarked)).into_response()
        }
        None => not_found(format!("opportunity '{id}' not found")),
    }
}

async fn featured_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<FeaturedQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let limit = match parse_count("limit", query.limit.as_deref()) {
        Ok(limit) => limit.unwrap_or(DEFAULT_FEATURED_LIMIT),
        Err(message) => return bad_request(message),
    };
    let catalog = state.catalog.snapshot().await;
    let items = featured_opportunities(&catalog, limit);
    views_response(&state, items).await
}

async fn calendar_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<CalendarQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let Some(raw) = query.date.as_deref() else {
        return bad_request("missing 'date' parameter (YYYY-MM-DD)".to_string());
    };
    let date = match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => return bad_request(format!("invalid date '{raw}', expected YYYY-MM-DD")),
    };
    let catalog = state.catalog.snapshot().await;
    views_response(&state, opportunities_on_date(&catalog, date)).await
}

async fn suggestions_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SuggestionsQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let catalog = state.catalog.snapshot().await;
    let suggestions = search_suggestions(&catalog, query.q.as_deref().unwrap_or_default());
    Json(serde_json::json!({ "suggestions": suggestions })).into_response()
}

async fn facets_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<OpportunitiesQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let (criteria, _sort) = match criteria_from_query(&query) {
        Ok(parsed) => parsed,
        Err(message) => return bad_request(message),
    };
    let catalog = state.catalog.snapshot().await;
    let filtered = filter_opportunities(&catalog, &criteria, state.now());

    let mut counts = BTreeMap::<Category, usize>::new();
    for o in &filtered {
        *counts.entry(o.category).or_default() += 1;
    }
    let categories = Category::ALL
        .into_iter()
        .map(|category| FacetCountRow {
            category,
            label: category.label(),
            count: counts.get(&category).copied().unwrap_or(0),
            selected: criteria
                .category
                .as_ref()
                .is_some_and(|set| set.contains(&category)),
        })
        .collect::<Vec<_>>();

    Json(serde_json::json!({
        "total": filtered.len(),
        "categories": categories,
    }))
    .into_response()
}

async fn bookmarks_handler(State(state): State<Arc<AppState>>) -> Response {
    let ids = state.bookmarks.ids().await;
    let catalog = state.catalog.snapshot().await;
    let items = catalog
        .into_iter()
        .filter(|o| ids.contains(&o.id))
        .collect::<Vec<_>>();
    let now = state.now();
    let bookmarked = ids.iter().cloned().collect::<BTreeSet<_>>();
    let items = items
        .into_iter()
        .map(|o| OpportunityView::build(o, now, &bookmarked))
        .collect::<Vec<_>>();
    Json(serde_json::json!({ "ids": ids, "items": items })).into_response()
}

async fn bookmark_toggle_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let catalog = state.catalog.snapshot().await;
    if !catalog.iter().any(|o| o.id == id) {
        return not_found(format!("opportunity '{id}' not found"));
    }
    match state.bookmarks.toggle(&id).await {
        Ok(bookmarked) => Json(serde_json::json!({ "id": id, "bookmarked": bookmarked })).into_response(),
        Err(err) => server_error(err.into()),
    }
}

async fn refresh_handler(State(state): State<Arc<AppState>>) -> Response {
    let catalog = state.catalog.get_catalog().await;
    let last_error = state.catalog.last_error().await;
    if let Some(err) = &last_error {
        warn!(error = %err, "catalog refresh fell back to local catalog");
    }
    Json(serde_json::json!({
        "total": catalog.len(),
        "source": state.catalog.source_id(),
        "last_error": last_error,
    }))
    .into_response()
}

async fn views_response(state: &AppState, items: Vec<Opportunity>) -> Response {
    let now = state.now();
    let bookmarked = bookmarked_set(state).await;
    let items = items
        .into_iter()
        .map(|o| OpportunityView::build(o, now, &bookmarked))
        .collect::<Vec<_>>();
    Json(serde_json::json!({ "total": items.len(), "items": items })).into_response()
}

async fn bookmarked_set(state: &AppState) -> BTreeSet<String> {
    state.bookmarks.ids().await.into_iter().collect()
}

fn parse_set<T>(raw: Option<&str>) -> Result<Option<BTreeSet<T>>, String>
where
    T: FromStr + Ord,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else { return Ok(None) };
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<T>().map_err(|e| e.to_string()))
        .collect::<Result<BTreeSet<T>, String>>()
        .map(Some)
}

fn parse_count(name: &str, raw: Option<&str>) -> Result<Option<usize>, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<usize>()
            .map(Some)
            .map_err(|_| format!("invalid '{name}' value '{value}', expected a non-negative integer")),
    }
}

fn flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(str::trim),
        Some("1" | "true" | "TRUE" | "True" | "yes" | "on")
    )
}

fn criteria_from_query(query: &OpportunitiesQuery) -> Result<(FilterCriteria, SortKey), String> {
    let status_filter = match query.status.as_deref().map(str::trim) {
        None | Some("") => StatusFilter::All,
        Some(raw) => raw.parse::<StatusFilter>().map_err(|e| e.to_string())?,
    };
    let sort = match query.sort.as_deref().map(str::trim) {
        None | Some("") => SortKey::default(),
        Some(raw) => raw.parse::<SortKey>().map_err(|e| e.to_string())?,
    };

    let criteria = FilterCriteria {
        category: parse_set::<Category>(query.category.as_deref())?,
        mode: parse_set::<Mode>(query.mode.as_deref())?,
        level: parse_set::<Level>(query.level.as_deref())?,
        domains: parse_set::<String>(query.domains.as_deref())?,
        india_only: flag(query.india.as_deref()),
        has_stipend: flag(query.stipend.as_deref()),
        status_filter,
        search_query: query.q.clone(),
    }
    .normalize();
    Ok((criteria, sort))
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn bad_request(message: String) -> Response {
    error_response(StatusCode::BAD_REQUEST, message)
}

fn not_found(message: String) -> Response {
    error_response(StatusCode::NOT_FOUND, message)
}

fn server_error(err: anyhow::Error) -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}
