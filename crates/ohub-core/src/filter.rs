//! Predicate engine: AND across axes, OR within a multi-valued axis.

use chrono::{DateTime, Utc};

use crate::criteria::FilterCriteria;
use crate::model::Opportunity;
use crate::status::resolve_status;

fn matches_search(opportunity: &Opportunity, query: &str) -> bool {
    let query = query.to_lowercase();
    let hit = |text: &str| text.to_lowercase().contains(&query);
    hit(&opportunity.name)
        || hit(&opportunity.organizer)
        || hit(&opportunity.description)
        || opportunity.domains.iter().any(|d| hit(d))
}

/// Whether a single record satisfies every axis of `criteria` at `now`.
pub fn matches(opportunity: &Opportunity, criteria: &FilterCriteria, now: DateTime<Utc>) -> bool {
    if let Some(query) = criteria.search_query.as_deref().filter(|q| !q.is_empty()) {
        if !matches_search(opportunity, query) {
            return false;
        }
    }

    if let Some(status) = criteria.status_filter.status() {
        if resolve_status(opportunity, now) != status {
            return false;
        }
    }

    if let Some(categories) = criteria.category.as_ref().filter(|s| !s.is_empty()) {
        if !categories.contains(&opportunity.category) {
            return false;
        }
    }

    if let Some(modes) = criteria.mode.as_ref().filter(|s| !s.is_empty()) {
        if !modes.contains(&opportunity.mode) {
            return false;
        }
    }

    if let Some(levels) = criteria.level.as_ref().filter(|s| !s.is_empty()) {
        if !levels.contains(&opportunity.level) {
            return false;
        }
    }

    if let Some(domains) = criteria.domains.as_ref().filter(|s| !s.is_empty()) {
        if !opportunity.domains.iter().any(|d| domains.contains(d)) {
            return false;
        }
    }

    if criteria.india_only && !opportunity.is_india_focused {
        return false;
    }

    if criteria.has_stipend && !opportunity.has_monetary_benefit() {
        return false;
    }

    true
}

/// Stable subsequence of `catalog` matching `criteria`.
pub fn filter_opportunities(
    catalog: &[Opportunity],
    criteria: &FilterCriteria,
    now: DateTime<Utc>,
) -> Vec<Opportunity> {
    catalog
        .iter()
        .filter(|o| matches(o, criteria, now))
        .cloned()
        .collect()
}
