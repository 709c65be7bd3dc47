//! Read-only catalog views used by the listing, home and calendar pages.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::model::{Opportunity, DOMAINS};

pub const MAX_SUGGESTIONS: usize = 6;
pub const MIN_SUGGESTION_QUERY_LEN: usize = 2;

/// Entries with an application deadline, event start or event end on `date` (UTC).
pub fn opportunities_on_date(catalog: &[Opportunity], date: NaiveDate) -> Vec<Opportunity> {
    catalog
        .iter()
        .filter(|o| {
            o.application_end.date_naive() == date
                || o.event_start.date_naive() == date
                || o.event_end.date_naive() == date
        })
        .cloned()
        .collect()
}

/// Featured entries in catalog order, at most `limit`.
pub fn featured_opportunities(catalog: &[Opportunity], limit: usize) -> Vec<Opportunity> {
    catalog
        .iter()
        .filter(|o| o.featured)
        .take(limit)
        .cloned()
        .collect()
}

/// Distinct names, organizers, then known domains containing `query`.
pub fn search_suggestions(catalog: &[Opportunity], query: &str) -> Vec<String> {
    if query.chars().count() < MIN_SUGGESTION_QUERY_LEN {
        return Vec::new();
    }
    let q = query.to_lowercase();
    let names = catalog.iter().map(|o| o.name.as_str());
    let organizers = catalog.iter().map(|o| o.organizer.as_str());

    let mut seen = HashSet::new();
    names
        .chain(organizers)
        .chain(DOMAINS.iter().copied())
        .filter(|candidate| candidate.to_lowercase().contains(&q))
        .filter(|candidate| seen.insert(*candidate))
        .take(MAX_SUGGESTIONS)
        .map(str::to_string)
        .collect()
}
