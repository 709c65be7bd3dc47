//! Loosely-typed records produced by external extraction and their mapping
//! into [`Opportunity`].

use chrono::{DateTime, Duration, NaiveDate, Utc};
use ohub_core::{Category, Level, Mode, Opportunity};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;
use uuid::Uuid;

/// Days granted to apply when an external record omits its deadline.
pub const DEFAULT_APPLICATION_DAYS: i64 = 30;

/// One extracted record. Keys follow the extraction prompt's camelCase shape;
/// every field is optional and tolerant of sloppy values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRecord {
    #[serde(deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub organizer: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub category: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub mode: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub level: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub application_start: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub application_end: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub event_start: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub event_end: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub location: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub country: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub is_india_focused: Option<bool>,
    #[serde(deserialize_with = "lenient_list")]
    pub eligibility: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub tech_stack: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub domains: Vec<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub stipend: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub prizes: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub selection_criteria: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub official_link: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub application_link: Option<String>,
}

/// Trimmed text, with blanks and a literal `null` treated as absent.
pub(crate) fn text_or_none(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::String(s)) => text_or_none(&s),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::Bool(b)) => Some(b),
        Some(JsonValue::String(s)) => s.trim().to_ascii_lowercase().parse().ok(),
        _ => None,
    })
}

fn lenient_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().and_then(text_or_none))
            .collect(),
        _ => Vec::new(),
    })
}

/// `YYYY-MM-DD` at midnight UTC, or a full RFC 3339 timestamp.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn window(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    default_end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let end = end.unwrap_or(default_end);
    let start = start.unwrap_or_else(|| now.min(end));
    (start <= end).then_some((start, end))
}

/// Stable id for an external record, derived from its official link.
pub fn external_id(official_link: &str) -> String {
    format!(
        "api-{}",
        Uuid::new_v5(&Uuid::NAMESPACE_URL, official_link.as_bytes())
    )
}

impl RawRecord {
    /// Map into an [`Opportunity`], or `None` when the record lacks a name or
    /// official link, or carries an inverted date window.
    pub fn into_opportunity(self, now: DateTime<Utc>) -> Option<Opportunity> {
        let Some(name) = self.name else {
            debug!("dropping external record without a name");
            return None;
        };
        let Some(official_link) = self.official_link else {
            debug!(name = %name, "dropping external record without an official link");
            return None;
        };

        let date = |v: &Option<String>| v.as_deref().and_then(parse_date);
        let Some((application_start, application_end)) = window(
            date(&self.application_start),
            date(&self.application_end),
            now + Duration::days(DEFAULT_APPLICATION_DAYS),
            now,
        ) else {
            debug!(name = %name, "dropping external record with inverted application window");
            return None;
        };

        let event_start_raw = date(&self.event_start);
        let event_end_raw = date(&self.event_end).or(event_start_raw);
        let Some((event_start, event_end)) =
            window(event_start_raw, event_end_raw, now, now)
        else {
            debug!(name = %name, "dropping external record with inverted event window");
            return None;
        };

        let category = self
            .category
            .as_deref()
            .and_then(|c| c.parse::<Category>().ok())
            .unwrap_or(Category::Hackathon);
        let mode = self
            .mode
            .as_deref()
            .and_then(|m| m.parse::<Mode>().ok())
            .unwrap_or(Mode::Online);
        let level = self
            .level
            .as_deref()
            .and_then(|l| l.parse::<Level>().ok())
            .unwrap_or(Level::Intermediate);

        Some(Opportunity {
            id: external_id(&official_link),
            organizer: self.organizer.unwrap_or_else(|| "Unknown".to_string()),
            description: self.description.unwrap_or_default(),
            name,
            category,
            mode,
            level,
            application_start,
            application_end,
            event_start,
            event_end,
            location: self.location,
            country: self.country.unwrap_or_else(|| "Worldwide".to_string()),
            is_india_focused: self.is_india_focused.unwrap_or(false),
            eligibility: self.eligibility,
            tech_stack: self.tech_stack,
            domains: self.domains,
            stipend: self.stipend,
            prizes: self.prizes,
            selection_criteria: self.selection_criteria,
            official_link,
            application_link: self.application_link,
            logo_url: None,
            banner_url: None,
            featured: false,
            verified: true,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Map a batch, silently discarding unusable records.
pub fn ingest_raw_records(records: Vec<RawRecord>, now: DateTime<Utc>) -> Vec<Opportunity> {
    let total = records.len();
    let out = records
        .into_iter()
        .filter_map(|r| r.into_opportunity(now))
        .collect::<Vec<_>>();
    if out.len() < total {
        debug!(total, kept = out.len(), "discarded unmappable external records");
    }
    out
}
