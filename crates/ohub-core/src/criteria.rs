//! Filter state: the explicit value describing what the visitor has selected.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{Category, Level, Mode, ParseError, Status};

/// Status tab. `All` imposes no constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Upcoming,
    Ongoing,
    Past,
}

impl StatusFilter {
    pub fn status(self) -> Option<Status> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Upcoming => Some(Status::Upcoming),
            StatusFilter::Ongoing => Some(Status::Ongoing),
            StatusFilter::Past => Some(Status::Past),
        }
    }
}

impl From<Status> for StatusFilter {
    fn from(value: Status) -> Self {
        match value {
            Status::Upcoming => StatusFilter::Upcoming,
            Status::Ongoing => StatusFilter::Ongoing,
            Status::Past => StatusFilter::Past,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(StatusFilter::All);
        }
        s.parse::<Status>().map(StatusFilter::from)
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status() {
            Some(status) => f.write_str(status.as_str()),
            None => f.write_str("all"),
        }
    }
}

/// One member of a multi-valued axis, used by [`FilterCriteria::toggle_member`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterMember {
    Category(Category),
    Mode(Mode),
    Level(Level),
    Domain(String),
}

/// Currently selected search text, structured filters and status tab.
///
/// An absent or empty axis never constrains the result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<BTreeSet<Category>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<BTreeSet<Mode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<BTreeSet<Level>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domains: Option<BTreeSet<String>>,
    pub india_only: bool,
    pub has_stipend: bool,
    pub status_filter: StatusFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
}

fn collapse<T>(set: Option<BTreeSet<T>>) -> Option<BTreeSet<T>> {
    set.filter(|s| !s.is_empty())
}

fn toggle<T: Ord>(set: Option<BTreeSet<T>>, value: T) -> Option<BTreeSet<T>> {
    let mut set = set.unwrap_or_default();
    if !set.remove(&value) {
        set.insert(value);
    }
    collapse(Some(set))
}

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace empty sets and empty search text with absent values.
    pub fn normalize(self) -> Self {
        Self {
            category: collapse(self.category),
            mode: collapse(self.mode),
            level: collapse(self.level),
            domains: collapse(self.domains),
            search_query: self.search_query.filter(|q| !q.is_empty()),
            ..self
        }
    }

    /// Add `member` to its axis if absent, remove it if present.
    pub fn toggle_member(self, member: FilterMember) -> Self {
        let mut next = self;
        match member {
            FilterMember::Category(c) => next.category = toggle(next.category, c),
            FilterMember::Mode(m) => next.mode = toggle(next.mode, m),
            FilterMember::Level(l) => next.level = toggle(next.level, l),
            FilterMember::Domain(d) => next.domains = toggle(next.domains, d),
        }
        next
    }

    pub fn toggle_india_only(self) -> Self {
        Self {
            india_only: !self.india_only,
            ..self
        }
    }

    pub fn toggle_has_stipend(self) -> Self {
        Self {
            has_stipend: !self.has_stipend,
            ..self
        }
    }

    pub fn with_status(self, status_filter: StatusFilter) -> Self {
        Self {
            status_filter,
            ..self
        }
    }

    pub fn with_search(self, query: impl Into<String>) -> Self {
        Self {
            search_query: Some(query.into()),
            ..self
        }
        .normalize()
    }

    /// Structured filter selections, excluding the status tab and search text.
    pub fn active_filter_count(&self) -> usize {
        let len = |n: Option<usize>| n.unwrap_or(0);
        len(self.category.as_ref().map(BTreeSet::len))
            + len(self.mode.as_ref().map(BTreeSet::len))
            + len(self.level.as_ref().map(BTreeSet::len))
            + len(self.domains.as_ref().map(BTreeSet::len))
            + usize::from(self.india_only)
            + usize::from(self.has_stipend)
    }

    /// True when no axis constrains the catalog.
    pub fn is_unconstrained(&self) -> bool {
        let normalized = self.clone().normalize();
        normalized.active_filter_count() == 0
            && normalized.status_filter == StatusFilter::All
            && normalized.search_query.is_none()
    }
}
