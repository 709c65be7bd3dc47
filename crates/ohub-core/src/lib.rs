//! Core domain model plus the status, filter and sort engines for Opportunity Hub.
//!
//! Everything here is synchronous and pure; the current time is always an argument.

pub mod browse;
pub mod criteria;
pub mod filter;
pub mod model;
pub mod sort;
pub mod status;

pub use browse::{featured_opportunities, opportunities_on_date, search_suggestions};
pub use criteria::{FilterCriteria, FilterMember, StatusFilter};
pub use filter::{filter_opportunities, matches};
pub use model::{Category, Level, Mode, Opportunity, ParseError, Status, Tone, DOMAINS};
pub use sort::{sort_opportunities, SortKey};
pub use status::{days_until_deadline, is_urgent, resolve_status, URGENT_WITHIN_DAYS};

pub const CRATE_NAME: &str = "ohub-core";
