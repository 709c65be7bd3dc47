//! Sort engine. Every ordering is stable: ties keep their input order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{Opportunity, ParseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Soonest application deadline first.
    #[default]
    Deadline,
    /// Newest `created_at` first.
    Recent,
    /// Featured entries first; no secondary key.
    Featured,
}

impl SortKey {
    pub const ALL: [SortKey; 3] = [SortKey::Deadline, SortKey::Recent, SortKey::Featured];

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Deadline => "deadline",
            SortKey::Recent => "recent",
            SortKey::Featured => "featured",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortKey::Deadline => "Deadline (soonest)",
            SortKey::Recent => "Recently added",
            SortKey::Featured => "Featured first",
        }
    }
}

impl FromStr for SortKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParseError::SortKey(s.to_string()))
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn sort_opportunities(mut list: Vec<Opportunity>, key: SortKey) -> Vec<Opportunity> {
    match key {
        SortKey::Deadline => list.sort_by(|a, b| a.application_end.cmp(&b.application_end)),
        SortKey::Recent => list.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortKey::Featured => list.sort_by_key(|o| !o.featured),
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{FilterCriteria, FilterMember};
    use crate::filter::filter_opportunities;
    use crate::model::Category;
    use crate::testing::{day, opportunity};

    fn ids(list: &[Opportunity]) -> Vec<&str> {
        list.iter().map(|o| o.id.as_str()).collect()
    }

    #[test]
    fn deadline_sort_is_ascending_and_stable() {
        let mut a = opportunity("a");
        a.application_end = day(2025, 6, 1);
        let mut b = opportunity("b");
        b.application_end = day(2025, 5, 1);
        let mut c = opportunity("c");
        c.application_end = day(2025, 6, 1);
        let mut d = opportunity("d");
        d.application_end = day(2025, 5, 1);

        let out = sort_opportunities(vec![a, b, c, d], SortKey::Deadline);
        assert_eq!(ids(&out), vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn recent_sort_is_newest_first() {
        let mut a = opportunity("a");
        a.created_at = day(2025, 1, 1);
        let mut b = opportunity("b");
        b.created_at = day(2025, 3, 1);
        let mut c = opportunity("c");
        c.created_at = day(2025, 2, 1);

        let out = sort_opportunities(vec![a, b, c], SortKey::Recent);
        assert_eq!(ids(&out), vec!["b", "c", "a"]);
    }

    #[test]
    fn featured_sort_is_a_stable_partition() {
        let flags = [false, true, false, true, true, false];
        let list = flags
            .iter()
            .enumerate()
            .map(|(i, featured)| {
                let mut o = opportunity(&i.to_string());
                o.featured = *featured;
                // later entries have earlier deadlines; featured must ignore them
                o.application_end = day(2025, 12, 28 - i as u32);
                o
            })
            .collect::<Vec<_>>();

        let out = sort_opportunities(list, SortKey::Featured);
        assert_eq!(ids(&out), vec!["1", "3", "4", "0", "2", "5"]);
    }

    #[test]
    fn filter_then_sort_scenario() {
        let mut a = opportunity("A");
        a.category = Category::Hackathon;
        a.application_end = day(2025, 6, 1);
        let mut b = opportunity("B");
        b.category = Category::Internship;
        b.application_end = day(2025, 5, 1);
        let catalog = vec![a, b];
        let now = day(2025, 4, 1);

        let hackathons = FilterCriteria::new().toggle_member(FilterMember::Category(Category::Hackathon));
        let out = sort_opportunities(filter_opportunities(&catalog, &hackathons, now), SortKey::Deadline);
        assert_eq!(ids(&out), vec!["A"]);

        let both = hackathons.toggle_member(FilterMember::Category(Category::Internship));
        let out = sort_opportunities(filter_opportunities(&catalog, &both, now), SortKey::Deadline);
        assert_eq!(ids(&out), vec!["B", "A"]);
    }

    #[test]
    fn sort_key_parses_and_defaults_to_deadline() {
        assert_eq!("Featured".parse::<SortKey>(), Ok(SortKey::Featured));
        assert!("relevance".parse::<SortKey>().is_err());
        assert_eq!(SortKey::default(), SortKey::Deadline);
    }
}
