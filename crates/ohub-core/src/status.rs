//! Temporal status derivation. Every function takes `now` explicitly.

use chrono::{DateTime, Utc};

use crate::model::{Opportunity, Status};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Deadlines this many days away or closer flag an ongoing entry as urgent.
pub const URGENT_WITHIN_DAYS: i64 = 7;

/// Classify the application window relative to `now`. Both window boundaries
/// count as ongoing.
pub fn resolve_status(opportunity: &Opportunity, now: DateTime<Utc>) -> Status {
    if now > opportunity.application_end {
        Status::Past
    } else if now < opportunity.application_start {
        Status::Upcoming
    } else {
        Status::Ongoing
    }
}

/// Whole days until `deadline`, rounded up. Negative once the deadline has passed.
pub fn days_until_deadline(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let diff = deadline.signed_duration_since(now).num_milliseconds();
    let whole = diff.div_euclid(MILLIS_PER_DAY);
    if diff.rem_euclid(MILLIS_PER_DAY) == 0 {
        whole
    } else {
        whole + 1
    }
}

pub fn is_urgent(opportunity: &Opportunity, now: DateTime<Utc>) -> bool {
    if resolve_status(opportunity, now) != Status::Ongoing {
        return false;
    }
    let days = days_until_deadline(opportunity.application_end, now);
    days > 0 && days <= URGENT_WITHIN_DAYS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{at, day, opportunity};
    use chrono::Duration;

    #[test]
    fn mid_window_is_ongoing_with_five_days_left() {
        let mut o = opportunity("a");
        o.application_start = day(2025, 5, 1);
        o.application_end = day(2025, 5, 20);
        let now = day(2025, 5, 15);

        assert_eq!(resolve_status(&o, now), Status::Ongoing);
        assert_eq!(days_until_deadline(o.application_end, now), 5);
        assert!(is_urgent(&o, now));
    }

    #[test]
    fn boundaries_resolve_to_ongoing() {
        let mut o = opportunity("a");
        o.application_start = day(2025, 3, 1);
        o.application_end = day(2025, 3, 31);

        assert_eq!(resolve_status(&o, o.application_start), Status::Ongoing);
        assert_eq!(resolve_status(&o, o.application_end), Status::Ongoing);
        assert_eq!(
            resolve_status(&o, o.application_start - Duration::milliseconds(1)),
            Status::Upcoming
        );
        assert_eq!(
            resolve_status(&o, o.application_end + Duration::milliseconds(1)),
            Status::Past
        );
    }

    #[test]
    fn zero_length_window_is_ongoing_at_its_instant() {
        let mut o = opportunity("a");
        o.application_start = day(2025, 7, 4);
        o.application_end = day(2025, 7, 4);
        assert_eq!(resolve_status(&o, day(2025, 7, 4)), Status::Ongoing);
    }

    #[test]
    fn exactly_one_status_holds_across_a_sweep() {
        let mut o = opportunity("a");
        o.application_start = day(2025, 1, 10);
        o.application_end = day(2025, 1, 20);
        let mut now = day(2025, 1, 1);
        let mut seen = Vec::new();
        while now <= day(2025, 1, 31) {
            let status = resolve_status(&o, now);
            if seen.last() != Some(&status) {
                seen.push(status);
            }
            now += Duration::hours(6);
        }
        assert_eq!(seen, vec![Status::Upcoming, Status::Ongoing, Status::Past]);
    }

    #[test]
    fn days_until_deadline_rounds_up_and_goes_negative() {
        let deadline = day(2025, 5, 20);
        assert_eq!(days_until_deadline(deadline, at(2025, 5, 19, 23)), 1);
        assert_eq!(days_until_deadline(deadline, deadline), 0);
        assert_eq!(days_until_deadline(deadline, at(2025, 5, 20, 12)), 0);
        assert_eq!(days_until_deadline(deadline, day(2025, 5, 22)), -2);
        assert_eq!(days_until_deadline(deadline, at(2025, 5, 21, 12)), -1);
    }

    #[test]
    fn urgency_needs_an_ongoing_window_and_a_near_deadline() {
        let mut o = opportunity("a");
        o.application_start = day(2025, 5, 1);
        o.application_end = day(2025, 5, 20);

        assert!(!is_urgent(&o, day(2025, 5, 2)));
        assert!(is_urgent(&o, day(2025, 5, 13)));
        assert!(!is_urgent(&o, day(2025, 5, 20)));
        assert!(!is_urgent(&o, day(2025, 5, 25)));

        o.application_start = day(2025, 5, 18);
        assert!(!is_urgent(&o, day(2025, 5, 15)));
    }
}
