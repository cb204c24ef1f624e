//! Monthly home inference from per-locality post counts.

use hashbrown::HashMap;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::hierarchy::AdministrativeHierarchy;
use crate::models::{
    AdminLevel, MatchLevel, MonthlyHomes, ResolvedPlace, UserHomeAssignment, UserPostCount, YearMonth,
};

/// Aggregates post observations into per-month `UserPostCount`s.
///
/// Only places resolved to a finest-level unit count; posts with coarser or
/// no resolution are dropped.
#[derive(Debug, Default)]
pub struct PostCounter {
    counts: BTreeMap<YearMonth, HashMap<(String, String), u64>>,
    dropped: u64,
}

impl PostCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `count` posts by `user_id` in `month` at a resolved place
    pub fn add(&mut self, user_id: &str, month: YearMonth, place: &ResolvedPlace, count: u64) {
        match &place.locality {
            Some(locality) if place.level == MatchLevel::Finest => {
                self.add_locality(user_id, month, locality, count);
            }
            _ => self.dropped += count,
        }
    }

    /// Record posts already attributed to a finest-level locality
    pub fn add_locality(&mut self, user_id: &str, month: YearMonth, locality: &str, count: u64) {
        *self
            .counts
            .entry(month)
            .or_default()
            .entry((user_id.to_string(), locality.to_string()))
            .or_insert(0) += count;
    }

    /// Posts discarded for lacking a finest-level locality
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn months(&self) -> impl Iterator<Item = YearMonth> + '_ {
        self.counts.keys().copied()
    }

    /// Counts for one month, sorted by user then locality
    pub fn counts(&self, month: YearMonth) -> Vec<UserPostCount> {
        let mut counts: Vec<UserPostCount> = self
            .counts
            .get(&month)
            .map(|m| {
                m.iter()
                    .map(|((user, locality), count)| UserPostCount::new(user, locality, *count))
                    .collect()
            })
            .unwrap_or_default();
        counts.sort_by(|a, b| {
            a.user_id
                .cmp(&b.user_id)
                .then_with(|| a.locality.cmp(&b.locality))
        });
        counts
    }

    /// Every month's counts in calendar order
    pub fn into_monthly(self) -> Vec<(YearMonth, Vec<UserPostCount>)> {
        self.months()
            .collect::<Vec<_>>()
            .into_iter()
            .map(|month| (month, self.counts(month)))
            .collect()
    }
}

/// Assigns each user at most one home per month.
#[derive(Debug, Clone, Copy)]
pub struct UserHomeLocator {
    min_share: f64,
}

impl Default for UserHomeLocator {
    fn default() -> Self {
        Self { min_share: 0.65 }
    }
}

impl UserHomeLocator {
    /// `min_share` is the share the modal locality must exceed when a user
    /// posted from more than one locality.
    pub fn new(min_share: f64) -> Self {
        Self { min_share }
    }

    /// Home of a single user from their `(locality, count)` pairs.
    ///
    /// A single distinct locality is the home regardless of count. With
    /// several, the modal locality needs more than one post in total and a
    /// share strictly above `min_share`. Ties between modal localities
    /// cannot pass that test, so they yield no home.
    pub fn home_of<'a, I>(&self, counts: I) -> Option<String>
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        let mut per_locality: BTreeMap<&str, u64> = BTreeMap::new();
        for (locality, count) in counts {
            if count > 0 {
                *per_locality.entry(locality).or_insert(0) += count;
            }
        }

        if per_locality.len() == 1 {
            return per_locality.keys().next().map(|l| l.to_string());
        }

        let total: u64 = per_locality.values().sum();
        if total <= 1 {
            return None;
        }
        let (modal, modal_count) = per_locality
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))?;

        let share = *modal_count as f64 / total as f64;
        (share > self.min_share).then(|| modal.to_string())
    }

    /// Home assignments for every user present in `counts`, sorted by user id.
    pub fn locate(&self, month: YearMonth, counts: &[UserPostCount]) -> MonthlyHomes {
        let mut by_user: HashMap<&str, Vec<(&str, u64)>> = HashMap::new();
        for c in counts {
            by_user
                .entry(c.user_id.as_str())
                .or_default()
                .push((c.locality.as_str(), c.count));
        }

        let by_user: Vec<(&str, Vec<(&str, u64)>)> = by_user.into_iter().collect();
        let mut assignments: Vec<UserHomeAssignment> = by_user
            .into_par_iter()
            .map(|(user, localities)| UserHomeAssignment {
                user_id: user.to_string(),
                month,
                home: self.home_of(localities),
            })
            .collect();
        assignments.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        let homes = MonthlyHomes { month, assignments };
        info!(
            "{}: {} of {} users assigned a home",
            month,
            homes.assigned(),
            homes.assignments.len()
        );
        homes
    }

    /// `locate` for every month of a counter, in calendar order
    pub fn locate_all(&self, counter: PostCounter) -> Vec<MonthlyHomes> {
        debug!("{} posts dropped without a finest-level locality", counter.dropped());
        counter
            .into_monthly()
            .into_iter()
            .map(|(month, counts)| self.locate(month, &counts))
            .collect()
    }
}

/// Replace every assigned home by its ancestor at `level`.
///
/// Homes without a parent at that level are cleared, so the user drops out
/// of the flows for that month. Returns how many homes were cleared.
pub fn roll_up(
    months: &mut [MonthlyHomes],
    hierarchy: &AdministrativeHierarchy,
    level: AdminLevel,
) -> usize {
    if level.is_finest() {
        return 0;
    }
    let mut cleared = 0;
    for assignment in months.iter_mut().flat_map(|m| m.assignments.iter_mut()) {
        let Some(home) = assignment.home.take() else {
            continue;
        };
        match hierarchy.ancestor(&home, level) {
            Some(parent) => assignment.home = Some(parent.to_string()),
            None => {
                debug!("No {} parent for '{}'", level, home);
                cleared += 1;
            }
        }
    }
    if cleared > 0 {
        warn!("{} homes have no {} parent and were cleared", cleared, level);
    }
    cleared
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResolutionMethod;

    fn month() -> YearMonth {
        YearMonth::new(2021, 3).unwrap()
    }

    #[test]
    fn test_single_locality_is_home_regardless_of_count() {
        let locator = UserHomeLocator::default();
        assert_eq!(locator.home_of([("X", 1)]).as_deref(), Some("X"));
        assert_eq!(locator.home_of([("X", 1), ("X", 2)]).as_deref(), Some("X"));
    }

    #[test]
    fn test_majority_rule() {
        let locator = UserHomeLocator::default();
        assert_eq!(locator.home_of([("X", 6), ("Y", 4)]), None);
        assert_eq!(locator.home_of([("X", 7), ("Y", 3)]).as_deref(), Some("X"));
        assert_eq!(locator.home_of([("X", 5), ("Y", 5)]), None);
        // Exactly at the threshold is not enough
        let strict = UserHomeLocator::new(0.7);
        assert_eq!(strict.home_of([("X", 7), ("Y", 3)]), None);
    }

    #[test]
    fn test_zero_counts_are_ignored() {
        let locator = UserHomeLocator::default();
        assert_eq!(locator.home_of([("X", 3), ("Y", 0)]).as_deref(), Some("X"));
        assert_eq!(locator.home_of(Vec::<(&str, u64)>::new()), None);
    }

    #[test]
    fn test_locate_sorts_by_user() {
        let counts = vec![
            UserPostCount::new("u2", "Dundee City", 7),
            UserPostCount::new("u2", "Bristol, City of", 3),
            UserPostCount::new("u1", "Bristol, City of", 1),
            UserPostCount::new("u3", "Dundee City", 6),
            UserPostCount::new("u3", "Bristol, City of", 4),
        ];
        let homes = UserHomeLocator::default().locate(month(), &counts);

        let users: Vec<&str> = homes.assignments.iter().map(|a| a.user_id.as_str()).collect();
        assert_eq!(users, vec!["u1", "u2", "u3"]);
        assert_eq!(homes.assignments[0].home.as_deref(), Some("Bristol, City of"));
        assert_eq!(homes.assignments[1].home.as_deref(), Some("Dundee City"));
        assert_eq!(homes.assignments[2].home, None);
        assert_eq!(homes.assigned(), 2);
    }

    #[test]
    fn test_counter_keeps_only_finest_level() {
        let mut counter = PostCounter::new();
        let finest = ResolvedPlace {
            place: "Dundee".to_string(),
            locality: Some("Dundee City".to_string()),
            level: MatchLevel::Finest,
            method: ResolutionMethod::Lookup,
        };
        let coarse = ResolvedPlace {
            place: "Scotland".to_string(),
            locality: Some("Scotland".to_string()),
            level: MatchLevel::Coarser,
            method: ResolutionMethod::Lookup,
        };
        counter.add("u1", month(), &finest, 2);
        counter.add("u1", month(), &finest, 1);
        counter.add("u1", month(), &coarse, 5);
        counter.add("u1", month(), &ResolvedPlace::unresolved("Atlantis".to_string()), 1);

        assert_eq!(counter.counts(month()), vec![UserPostCount::new("u1", "Dundee City", 3)]);
        assert_eq!(counter.dropped(), 6);

        let homes = UserHomeLocator::default().locate_all(counter);
        assert_eq!(homes.len(), 1);
        assert_eq!(homes[0].assignments[0].home.as_deref(), Some("Dundee City"));
    }

    #[test]
    fn test_roll_up_to_coarser_level() {
        let hierarchy = crate::hierarchy::tests::sample_hierarchy();
        let assign = |user: &str, home: Option<&str>| UserHomeAssignment {
            user_id: user.to_string(),
            month: month(),
            home: home.map(str::to_string),
        };
        let mut months = vec![MonthlyHomes {
            month: month(),
            assignments: vec![
                assign("u1", Some("Dundee City")),
                assign("u2", Some("Bristol, City of")),
                assign("u3", None),
                assign("u4", Some("Atlantis")),
            ],
        }];

        assert_eq!(roll_up(&mut months, &hierarchy, AdminLevel::Lad), 0);
        assert_eq!(months[0].assignments[3].home.as_deref(), Some("Atlantis"));

        assert_eq!(roll_up(&mut months, &hierarchy, AdminLevel::Itl1), 1);
        let homes: Vec<Option<&str>> = months[0]
            .assignments
            .iter()
            .map(|a| a.home.as_deref())
            .collect();
        assert_eq!(homes, vec![Some("Scotland"), Some("South West"), None, None]);
    }
}
