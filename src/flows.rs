//! Origin to destination flows between monthly home assignments.

use hashbrown::HashMap;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::error::MobilityError;
use crate::models::{MigrationFlow, MonthlyHomes, NetMigration};

pub struct MigrationFlowComputer;

impl MigrationFlowComputer {
    /// Flows from month `start` to month `end`.
    ///
    /// Only users with a home in both months take part, and a user adds one
    /// to the flow of their (old, new) pair only if the homes differ. The
    /// result is sorted by origin then destination.
    pub fn compute(start: &MonthlyHomes, end: &MonthlyHomes) -> Result<Vec<MigrationFlow>, MobilityError> {
        if start.month == end.month {
            return Err(MobilityError::SameMonth(start.month.to_string()));
        }

        let later: HashMap<&str, &str> = end
            .assignments
            .iter()
            .filter_map(|a| a.home.as_deref().map(|h| (a.user_id.as_str(), h)))
            .collect();

        let mut counts: BTreeMap<(&str, &str), u64> = BTreeMap::new();
        let mut movers = 0u64;
        for assignment in &start.assignments {
            let Some(origin) = assignment.home.as_deref() else {
                continue;
            };
            let Some(destination) = later.get(assignment.user_id.as_str()) else {
                continue;
            };
            if origin != *destination {
                *counts.entry((origin, *destination)).or_insert(0) += 1;
                movers += 1;
            }
        }

        info!(
            "{} -> {}: {} users moved across {} origin/destination pairs",
            start.month,
            end.month,
            movers,
            counts.len()
        );

        Ok(counts
            .into_iter()
            .map(|((origin, destination), flow)| MigrationFlow {
                origin: origin.to_string(),
                destination: destination.to_string(),
                flow,
                month_start: start.month,
                month_end: end.month,
            })
            .collect())
    }

    /// Flows for every consecutive pair of months, in calendar order.
    ///
    /// A month missing from the input is skipped over: the pair either side
    /// of it is compared directly.
    pub fn series(months: &[MonthlyHomes]) -> Result<Vec<MigrationFlow>, MobilityError> {
        let mut sorted: Vec<&MonthlyHomes> = months.iter().collect();
        sorted.sort_by_key(|m| m.month);

        let mut flows = Vec::new();
        for pair in sorted.windows(2) {
            if pair[1].month != pair[0].month.succ() {
                warn!(
                    "No homes between {} and {}; flows span the gap",
                    pair[0].month, pair[1].month
                );
            }
            flows.extend(Self::compute(pair[0], pair[1])?);
        }
        Ok(flows)
    }
}

/// Inflow, outflow and net change per locality, sorted by locality.
pub fn net_migration(flows: &[MigrationFlow]) -> Vec<NetMigration> {
    let mut totals: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for flow in flows {
        totals.entry(flow.destination.as_str()).or_insert((0, 0)).0 += flow.flow;
        totals.entry(flow.origin.as_str()).or_insert((0, 0)).1 += flow.flow;
    }
    totals
        .into_iter()
        .map(|(locality, (inflow, outflow))| NetMigration {
            locality: locality.to_string(),
            inflow,
            outflow,
            net: inflow as i64 - outflow as i64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{UserHomeAssignment, YearMonth};

    fn homes(month: &str, rows: &[(&str, Option<&str>)]) -> MonthlyHomes {
        let month: YearMonth = month.parse().unwrap();
        MonthlyHomes {
            month,
            assignments: rows
                .iter()
                .map(|(user, home)| UserHomeAssignment {
                    user_id: user.to_string(),
                    month,
                    home: home.map(str::to_string),
                })
                .collect(),
        }
    }

    #[test]
    fn test_single_mover() {
        let march = homes("2021-03", &[("u1", Some("Bristol, City of"))]);
        let april = homes("2021-04", &[("u1", Some("Dundee City"))]);

        let flows = MigrationFlowComputer::compute(&march, &april).unwrap();
        assert_eq!(
            flows,
            vec![MigrationFlow {
                origin: "Bristol, City of".to_string(),
                destination: "Dundee City".to_string(),
                flow: 1,
                month_start: march.month,
                month_end: april.month,
            }]
        );
    }

    #[test]
    fn test_stayers_and_missing_homes_are_excluded() {
        let march = homes(
            "2021-03",
            &[
                ("stayer", Some("Dundee City")),
                ("gone", Some("Dundee City")),
                ("new", None),
                ("mover", Some("Dundee City")),
                ("mover2", Some("Dundee City")),
            ],
        );
        let april = homes(
            "2021-04",
            &[
                ("stayer", Some("Dundee City")),
                ("gone", None),
                ("new", Some("Bristol, City of")),
                ("mover", Some("Bristol, City of")),
                ("mover2", Some("Bristol, City of")),
                ("arrival", Some("Bristol, City of")),
            ],
        );

        let flows = MigrationFlowComputer::compute(&march, &april).unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].origin, "Dundee City");
        assert_eq!(flows[0].flow, 2);
    }

    #[test]
    fn test_same_month_is_rejected() {
        let march = homes("2021-03", &[]);
        assert_eq!(
            MigrationFlowComputer::compute(&march, &march),
            Err(MobilityError::SameMonth("2021-03".to_string()))
        );
    }

    #[test]
    fn test_series_and_net() {
        let months = vec![
            homes("2021-05", &[("u1", Some("C")), ("u2", Some("A"))]),
            homes("2021-03", &[("u1", Some("A")), ("u2", Some("A"))]),
            homes("2021-04", &[("u1", Some("B")), ("u2", Some("A"))]),
        ];
        let flows = MigrationFlowComputer::series(&months).unwrap();
        let pairs: Vec<(&str, &str, String)> = flows
            .iter()
            .map(|f| (f.origin.as_str(), f.destination.as_str(), f.month_start.to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![("A", "B", "2021-03".to_string()), ("B", "C", "2021-04".to_string())]
        );

        let net = net_migration(&flows);
        let a = net.iter().find(|n| n.locality == "A").unwrap();
        assert_eq!((a.inflow, a.outflow, a.net), (0, 1, -1));
        let b = net.iter().find(|n| n.locality == "B").unwrap();
        assert_eq!(b.net, 0);
        let c = net.iter().find(|n| n.locality == "C").unwrap();
        assert_eq!(c.net, 1);
    }

    #[test]
    fn test_series_spans_missing_months() {
        let months = vec![
            homes("2020-12", &[("u1", Some("A"))]),
            homes("2021-02", &[("u1", Some("B"))]),
        ];
        let flows = MigrationFlowComputer::series(&months).unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].month_start.to_string(), "2020-12");
        assert_eq!(flows[0].month_end.to_string(), "2021-02");
    }
}
