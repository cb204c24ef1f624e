//! CSV tables read and written by the binaries.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::hierarchy::open_table;
use crate::models::{
    MatchLevel, MigrationFlow, MonthlyHomes, NetMigration, ResolutionMethod, ResolvedPlace,
    YearMonth,
};

/// Any table with a `place` column. Other columns are ignored.
#[derive(Debug, Deserialize)]
struct PlaceRow {
    place: String,
}

/// One row of the resolved-locality table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRow {
    pub place: String,
    #[serde(default)]
    pub locality: Option<String>,
    pub match_level: u8,
    pub method: ResolutionMethod,
}

impl From<&ResolvedPlace> for ResolvedRow {
    fn from(p: &ResolvedPlace) -> Self {
        Self {
            place: p.place.clone(),
            locality: p.locality.clone(),
            match_level: p.level.code(),
            method: p.method,
        }
    }
}

impl From<ResolvedRow> for ResolvedPlace {
    fn from(row: ResolvedRow) -> Self {
        let level = MatchLevel::from_code(row.match_level).unwrap_or(MatchLevel::Unmatched);
        match row.locality.filter(|l| !l.is_empty() && level.is_matched()) {
            Some(locality) => ResolvedPlace {
                place: row.place,
                locality: Some(locality),
                level,
                method: row.method,
            },
            None => ResolvedPlace::unresolved(row.place),
        }
    }
}

/// A batch of posts: `user_id,month,place[,count]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PostRow {
    pub user_id: String,
    pub month: YearMonth,
    pub place: String,
    #[serde(default = "one")]
    pub count: u64,
}

fn one() -> u64 {
    1
}

#[derive(Debug, Serialize)]
struct HomeRow<'a> {
    user_id: &'a str,
    month: YearMonth,
    home: Option<&'a str>,
}

pub fn read_places(path: &Path) -> Result<Vec<String>> {
    let mut reader = open_table(path)?;
    let mut places = Vec::new();
    for row in reader.deserialize::<PlaceRow>() {
        let row = row.with_context(|| format!("Bad row in {}", path.display()))?;
        places.push(row.place);
    }
    Ok(places)
}

pub fn read_resolved(path: &Path) -> Result<Vec<ResolvedPlace>> {
    let mut reader = open_table(path)?;
    let mut resolved = Vec::new();
    for row in reader.deserialize::<ResolvedRow>() {
        let row = row.with_context(|| format!("Bad row in {}", path.display()))?;
        resolved.push(ResolvedPlace::from(row));
    }
    Ok(resolved)
}

pub fn read_posts(path: &Path) -> Result<Vec<PostRow>> {
    let mut reader = open_table(path)?;
    let mut posts = Vec::new();
    for row in reader.deserialize::<PostRow>() {
        let row = row.with_context(|| format!("Bad row in {}", path.display()))?;
        posts.push(row);
    }
    Ok(posts)
}

fn write_rows<T, I>(path: &Path, rows: I) -> Result<()>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// `place,locality,match_level,method`
pub fn write_resolved(path: &Path, resolved: &[ResolvedPlace]) -> Result<()> {
    write_rows(path, resolved.iter().map(ResolvedRow::from))
}

/// `user_id,month,home`, an empty home when none was assigned
pub fn write_homes(path: &Path, months: &[MonthlyHomes]) -> Result<()> {
    write_rows(
        path,
        months.iter().flat_map(|m| {
            m.assignments.iter().map(|a| HomeRow {
                user_id: &a.user_id,
                month: a.month,
                home: a.home.as_deref(),
            })
        }),
    )
}

/// `origin,destination,flow,month_start,month_end`
pub fn write_flows(path: &Path, flows: &[MigrationFlow]) -> Result<()> {
    write_rows(path, flows)
}

/// `locality,inflow,outflow,net`
pub fn write_net(path: &Path, net: &[NetMigration]) -> Result<()> {
    write_rows(path, net)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserHomeAssignment;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_resolved_table_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("resolved.csv");
        let resolved = vec![
            ResolvedPlace {
                place: "Dundee".to_string(),
                locality: Some("Dundee City".to_string()),
                level: MatchLevel::Finest,
                method: ResolutionMethod::Lookup,
            },
            ResolvedPlace::unresolved("Atlantis".to_string()),
        ];
        write_resolved(&path, &resolved).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("place,locality,match_level,method\n"));
        assert!(content.contains("Atlantis,,0,unresolved"));

        assert_eq!(read_resolved(&path).unwrap(), resolved);
    }

    #[test]
    fn test_posts_count_defaults_to_one() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("posts.csv");
        fs::write(
            &path,
            "user_id,month,place\nu1,2021-03,Dundee\nu2,2021-04,\"Bristol, City of\"\n",
        )
        .unwrap();

        let posts = read_posts(&path).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].count, 1);
        assert_eq!(posts[1].place, "Bristol, City of");
        assert_eq!(posts[1].month.to_string(), "2021-04");

        let places = read_places(&path).unwrap();
        assert_eq!(places, vec!["Dundee", "Bristol, City of"]);
    }

    #[test]
    fn test_bad_month_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("posts.csv");
        fs::write(&path, "user_id,month,place,count\nu1,March,Dundee,2\n").unwrap();
        assert!(read_posts(&path).is_err());
    }

    #[test]
    fn test_write_homes_and_flows() {
        let dir = tempdir().unwrap();
        let month: YearMonth = "2021-03".parse().unwrap();
        let homes = vec![MonthlyHomes {
            month,
            assignments: vec![
                UserHomeAssignment {
                    user_id: "u1".to_string(),
                    month,
                    home: Some("Dundee City".to_string()),
                },
                UserHomeAssignment {
                    user_id: "u2".to_string(),
                    month,
                    home: None,
                },
            ],
        }];
        let homes_path = dir.path().join("homes.csv");
        write_homes(&homes_path, &homes).unwrap();
        assert_eq!(
            fs::read_to_string(&homes_path).unwrap(),
            "user_id,month,home\nu1,2021-03,Dundee City\nu2,2021-03,\n"
        );

        let flows = vec![MigrationFlow {
            origin: "Bristol, City of".to_string(),
            destination: "Dundee City".to_string(),
            flow: 1,
            month_start: month,
            month_end: month.succ(),
        }];
        let flows_path = dir.path().join("flows.csv");
        write_flows(&flows_path, &flows).unwrap();
        assert_eq!(
            fs::read_to_string(&flows_path).unwrap(),
            "origin,destination,flow,month_start,month_end\n\"Bristol, City of\",Dundee City,1,2021-03,2021-04\n"
        );
    }
}
