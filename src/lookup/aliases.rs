use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::ReferenceDataError;

/// A data-driven `alias -> target` table.
///
/// Used for manual spelling corrections and for renaming special-cased
/// geocoder outputs. Names are case-sensitive; within one table the last
/// mapping loaded for an alias wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasMap {
    entries: BTreeMap<String, String>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = Self::new();
        for (k, v) in pairs {
            map.insert(k, v);
        }
        map
    }

    pub fn insert(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        let alias = alias.into().trim().to_string();
        let target = target.into().trim().to_string();
        if !alias.is_empty() && !target.is_empty() && alias != target {
            self.entries.insert(alias, target);
        }
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.entries.get(alias).map(String::as_str)
    }

    /// Replace `name` with its mapped target, if it has one
    pub fn rename<'a>(&'a self, name: &'a str) -> &'a str {
        self.get(name).unwrap_or(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load every `*.txt` file under `path` (or `path` itself if it is a file).
    /// Files are read in name order so repeated loads are identical.
    pub fn load(path: &Path) -> Result<Self, ReferenceDataError> {
        let mut map = Self::new();
        if !path.exists() {
            warn!("Alias path not found: {}", path.display());
            return Ok(map);
        }

        info!("Loading aliases from {}", path.display());

        if path.is_file() {
            map.load_file(path)?;
        } else {
            for entry in WalkDir::new(path).follow_links(true).sort_by_file_name() {
                let entry = entry.map_err(|e| ReferenceDataError::Io {
                    path: path.to_path_buf(),
                    source: e.into(),
                })?;
                let file = entry.path();
                if !file.is_file() || file.extension().map_or(true, |e| e != "txt") {
                    continue;
                }
                map.load_file(file)?;
            }
        }

        info!("Loaded {} alias mappings", map.len());
        Ok(map)
    }

    fn load_file(&mut self, path: &Path) -> Result<(), ReferenceDataError> {
        let content = fs::read_to_string(path).map_err(|source| ReferenceDataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse(&content);
        Ok(())
    }

    /// Parse alias lines:
    ///
    /// ```text
    /// # comment
    /// Hull, Kingston => Kingston upon Hull, City of
    /// Canonical Name, variant one, variant two
    /// ```
    pub fn parse(&mut self, content: &str) {
        let comment_regex = Regex::new(r"#.*").unwrap();
        let whitespace_regex = Regex::new(r"\s+").unwrap();

        for line in content.lines() {
            let line = comment_regex.replace(line, "");
            let line = whitespace_regex.replace_all(line.trim(), " ");
            if line.is_empty() {
                continue;
            }

            if let Some((left, right)) = line.split_once("=>") {
                // The whole right side is the target: canonical names may contain commas
                let target = right.trim();
                for src in left.split(',') {
                    self.insert(src, target);
                }
            } else {
                let mut parts = line.split(',');
                if let Some(canon) = parts.next() {
                    let canon = canon.trim().to_string();
                    for variant in parts {
                        self.insert(variant, canon.as_str());
                    }
                }
            }
        }
    }
}
