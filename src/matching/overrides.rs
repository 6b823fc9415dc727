//! Static override data: forced title mappings, a skip list, and
//! year-disambiguated mappings.
//!
//! The table is loaded once and shared read-only; nothing mutates it at runtime.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use log::debug;
use serde::Deserialize;

use crate::error::OverrideError;
use crate::matching::normalize::{normalize, NormalizationLevel};

const BUILTIN_OVERRIDES: &str = include_str!("../../data/overrides.toml");

/// What the table says about one standard-normalized name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideEntry<'a> {
    Manual(&'a str),
    Skip(&'a str),
    YearTable(&'a BTreeMap<u16, String>),
}

#[derive(Debug, Default, Deserialize)]
struct OverrideFile {
    #[serde(default)]
    manual: BTreeMap<String, String>,
    #[serde(default)]
    skip: BTreeMap<String, String>,
    #[serde(default)]
    year: BTreeMap<String, BTreeMap<String, String>>,
}

/// Immutable override lookup keyed by standard-normalized title.
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    manual: HashMap<String, String>,
    skip: HashMap<String, String>,
    years: HashMap<String, BTreeMap<u16, String>>,
}

fn key(value: &str) -> String {
    normalize(value, NormalizationLevel::Standard)
}

impl OverrideTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The table shipped with the crate.
    pub fn builtin() -> Result<Self, OverrideError> {
        Self::from_toml_str(BUILTIN_OVERRIDES)
    }

    /// The shipped table with a user file layered on top, when one is configured.
    pub fn load(user_path: Option<&Path>) -> Result<Self, OverrideError> {
        let mut table = Self::builtin()?;
        if let Some(path) = user_path {
            let text = std::fs::read_to_string(path)?;
            let user = Self::from_toml_str(&text)?;
            debug!(
                "Loaded {} user overrides from {}",
                user.len(),
                path.display()
            );
            table.merge(user);
        }
        Ok(table)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, OverrideError> {
        let file: OverrideFile = toml::from_str(text)?;
        let mut table = Self::default();
        for (from, to) in file.manual {
            table.manual.insert(key(&from), key(&to));
        }
        for (name, reason) in file.skip {
            table.skip.insert(key(&name), reason);
        }
        for (name, by_year) in file.year {
            let mut targets = BTreeMap::new();
            for (year, target) in by_year {
                let parsed: u16 = year.trim().parse().map_err(|_| OverrideError::InvalidYear {
                    name: name.clone(),
                    year: year.clone(),
                })?;
                targets.insert(parsed, key(&target));
            }
            table.years.insert(key(&name), targets);
        }
        Ok(table)
    }

    /// Layers `other` over `self`; entries in `other` win.
    pub fn merge(&mut self, other: OverrideTable) {
        self.manual.extend(other.manual);
        self.skip.extend(other.skip);
        for (name, targets) in other.years {
            self.years.entry(name).or_default().extend(targets);
        }
    }

    pub fn len(&self) -> usize {
        self.manual.len() + self.skip.len() + self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Strongest entry for an already standard-normalized name: skip, then
    /// manual, then year table.
    pub fn lookup(&self, standard_name: &str) -> Option<OverrideEntry<'_>> {
        if let Some(reason) = self.skip.get(standard_name) {
            return Some(OverrideEntry::Skip(reason));
        }
        if let Some(target) = self.manual.get(standard_name) {
            return Some(OverrideEntry::Manual(target));
        }
        self.years.get(standard_name).map(OverrideEntry::YearTable)
    }

    pub fn skip_reason(&self, standard_name: &str) -> Option<&str> {
        self.skip.get(standard_name).map(String::as_str)
    }

    pub fn manual_target(&self, standard_name: &str) -> Option<&str> {
        self.manual.get(standard_name).map(String::as_str)
    }

    pub fn year_target(&self, standard_base: &str, year: u16) -> Option<&str> {
        self.years
            .get(standard_base)
            .and_then(|targets| targets.get(&year))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_parses_and_normalizes_keys() {
        let table = OverrideTable::builtin().expect("builtin overrides should parse");
        assert!(!table.is_empty());
        assert_eq!(
            table.manual_target("tom clancy s rainbow six siege"),
            Some("rainbow six siege")
        );
        assert_eq!(
            table.skip_reason("team fortress 2"),
            Some("multiplayer-only title")
        );
        assert_eq!(table.year_target("doom", 2016), Some("doom 2016"));
        assert_eq!(table.year_target("doom", 2004), None);
    }

    #[test]
    fn test_lookup_prefers_skip_over_manual() {
        let table = OverrideTable::from_toml_str(
            r#"
            [manual]
            "Foo" = "Bar"
            [skip]
            "Foo" = "never"
            "#,
        )
        .expect("table should parse");
        assert_eq!(table.lookup("foo"), Some(OverrideEntry::Skip("never")));
        assert_eq!(table.lookup("baz"), None);
    }

    #[test]
    fn test_invalid_year_is_rejected() {
        let error = OverrideTable::from_toml_str(
            r#"
            [year."Doom"]
            "nineteen" = "Doom"
            "#,
        )
        .expect_err("non-numeric year should fail");
        assert!(matches!(error, OverrideError::InvalidYear { .. }));
    }

    #[test]
    fn test_merge_lets_user_entries_win() {
        let mut table = OverrideTable::builtin().expect("builtin overrides should parse");
        let user = OverrideTable::from_toml_str(
            r#"
            [manual]
            "Tom Clancy's Rainbow Six Siege" = "Rainbow Six: Siege X"
            [year."Doom"]
            2020 = "Doom Eternal"
            "#,
        )
        .expect("user table should parse");
        table.merge(user);
        assert_eq!(
            table.manual_target("tom clancy s rainbow six siege"),
            Some("rainbow six siege x")
        );
        assert_eq!(table.year_target("doom", 2020), Some("doom eternal"));
        assert_eq!(table.year_target("doom", 1993), Some("doom 1993"));
    }
}
