use std::collections::HashMap;

use log::debug;
use restage_version::{Version, VersionOrder};

/// Latest published version per executable name.
///
/// Parsed from `name<TAB>version` lines. Malformed lines are skipped, and a
/// name listed more than once keeps its last version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: HashMap<String, Version>,
}

impl Manifest {
    #[must_use]
    pub fn parse(bytes: &[u8], order: VersionOrder) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let mut entries = HashMap::new();

        for (index, line) in text.split('\n').enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            let [name, version] = fields.as_slice() else {
                debug!(
                    "Skipping manifest line {}: expected 2 fields, found {}",
                    index + 1,
                    fields.len()
                );
                continue;
            };
            if name.is_empty() {
                debug!("Skipping manifest line {}: empty name", index + 1);
                continue;
            }

            match Version::parse(version, order) {
                Ok(version) => {
                    entries.insert((*name).to_string(), version);
                }
                Err(error) => {
                    debug!("Skipping manifest entry for {name}: {error}");
                }
            }
        }

        Self { entries }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Version> {
        self.entries.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Version)> {
        self.entries
            .iter()
            .map(|(name, version)| (name.as_str(), *version))
    }
}
