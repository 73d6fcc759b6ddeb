use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{Version, VersionComponent};

/// Tie-break order between the `revision` and `build` components.
///
/// Both orders compare `major` then `minor` first. `Platform` then compares
/// `build` before `revision` and writes versions as
/// `major.minor.build.revision`; `Semantic` compares `revision` first and
/// writes `major.minor.revision.build`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionOrder {
    Platform,
    #[default]
    Semantic,
}

impl VersionOrder {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Semantic => "semantic",
        }
    }

    /// Component held by each textual slot, left to right.
    #[must_use]
    pub const fn text_layout(self) -> [VersionComponent; 4] {
        match self {
            Self::Platform => [
                VersionComponent::Major,
                VersionComponent::Minor,
                VersionComponent::Build,
                VersionComponent::Revision,
            ],
            Self::Semantic => [
                VersionComponent::Major,
                VersionComponent::Minor,
                VersionComponent::Revision,
                VersionComponent::Build,
            ],
        }
    }

    /// Compare two versions. Returns `None` when either side is invalid.
    #[must_use]
    pub fn compare(self, a: &Version, b: &Version) -> Option<Ordering> {
        if !a.is_valid() || !b.is_valid() {
            return None;
        }
        Some(self.sort_key(a).cmp(&self.sort_key(b)))
    }

    /// `true` only when `candidate` is valid and strictly greater than
    /// `current`.
    #[must_use]
    pub fn is_newer(self, candidate: &Version, current: &Version) -> bool {
        self.compare(candidate, current) == Some(Ordering::Greater)
    }

    /// Attach this order to a version so the standard comparison operators
    /// can be used.
    #[must_use]
    pub const fn bind(self, version: Version) -> OrderedVersion {
        OrderedVersion {
            version,
            order: self,
        }
    }

    fn sort_key(self, version: &Version) -> [u16; 4] {
        self.text_layout()
            .map(|component| version.component(component))
    }
}

impl fmt::Display for VersionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown version order {0:?} (expected \"platform\" or \"semantic\")")]
pub struct UnknownVersionOrder(pub String);

impl FromStr for VersionOrder {
    type Err = UnknownVersionOrder;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "platform" | "ms" | "windows" => Ok(Self::Platform),
            "semantic" | "semver" => Ok(Self::Semantic),
            _ => Err(UnknownVersionOrder(s.to_string())),
        }
    }
}

/// A [`Version`] bound to a [`VersionOrder`].
///
/// Versions bound to different orders are unordered relative to each other.
/// Invalid versions are unordered relative to everything, including
/// themselves.
#[derive(Debug, Clone, Copy)]
pub struct OrderedVersion {
    version: Version,
    order: VersionOrder,
}

impl OrderedVersion {
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub const fn order(&self) -> VersionOrder {
        self.order
    }
}

impl PartialEq for OrderedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for OrderedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.order != other.order {
            return None;
        }
        self.order.compare(&self.version, &other.version)
    }
}
