use std::fmt;

use crate::display::{Precision, VersionDisplay};
use crate::order::VersionOrder;

/// A four-component executable version.
///
/// Components are stored by role. Which textual slot holds `revision` and
/// which holds `build` depends on the [`VersionOrder`] used to parse or format
/// the value, so every conversion to or from text takes an order.
///
/// The default value is invalid. Invalid versions never compare as greater
/// than anything (see [`VersionOrder::compare`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Version {
    major: u16,
    minor: u16,
    revision: u16,
    build: u16,
    valid: bool,
}

impl Version {
    #[must_use]
    pub const fn new(major: u16, minor: u16, revision: u16, build: u16) -> Self {
        Self {
            major,
            minor,
            revision,
            build,
            valid: true,
        }
    }

    #[must_use]
    pub const fn invalid() -> Self {
        Self {
            major: 0,
            minor: 0,
            revision: 0,
            build: 0,
            valid: false,
        }
    }

    /// Build a version from the packed two-word encoding used by executable
    /// version resources (`major << 16 | minor`, then the remaining pair).
    #[must_use]
    pub fn from_packed(most_significant: u32, least_significant: u32, order: VersionOrder) -> Self {
        let high = hiword(least_significant);
        let low = loword(least_significant);
        let (revision, build) = match order {
            VersionOrder::Platform => (low, high),
            VersionOrder::Semantic => (high, low),
        };
        Self::new(
            hiword(most_significant),
            loword(most_significant),
            revision,
            build,
        )
    }

    /// Inverse of [`Version::from_packed`].
    #[must_use]
    pub fn to_packed(&self, order: VersionOrder) -> (u32, u32) {
        let (high, low) = match order {
            VersionOrder::Platform => (self.build, self.revision),
            VersionOrder::Semantic => (self.revision, self.build),
        };
        (pack(self.major, self.minor), pack(high, low))
    }

    /// Parse a dotted version string of three or four numeric components.
    ///
    /// A three-component string leaves the fourth textual slot at zero.
    ///
    /// # Errors
    /// Returns an error when the component count is not 3 or 4, or when a
    /// component is empty, non-numeric or outside the 16-bit range.
    pub fn parse(input: &str, order: VersionOrder) -> Result<Self, VersionParseError> {
        let input = input.trim();
        let parts: Vec<&str> = input.split('.').collect();
        if !(3..=4).contains(&parts.len()) {
            return Err(VersionParseError::InvalidFormat {
                input: input.to_string(),
                components: parts.len(),
            });
        }

        let mut version = Self::new(0, 0, 0, 0);
        for (part, component) in parts.into_iter().zip(order.text_layout()) {
            let value = parse_component(part, component)?;
            version.set(component, value);
        }
        Ok(version)
    }

    /// Parse like [`Version::parse`], returning an invalid version instead of
    /// an error. Callers must check [`Version::is_valid`] before use.
    #[must_use]
    pub fn parse_lenient(input: &str, order: VersionOrder) -> Self {
        Self::parse(input, order).unwrap_or_default()
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    #[must_use]
    pub const fn major(&self) -> u16 {
        self.major
    }

    #[must_use]
    pub const fn minor(&self) -> u16 {
        self.minor
    }

    #[must_use]
    pub const fn revision(&self) -> u16 {
        self.revision
    }

    #[must_use]
    pub const fn build(&self) -> u16 {
        self.build
    }

    #[must_use]
    pub const fn component(&self, component: VersionComponent) -> u16 {
        match component {
            VersionComponent::Major => self.major,
            VersionComponent::Minor => self.minor,
            VersionComponent::Revision => self.revision,
            VersionComponent::Build => self.build,
        }
    }

    /// Render this version with the textual layout of `order`.
    #[must_use]
    pub fn display(&self, order: VersionOrder, precision: Precision) -> VersionDisplay {
        VersionDisplay::new(*self, order, precision)
    }

    fn set(&mut self, component: VersionComponent, value: u16) {
        match component {
            VersionComponent::Major => self.major = value,
            VersionComponent::Minor => self.minor = value,
            VersionComponent::Revision => self.revision = value,
            VersionComponent::Build => self.build = value,
        }
    }
}

fn parse_component(part: &str, component: VersionComponent) -> Result<u16, VersionParseError> {
    let invalid = || VersionParseError::InvalidComponent {
        component,
        value: part.to_string(),
    };

    if part.is_empty() || !part.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(invalid());
    }
    part.parse().map_err(|_| invalid())
}

#[allow(clippy::cast_possible_truncation)]
const fn hiword(value: u32) -> u16 {
    (value >> 16) as u16
}

#[allow(clippy::cast_possible_truncation)]
const fn loword(value: u32) -> u16 {
    (value & 0xFFFF) as u16
}

fn pack(high: u16, low: u16) -> u32 {
    (u32::from(high) << 16) | u32::from(low)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionComponent {
    Major,
    Minor,
    Revision,
    Build,
}

impl VersionComponent {
    /// Capitalized name used in labeled version strings.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Major => "Major",
            Self::Minor => "Minor",
            Self::Revision => "Revision",
            Self::Build => "Build",
        }
    }
}

impl fmt::Display for VersionComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Major => write!(f, "major"),
            Self::Minor => write!(f, "minor"),
            Self::Revision => write!(f, "revision"),
            Self::Build => write!(f, "build"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("expected 3 or 4 dot-separated components, got {components} in: {input}")]
    InvalidFormat { input: String, components: usize },
    #[error("invalid {component} component: {value:?}")]
    InvalidComponent {
        component: VersionComponent,
        value: String,
    },
}
