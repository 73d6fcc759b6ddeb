use std::fmt;

use crate::order::VersionOrder;
use crate::types::Version;

/// Number of components rendered by [`VersionDisplay`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Precision {
    One,
    Two,
    Three,
    #[default]
    Four,
}

impl Precision {
    /// Map a numeric level (1 to 4) to a precision.
    #[must_use]
    pub const fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            4 => Some(Self::Four),
            _ => None,
        }
    }

    const fn components(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VersionDisplay {
    version: Version,
    order: VersionOrder,
    precision: Precision,
    labeled: bool,
}

impl VersionDisplay {
    pub(crate) const fn new(version: Version, order: VersionOrder, precision: Precision) -> Self {
        Self {
            version,
            order,
            precision,
            labeled: false,
        }
    }

    /// Render the fourth component as a human label, for example
    /// `1.2.3 Build #4`. Labeled output is not accepted by the parser.
    #[must_use]
    pub const fn with_build_label(mut self) -> Self {
        self.labeled = true;
        self
    }
}

impl fmt::Display for VersionDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.version.is_valid() {
            return f.write_str("<invalid>");
        }

        let layout = self.order.text_layout();
        let count = self.precision.components();
        let labeled = self.labeled && count == 4;
        let dotted = if labeled { 3 } else { count };

        for (index, component) in layout.iter().take(dotted).enumerate() {
            if index > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", self.version.component(*component))?;
        }

        if labeled {
            let last = layout[3];
            write!(f, " {} #{}", last.label(), self.version.component(last))?;
        }
        Ok(())
    }
}
