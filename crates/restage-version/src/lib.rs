//! Four-component executable versions with two selectable orderings.
//!
//! The ordering is never global state: every comparison, parse and format
//! call takes a [`VersionOrder`].

mod display;
mod order;
mod types;

pub use display::{Precision, VersionDisplay};
pub use order::{OrderedVersion, UnknownVersionOrder, VersionOrder};
pub use types::{Version, VersionComponent, VersionParseError};
