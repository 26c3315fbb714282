//! Package version numbers and version ranges.
//!
//! ```text
//! 13.0.3            an exact version
//! 4.0.10.0          a legacy four-part version
//! 9.0.0-preview.1   a pre-release
//! [9.0.0, )         at least 9.0.0
//! [1.0, 2.0)        at least 1.0, below 2.0
//! ```
//!
//! Versions are totally ordered: the numeric components are compared first, and a release sorts
//! after every pre-release of the same numeric components. Build metadata (`+sha.abc`) is carried
//! along but ignored for ordering and equality.
pub use {
    preference::Preference,
    range::{RangeParseError, VersionRange},
    version::{Prerelease, PrereleaseSegment, Version, VersionParseError},
};

mod preference;
mod range;
mod version;
