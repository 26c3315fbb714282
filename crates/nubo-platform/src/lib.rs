//! Target frameworks and runtime identifiers, and the compatibility rules between them.
pub use compatibility::FrameworkCompatibility;
pub use framework::{FrameworkFamily, FrameworkParseError, FrameworkVersion, TargetFramework};
pub use rid::{Rid, RidParseError, RuntimeGraph, RuntimeGraphError};

mod compatibility;
mod framework;
mod rid;
