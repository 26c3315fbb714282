pub use identity::*;
pub use nuspec::*;
pub use service_index::*;

mod identity;
mod nuspec;
mod service_index;
