//! Selection of the files a package contributes to an application, for a target framework and
//! runtime identifier.
pub use names::{assembly_name, native_library_name};
pub use runtime::RuntimeAssets;
pub use selector::{AssetSelection, AssetSelector};

mod names;
mod runtime;
mod selector;
