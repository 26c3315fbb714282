//! Fetching resolved packages into the cache and selecting their assets.
pub use error::{DownloadError, Error};
pub use fetcher::{Fetcher, Reporter};
pub use materialize::{MaterializedAssets, PackageAssets, materialize_assets, select};

mod error;
mod fetcher;
mod locks;
mod materialize;
