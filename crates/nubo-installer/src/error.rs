use std::io;

use nubo_package_types::{NuspecError, PackageIdentity};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to download `{identity}` from `{feed}`")]
    DownloadFailed {
        identity: PackageIdentity,
        feed: String,
        #[source]
        err: DownloadError,
    },

    #[error("`{identity}` was resolved from `{feed}`, but no feed with that name is configured")]
    UnknownFeed {
        identity: PackageIdentity,
        feed: String,
    },

    #[error("Failed to access the cache entry for `{identity}`")]
    Cache {
        identity: PackageIdentity,
        #[source]
        err: io::Error,
    },

    #[error("Failed to read the package manifest of `{identity}`")]
    Nuspec {
        identity: PackageIdentity,
        #[source]
        err: NuspecError,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

/// Why an archive couldn't be fetched into the cache.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    Client(#[from] nubo_client::Error),

    #[error("Failed to write the archive to disk")]
    Io(#[from] io::Error),

    #[error("Failed to extract the archive")]
    Extract(#[from] nubo_extract::Error),

    #[error("Hash mismatch: expected `{expected}`, but the archive hashes to `{actual}`")]
    HashMismatch { expected: String, actual: String },
}
