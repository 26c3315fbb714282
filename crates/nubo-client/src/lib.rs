pub use client::{ArchiveReader, DEFAULT_RETRIES, FeedClient, FeedClientBuilder};
pub use error::{Error, ErrorKind, WrappedReqwestError};
pub use feed::{Credentials, DEFAULT_FEED_NAME, DEFAULT_FEED_URL, Feed, FeedUrl, FeedUrlError};
pub use source_mapping::{EligibleFeeds, PackagePattern, SourceMapping, eligible_feeds};

mod client;
mod error;
mod feed;
mod source_mapping;
