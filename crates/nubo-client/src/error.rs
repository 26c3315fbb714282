use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use url::Url;

/// An error raised while talking to a single feed.
///
/// Errors are attributed to the feed that raised them, so callers can skip an unavailable feed
/// and carry on with the others.
#[derive(Debug)]
pub struct Error {
    kind: Box<ErrorKind>,
    feed: Option<String>,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.feed {
            Some(feed) => write!(f, "Feed `{feed}` is unavailable"),
            None => Display::fmt(&self.kind, f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if self.feed.is_some() {
            Some(&*self.kind)
        } else {
            self.kind.source()
        }
    }
}

impl Error {
    pub fn new(kind: ErrorKind, feed: impl Into<String>) -> Self {
        Self {
            kind: Box::new(kind),
            feed: Some(feed.into()),
        }
    }

    /// The name of the feed that raised the error, if any.
    pub fn feed(&self) -> Option<&str> {
        self.feed.as_deref()
    }

    /// Return the [`ErrorKind`] of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Convert this error into an [`ErrorKind`].
    pub fn into_kind(self) -> ErrorKind {
        *self.kind
    }

    /// Returns `true` if the feed answered that the requested resource doesn't exist.
    pub fn is_not_found(&self) -> bool {
        match &*self.kind {
            ErrorKind::WrappedReqwestError(_, err) => {
                err.status() == Some(reqwest::StatusCode::NOT_FOUND)
            }
            ErrorKind::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
            feed: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("Failed to build the HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Failed to fetch: `{0}`")]
    WrappedReqwestError(Url, #[source] WrappedReqwestError),

    #[error("Received some unexpected JSON from {url}")]
    BadJson {
        source: serde_json::Error,
        url: Url,
    },

    #[error("Failed to parse the package manifest from {location}")]
    BadNuspec {
        source: nubo_package_types::NuspecError,
        location: String,
    },

    #[error("The service index at {0} doesn't advertise a `PackageBaseAddress/3.0.0` resource")]
    MissingPackageBaseAddress(Url),

    #[error("Feed URL `{0}` cannot be used as a base URL")]
    CannotBeABase(Url),

    #[error("Failed to read `{0}`")]
    Archive(PathBuf, #[source] nubo_extract::Error),

    #[error("Feed `{0}` is a local directory and has no service index")]
    NotRemote(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Task failed")]
    Join(#[from] tokio::task::JoinError),
}

impl ErrorKind {
    pub(crate) fn from_reqwest(url: Url, err: reqwest::Error) -> Self {
        Self::WrappedReqwestError(url, WrappedReqwestError(reqwest_middleware::Error::Reqwest(err)))
    }

    pub(crate) fn from_reqwest_middleware(url: Url, err: reqwest_middleware::Error) -> Self {
        Self::WrappedReqwestError(url, WrappedReqwestError(err))
    }
}

#[derive(Debug)]
pub struct WrappedReqwestError(reqwest_middleware::Error);

impl WrappedReqwestError {
    fn inner(&self) -> Option<&reqwest::Error> {
        match &self.0 {
            reqwest_middleware::Error::Reqwest(err) => Some(err),
            reqwest_middleware::Error::Middleware(err) => err.chain().find_map(|err| {
                if let Some(err) = err.downcast_ref::<reqwest::Error>() {
                    Some(err)
                } else if let Some(reqwest_middleware::Error::Reqwest(err)) =
                    err.downcast_ref::<reqwest_middleware::Error>()
                {
                    Some(err)
                } else {
                    None
                }
            }),
        }
    }

    /// The HTTP status of the failed response, if the server responded.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        self.inner().and_then(reqwest::Error::status)
    }
}

impl Display for WrappedReqwestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for WrappedReqwestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn attributed_to_feed() {
        let err = Error::new(
            ErrorKind::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No such file or directory",
            )),
            "local",
        );
        assert!(err.is_not_found());
        assert_eq!(err.feed(), Some("local"));

        let chain = std::iter::successors(
            Some(&err as &dyn std::error::Error),
            |err| err.source(),
        )
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n");
        assert_snapshot!(chain, @r"
        Feed `local` is unavailable
        No such file or directory
        ");
    }
}
