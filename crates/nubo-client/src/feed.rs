use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use url::Url;

/// The service index of the public package gallery.
pub const DEFAULT_FEED_URL: &str = "https://api.nuget.org/v3/index.json";

/// The name under which the public package gallery is configured by default.
pub const DEFAULT_FEED_NAME: &str = "nuget.org";

/// Where a feed's packages are served from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedUrl {
    /// A V3 feed, identified by its service index URL.
    Remote(Url),
    /// A directory of `.nupkg` archives, either flat or laid out as `{id}/{version}/`.
    Local(PathBuf),
}

impl FeedUrl {
    /// The URL of the service index for a remote feed.
    ///
    /// Feeds may be configured either by their service index (`.../index.json`) or by the
    /// directory containing it.
    pub fn service_index(&self) -> Option<Url> {
        let Self::Remote(url) = self else {
            return None;
        };
        if url.path().ends_with(".json") {
            return Some(url.clone());
        }
        let mut url = url.clone();
        if !url.path().ends_with('/') {
            url.set_path(&format!("{}/", url.path()));
        }
        url.join("index.json").ok()
    }
}

impl FromStr for FeedUrl {
    type Err = FeedUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(FeedUrlError::Empty);
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            return Ok(Self::Remote(Url::parse(s).map_err(|err| {
                FeedUrlError::InvalidUrl(s.to_string(), err)
            })?));
        }
        if let Some(path) = s.strip_prefix("file://") {
            return Ok(Self::Local(PathBuf::from(path)));
        }
        Ok(Self::Local(PathBuf::from(s)))
    }
}

impl Display for FeedUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(url) => write!(f, "{url}"),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeedUrlError {
    #[error("Feed location is empty")]
    Empty,
    #[error("Invalid feed URL: `{0}`")]
    InvalidUrl(String, #[source] url::ParseError),
}

/// Basic-auth credentials for a feed.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    username: String,
    password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .finish()
    }
}

/// A configured package feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Feed {
    name: String,
    url: FeedUrl,
    credentials: Option<Credentials>,
}

impl Feed {
    pub fn new(name: impl Into<String>, url: FeedUrl) -> Self {
        Self {
            name: name.into(),
            url,
            credentials: None,
        }
    }

    /// A feed named after its location: the host of a remote feed, or the directory name of a
    /// local one.
    pub fn from_url(url: FeedUrl) -> Self {
        let name = match &url {
            FeedUrl::Remote(url) => url.host_str().unwrap_or("remote").to_string(),
            FeedUrl::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
        };
        Self::new(name, url)
    }

    /// The public package gallery.
    pub fn default_feed() -> Self {
        // SAFETY: The URL is a valid constant.
        let url = Url::parse(DEFAULT_FEED_URL).expect("default feed URL is valid");
        Self::new(DEFAULT_FEED_NAME, FeedUrl::Remote(url))
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &FeedUrl {
        &self.url
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// The local directory of a folder feed.
    pub fn local_path(&self) -> Option<&Path> {
        match &self.url {
            FeedUrl::Local(path) => Some(path),
            FeedUrl::Remote(_) => None,
        }
    }
}

impl Display for Feed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
