use std::ops::Deref;
use std::path::{Path, PathBuf};

use nubo_fs::Simplified;

pub use crate::combine::*;
pub use crate::settings::*;

mod combine;
mod settings;

/// The name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "nubo.toml";

/// The [`Options`] as loaded from a configuration file on disk.
#[derive(Debug, Clone)]
pub struct FilesystemOptions {
    options: Options,
    /// The file the options were read from.
    path: PathBuf,
}

impl FilesystemOptions {
    /// Convert the [`FilesystemOptions`] into [`Options`].
    pub fn into_options(self) -> Options {
        self.options
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The directory containing the configuration file.
    pub fn root(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }

    /// Find the [`FilesystemOptions`] for the given path.
    ///
    /// The search starts at the given path and goes up the directory tree until a `nubo.toml`
    /// file is found.
    pub fn find(path: &Path) -> Result<Option<Self>, Error> {
        for ancestor in path.ancestors() {
            let file = ancestor.join(CONFIG_FILE_NAME);
            match Self::from_file(&file) {
                Ok(options) => return Ok(Some(options)),
                Err(Error::Io(err))
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
                    ) =>
                {
                    // Continue traversing the directory tree.
                }
                Err(err) => return Err(err),
            }
        }
        tracing::debug!("No configuration found in: `{}`", path.user_display());
        Ok(None)
    }

    /// Load a [`FilesystemOptions`] from a `nubo.toml` file.
    ///
    /// Relative paths in the file are resolved against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = std::path::absolute(path.as_ref())?;
        let content = fs_err::read_to_string(&path)?;
        let options = toml::from_str::<Options>(&content)
            .map_err(|err| Error::NuboToml(path.clone(), Box::new(err)))?;
        let options = match path.parent() {
            Some(parent) => options.relative_to(parent),
            None => options,
        };
        options.feeds().map_err(|err| Error::InvalidFeed(path.clone(), Box::new(err)))?;

        tracing::debug!("Found configuration at: `{}`", path.user_display());
        Ok(Self { options, path })
    }
}

impl Deref for FilesystemOptions {
    type Target = Options;

    fn deref(&self) -> &Self::Target {
        &self.options
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to parse: `{}`", _0.user_display())]
    NuboToml(PathBuf, #[source] Box<toml::de::Error>),

    #[error("Invalid feed in: `{}`", _0.user_display())]
    InvalidFeed(PathBuf, #[source] Box<Error>),

    #[error("Feed `{0}` must set either `url` or `path`")]
    MissingFeedLocation(String),

    #[error("Feed `{0}` sets both `url` and `path`")]
    AmbiguousFeed(String),
}
