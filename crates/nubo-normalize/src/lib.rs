use std::error::Error;
use std::fmt::{Display, Formatter};

pub use package_id::PackageId;

mod package_id;

/// Validate a package id.
///
/// Package ids are ASCII alphanumerics, separated by `.`, `-` or `_`. Ids must start and end
/// with an alphanumeric character.
fn validate(id: &str) -> Result<(), InvalidIdError> {
    let Some(first) = id.chars().next() else {
        return Err(InvalidIdError(id.to_string()));
    };
    if !first.is_ascii_alphanumeric() {
        return Err(InvalidIdError(id.to_string()));
    }
    if id.ends_with(['.', '-', '_']) {
        return Err(InvalidIdError(id.to_string()));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(InvalidIdError(id.to_string()));
    }
    Ok(())
}

/// Invalid [`PackageId`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidIdError(String);

impl InvalidIdError {
    /// Returns the invalid id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InvalidIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Not a valid package id, it must start and end with a letter or digit and consist only of letters, digits, `.`, `-` and `_`: `{}`",
            self.0
        )
    }
}

impl Error for InvalidIdError {}
