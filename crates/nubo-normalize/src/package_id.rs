use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{InvalidIdError, validate};

/// The id of a package, e.g., `Newtonsoft.Json`.
///
/// Package ids are case-insensitive: `Newtonsoft.Json` and `newtonsoft.json` refer to the same
/// package. The id retains the casing it was first written with for display, while equality,
/// hashing and ordering operate on the lowercase form.
#[derive(Debug, Clone)]
pub struct PackageId {
    /// The id as written, e.g., `Newtonsoft.Json`.
    original: Box<str>,
    /// The lowercase id, e.g., `newtonsoft.json`.
    lowercase: Box<str>,
}

impl PackageId {
    /// Create a validated package id.
    pub fn new(id: impl AsRef<str>) -> Result<Self, InvalidIdError> {
        let id = id.as_ref().trim();
        validate(id)?;
        Ok(Self {
            original: Box::from(id),
            lowercase: id.to_ascii_lowercase().into_boxed_str(),
        })
    }

    /// Returns the id as originally written.
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Returns the lowercase id, as used in feed URLs and cache paths.
    pub fn as_lowercase(&self) -> &str {
        &self.lowercase
    }

    /// Returns `true` if the id starts with the given prefix, ignoring case.
    pub fn starts_with_ignore_case(&self, prefix: &str) -> bool {
        self.lowercase.len() >= prefix.len()
            && self.lowercase.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
    }
}

impl PartialEq for PackageId {
    fn eq(&self, other: &Self) -> bool {
        self.lowercase == other.lowercase
    }
}

impl Eq for PackageId {}

impl Hash for PackageId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lowercase.hash(state);
    }
}

impl PartialOrd for PackageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lowercase.cmp(&other.lowercase)
    }
}

impl FromStr for PackageId {
    type Err = InvalidIdError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        Self::new(id)
    }
}

impl From<&Self> for PackageId {
    fn from(id: &Self) -> Self {
        id.clone()
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.original.fmt(f)
    }
}

impl AsRef<str> for PackageId {
    fn as_ref(&self) -> &str {
        &self.original
    }
}

impl Serialize for PackageId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.original)
    }
}

impl<'de> Deserialize<'de> for PackageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl serde::de::Visitor<'_> for Visitor {
            type Value = PackageId;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a string")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                PackageId::new(v).map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}
