use std::fmt::{Display, Formatter};

use nubo_normalize::PackageId;

use crate::Feed;

/// A package id pattern in a source mapping: either an exact id, or a prefix ending in `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PackagePattern {
    Exact(String),
    Prefix(String),
}

impl PackagePattern {
    pub fn new(pattern: &str) -> Self {
        let pattern = pattern.trim();
        match pattern.strip_suffix('*') {
            Some(prefix) => Self::Prefix(prefix.to_ascii_lowercase()),
            None => Self::Exact(pattern.to_ascii_lowercase()),
        }
    }

    /// Returns the strength of the match against `id`, if the pattern matches.
    ///
    /// Exact matches outrank every prefix; longer prefixes outrank shorter ones.
    fn matches(&self, id: &PackageId) -> Option<usize> {
        match self {
            Self::Exact(exact) => (id.as_lowercase() == exact).then_some(usize::MAX),
            Self::Prefix(prefix) => id
                .as_lowercase()
                .starts_with(prefix.as_str())
                .then_some(prefix.len()),
        }
    }
}

impl Display for PackagePattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(exact) => write!(f, "{exact}"),
            Self::Prefix(prefix) => write!(f, "{prefix}*"),
        }
    }
}

/// Rules restricting which feeds may serve which package ids, keyed by feed name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMapping {
    rules: Vec<(String, Vec<PackagePattern>)>,
}

impl SourceMapping {
    pub fn new(rules: impl IntoIterator<Item = (String, Vec<PackagePattern>)>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.iter().all(|(_, patterns)| patterns.is_empty())
    }

    /// The strongest match for `id` among the patterns configured for `feed`.
    fn strength(&self, feed: &str, id: &PackageId) -> Option<usize> {
        self.rules
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(feed))
            .flat_map(|(_, patterns)| patterns)
            .filter_map(|pattern| pattern.matches(id))
            .max()
    }
}

/// The feeds allowed to serve a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleFeeds<'a> {
    /// The feeds to query, in configured order.
    pub feeds: Vec<&'a Feed>,
    /// Whether the mapping matched no configured feed, so every feed was returned instead.
    pub fallback: bool,
}

/// Select the feeds that may serve `id`, in configured order.
///
/// Without any mapping rules, every feed is eligible. Otherwise, only the feeds whose patterns
/// match `id` most specifically are eligible. If mapping rules exist but no configured feed has
/// a pattern matching `id`, every feed is returned and `fallback` is set, so the caller can warn.
pub fn eligible_feeds<'a>(
    id: &PackageId,
    feeds: &'a [Feed],
    mapping: &SourceMapping,
) -> EligibleFeeds<'a> {
    if mapping.is_empty() {
        return EligibleFeeds {
            feeds: feeds.iter().collect(),
            fallback: false,
        };
    }

    let strengths = feeds
        .iter()
        .map(|feed| mapping.strength(feed.name(), id))
        .collect::<Vec<_>>();

    let Some(best) = strengths.iter().flatten().max().copied() else {
        return EligibleFeeds {
            feeds: feeds.iter().collect(),
            fallback: true,
        };
    };

    EligibleFeeds {
        feeds: feeds
            .iter()
            .zip(&strengths)
            .filter(|(_, strength)| **strength == Some(best))
            .map(|(feed, _)| feed)
            .collect(),
        fallback: false,
    }
}
