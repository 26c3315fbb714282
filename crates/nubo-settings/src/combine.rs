use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use nubo_platform::{Rid, TargetFramework};
use nubo_resolver::{PrereleaseMode, ResolutionMode};

use crate::Options;

pub trait Combine {
    /// Combine two values, preferring the values in `self`.
    ///
    /// Scalars from `self` take precedence. Lists are joined, with the items of `self` first.
    /// Maps are merged, with the entries of `self` taking precedence.
    #[must_use]
    fn combine(self, other: Self) -> Self;
}

macro_rules! impl_combine_or {
    ($name:ident) => {
        impl Combine for Option<$name> {
            fn combine(self, other: Option<$name>) -> Option<$name> {
                self.or(other)
            }
        }
    };
}

impl_combine_or!(bool);
impl_combine_or!(u32);
impl_combine_or!(NonZeroUsize);
impl_combine_or!(PathBuf);
impl_combine_or!(Rid);
impl_combine_or!(TargetFramework);
impl_combine_or!(ResolutionMode);
impl_combine_or!(PrereleaseMode);

impl<T> Combine for Option<Vec<T>> {
    fn combine(self, other: Option<Vec<T>>) -> Option<Vec<T>> {
        match (self, other) {
            (Some(mut a), Some(b)) => {
                a.extend(b);
                Some(a)
            }
            (a, b) => a.or(b),
        }
    }
}

impl<K: Ord, V> Combine for Option<BTreeMap<K, V>> {
    fn combine(self, other: Option<BTreeMap<K, V>>) -> Option<BTreeMap<K, V>> {
        match (self, other) {
            (Some(a), Some(mut b)) => {
                b.extend(a);
                Some(b)
            }
            (a, b) => a.or(b),
        }
    }
}

impl Combine for Options {
    fn combine(self, other: Options) -> Options {
        Options {
            framework: self.framework.combine(other.framework),
            runtime: self.runtime.combine(other.runtime),
            resolution: self.resolution.combine(other.resolution),
            prerelease: self.prerelease.combine(other.prerelease),
            cache_dir: self.cache_dir.combine(other.cache_dir),
            concurrent_downloads: self.concurrent_downloads.combine(other.concurrent_downloads),
            retries: self.retries.combine(other.retries),
            runtime_graph: self.runtime_graph.combine(other.runtime_graph),
            feeds: self.feeds.combine(other.feeds),
            package_source_mapping: self
                .package_source_mapping
                .combine(other.package_source_mapping),
            dependencies: self.dependencies.combine(other.dependencies),
        }
    }
}

impl Combine for Option<Options> {
    fn combine(self, other: Option<Options>) -> Option<Options> {
        match (self, other) {
            (Some(a), Some(b)) => Some(a.combine(b)),
            (a, b) => a.or(b),
        }
    }
}
