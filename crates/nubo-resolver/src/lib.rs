//! Dependency resolution: walks the dependency graph reachable from a set of direct requests,
//! then picks exactly one version per package id.
pub use error::{Constraint, ConstraintOrigin, ResolveError};
pub use options::{
    DEFAULT_CONCURRENCY, PrereleaseMode, ResolutionMode, ResolverOptions, ResolverOptionsBuilder,
};
pub use provider::{DefaultResolverProvider, NuspecResult, PackageVersionsResult, ResolverProvider};
pub use resolution::{
    DependencyNode, ResolutionDiagnostic, ResolvedPackage, ResolvedPackageSet,
};
pub use resolver::{Reporter, Resolver, resolve};

mod collector;
mod error;
mod options;
mod provider;
mod resolution;
mod resolver;
