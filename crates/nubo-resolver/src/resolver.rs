use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::{debug, instrument, trace};

use nubo_normalize::PackageId;
use nubo_package_types::{Dependency, PackageIdentity};
use nubo_version::Preference;

use crate::collector::{Collection, Collector};
use crate::error::{Constraint, ConstraintOrigin};
use crate::provider::ResolverProvider;
use crate::{
    DependencyNode, ResolutionDiagnostic, ResolveError, ResolvedPackage, ResolvedPackageSet,
    ResolverOptions,
};

pub trait Reporter: Send + Sync {
    /// Callback to invoke when a package version's metadata has been fetched.
    fn on_progress(&self, identity: &PackageIdentity);

    /// Callback to invoke when the resolution is complete.
    fn on_complete(&self);
}

/// Resolves a set of direct requests to exactly one version per package id.
pub struct Resolver<P: ResolverProvider> {
    requests: Vec<Dependency>,
    options: ResolverOptions,
    provider: P,
    reporter: Option<Arc<dyn Reporter>>,
}

impl<P: ResolverProvider> Resolver<P> {
    pub fn new(requests: Vec<Dependency>, options: ResolverOptions, provider: P) -> Self {
        Self {
            requests,
            options,
            provider,
            reporter: None,
        }
    }

    /// Set the [`Reporter`] to use for this resolver.
    #[must_use]
    pub fn with_reporter(self, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            reporter: Some(reporter),
            ..self
        }
    }

    /// Resolve the requests.
    ///
    /// Fails atomically: either every package id reachable from the requests gets a version, or
    /// an error names the first package that couldn't be resolved.
    #[instrument(skip_all, fields(requests = self.requests.len(), mode = %self.options.resolution_mode))]
    pub async fn resolve(self) -> Result<ResolvedPackageSet, ResolveError> {
        let token = self.options.cancellation.clone();
        let collector = Collector::new(&self.provider, &self.options, self.reporter.as_deref());

        let collection = tokio::select! {
            biased;
            () = token.cancelled() => return Err(ResolveError::Cancelled),
            collection = collector.collect(&self.requests) => collection?,
        };

        let resolution = resolve_conflicts(
            collection,
            &self.requests,
            self.options.resolution_mode.preference(),
        )?;

        if let Some(reporter) = self.reporter.as_ref() {
            reporter.on_complete();
        }
        Ok(resolution)
    }
}

/// Resolve the requests against the given provider with the given options.
pub async fn resolve(
    requests: &[Dependency],
    provider: impl ResolverProvider,
    options: &ResolverOptions,
) -> Result<ResolvedPackageSet, ResolveError> {
    Resolver::new(requests.to_vec(), options.clone(), provider)
        .resolve()
        .await
}

/// Choose one version per package id among the collected nodes.
///
/// Starts with every collected node "active" and repeatedly:
///
/// 1. gathers the constraints placed by the direct requests and by the dependencies of active
///    nodes;
/// 2. picks, per id, the preferred candidate satisfying all of them;
/// 3. recomputes the active nodes as those reachable from the direct requests through the picks.
///
/// Constraints declared by versions that lost a conflict thereby stop counting. The loop ends
/// once the active set is stable (or repeats), and any conflict left at that point is an error.
fn resolve_conflicts(
    collection: Collection,
    requests: &[Dependency],
    preference: Preference,
) -> Result<ResolvedPackageSet, ResolveError> {
    let Collection {
        nodes,
        mut diagnostics,
    } = collection;

    // All collected versions of each id, in ascending order.
    let mut candidates: BTreeMap<&PackageId, Vec<&DependencyNode>> = BTreeMap::new();
    for node in nodes.values() {
        candidates.entry(&node.identity.id).or_default().push(node);
    }

    let mut direct: BTreeMap<&PackageId, Vec<Constraint>> = BTreeMap::new();
    for request in requests {
        direct.entry(&request.id).or_default().push(Constraint {
            range: request.range.clone(),
            origin: ConstraintOrigin::Requested,
        });
    }

    // What each id would resolve to if only its direct requests counted.
    let mut direct_picks = BTreeMap::new();
    for (id, constraints) in &direct {
        let pick = candidates.get(id).and_then(|nodes| choose(nodes, constraints, preference));
        let Some(pick) = pick else {
            return Err(ResolveError::VersionConflict {
                id: (*id).clone(),
                constraints: constraints.clone(),
            });
        };
        direct_picks.insert(*id, pick);
    }

    let mut active: BTreeSet<&PackageIdentity> = nodes.keys().collect();
    let mut seen = FxHashSet::default();
    let mut round = 0usize;
    let (chosen, constraints, conflicts) = loop {
        round += 1;

        let constraints = gather_constraints(&direct, &active, &nodes);
        let mut chosen: BTreeMap<&PackageId, &DependencyNode> = BTreeMap::new();
        let mut conflicts = BTreeSet::new();
        for (id, constraints) in &constraints {
            let Some(versions) = candidates.get(id) else {
                continue;
            };
            let node = if let Some(node) = choose(versions, constraints, preference) {
                node
            } else {
                conflicts.insert(*id);
                // Keep going with the best available candidate: the conflict may disappear
                // once the nodes imposing it are no longer active.
                match direct_picks.get(id) {
                    Some(node) => *node,
                    None => closest(versions, constraints, preference),
                }
            };
            chosen.insert(*id, node);
        }

        let next = reachable(&direct, &chosen);
        trace!(
            "Round {round}: {} active nodes, {} conflicts",
            next.len(),
            conflicts.len()
        );
        if next == active || !seen.insert(next.clone()) {
            break (chosen, constraints, conflicts);
        }
        active = next;
    };
    debug!("Resolved version conflicts in {round} rounds");

    let active = reachable(&direct, &chosen);
    let active_ids: BTreeSet<&PackageId> = active.iter().map(|identity| &identity.id).collect();

    if let Some(id) = conflicts.iter().find(|id| active_ids.contains(*id)) {
        return Err(ResolveError::VersionConflict {
            id: (*id).clone(),
            constraints: constraints.get(id).cloned().unwrap_or_default(),
        });
    }

    let mut packages = BTreeMap::new();
    for identity in &active {
        let node = &nodes[*identity];
        packages.insert(
            identity.id.clone(),
            ResolvedPackage {
                node: node.clone(),
                direct: direct.contains_key(&identity.id),
            },
        );
    }

    // Every dependency edge of the result must be satisfied by the result.
    for package in packages.values() {
        for dependency in package.dependencies() {
            let satisfied = packages.get(&dependency.id).is_some_and(|resolved| {
                dependency.range.satisfies(&resolved.identity().version)
            });
            if !satisfied {
                let constraints = gather_constraints(&direct, &active, &nodes)
                    .remove(&dependency.id)
                    .unwrap_or_default();
                return Err(ResolveError::VersionConflict {
                    id: dependency.id.clone(),
                    constraints,
                });
            }
        }
    }

    for (id, pick) in direct_picks {
        let Some(resolved) = packages.get(id) else {
            continue;
        };
        if resolved.identity().version != pick.identity.version {
            diagnostics.push(ResolutionDiagnostic::DirectRequestOverridden {
                id: id.clone(),
                requested: pick.identity.version.clone(),
                resolved: resolved.identity().version.clone(),
            });
        }
    }

    Ok(ResolvedPackageSet::new(packages, diagnostics))
}

/// The constraints placed on each id by the direct requests and the active nodes.
fn gather_constraints<'a>(
    direct: &BTreeMap<&'a PackageId, Vec<Constraint>>,
    active: &BTreeSet<&'a PackageIdentity>,
    nodes: &'a BTreeMap<PackageIdentity, DependencyNode>,
) -> BTreeMap<&'a PackageId, Vec<Constraint>> {
    let mut constraints = direct.clone();
    for identity in active {
        let Some(node) = nodes.get(*identity) else {
            continue;
        };
        for dependency in &node.dependencies {
            constraints
                .entry(&dependency.id)
                .or_default()
                .push(Constraint {
                    range: dependency.range.clone(),
                    origin: ConstraintOrigin::Package(node.identity.clone()),
                });
        }
    }
    constraints
}

/// The preferred candidate satisfying every constraint.
fn choose<'a>(
    candidates: &[&'a DependencyNode],
    constraints: &[Constraint],
    preference: Preference,
) -> Option<&'a DependencyNode> {
    candidates
        .iter()
        .copied()
        .filter(|node| {
            constraints
                .iter()
                .all(|constraint| constraint.range.satisfies(&node.identity.version))
        })
        .fold(None, |best, node| match best {
            Some(best) if !is_better(preference, node, best) => Some(best),
            _ => Some(node),
        })
}

/// The candidate satisfying the most constraints, preferred by `preference` on ties.
fn closest<'a>(
    candidates: &[&'a DependencyNode],
    constraints: &[Constraint],
    preference: Preference,
) -> &'a DependencyNode {
    let score = |node: &DependencyNode| {
        constraints
            .iter()
            .filter(|constraint| constraint.range.satisfies(&node.identity.version))
            .count()
    };
    let mut best = candidates[0];
    let mut best_score = score(best);
    for &node in &candidates[1..] {
        let node_score = score(node);
        if node_score > best_score
            || (node_score == best_score && is_better(preference, node, best))
        {
            best = node;
            best_score = node_score;
        }
    }
    best
}

fn is_better(preference: Preference, candidate: &DependencyNode, current: &DependencyNode) -> bool {
    preference.is_better(&candidate.identity.version, &current.identity.version)
}

/// The chosen nodes reachable from the direct requests.
fn reachable<'a>(
    direct: &BTreeMap<&'a PackageId, Vec<Constraint>>,
    chosen: &BTreeMap<&'a PackageId, &'a DependencyNode>,
) -> BTreeSet<&'a PackageIdentity> {
    let mut active = BTreeSet::new();
    let mut visited: FxHashSet<&PackageId> = FxHashSet::default();
    let mut queue: VecDeque<&PackageId> = direct.keys().copied().collect();
    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        let Some(node) = chosen.get(id) else {
            continue;
        };
        active.insert(&node.identity);
        queue.extend(node.dependencies.iter().map(|dependency| &dependency.id));
    }
    active
}
