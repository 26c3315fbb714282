use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::Mutex;

use nubo_package_types::PackageIdentity;

/// A set of locks used to prevent concurrent fetches of the same package within a process.
#[derive(Debug, Default)]
pub(crate) struct Locks(Mutex<FxHashMap<PackageIdentity, Arc<Mutex<()>>>>);

impl Locks {
    /// Acquire a lock on the given package.
    pub(crate) async fn acquire(&self, identity: &PackageIdentity) -> Arc<Mutex<()>> {
        let mut map = self.0.lock().await;
        map.entry(identity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
