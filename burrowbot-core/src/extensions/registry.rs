//! Bookkeeping for installed extensions.
//!
//! The registry owns the installed set (insertion order preserved),
//! computes dependency closures against the index and the package
//! manager, and defers removal of an extension until nothing installed
//! still depends on it. Mutations of the same name are serialized;
//! operations on disjoint names may run concurrently.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use url::Url;

use burrowbot_common::models::extension::{
    DependencyClosure, ExtensionDescriptor, InstalledExtension,
};
use burrowbot_common::traits::platform_traits::PackageManager;

use crate::extensions::index::{normalize_name, ExtensionIndex};
use crate::Error;

pub struct ExtensionRegistry {
    index: Arc<dyn ExtensionIndex>,
    packages: Arc<dyn PackageManager>,
    installed: Mutex<Vec<InstalledExtension>>,
    op_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl ExtensionRegistry {
    pub fn new(index: Arc<dyn ExtensionIndex>, packages: Arc<dyn PackageManager>) -> Self {
        Self {
            index,
            packages,
            installed: Mutex::new(Vec::new()),
            op_locks: DashMap::new(),
        }
    }

    fn op_lock(&self, name: &str) -> Arc<AsyncMutex<()>> {
        self.op_locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed
            .lock()
            .unwrap()
            .iter()
            .any(|record| record.name == name)
    }

    /// Installed records in insertion order.
    pub fn list_installed(&self) -> Vec<InstalledExtension> {
        self.installed.lock().unwrap().clone()
    }

    /// Marks an installed extension as loaded (or unloaded).
    pub fn set_loaded(&self, name: &str, loaded: bool) -> Result<(), Error> {
        let mut installed = self.installed.lock().unwrap();
        let record = installed
            .iter_mut()
            .find(|record| record.name == name)
            .ok_or_else(|| Error::ExtensionNotFound(name.to_string()))?;
        record.loaded = loaded;
        Ok(())
    }

    /// Registers `name` as installed if its dependency closure is
    /// satisfied. A non-empty closure means nothing was recorded; the
    /// caller resolves the closure and installs again.
    pub async fn install(
        &self,
        name: &str,
        source: Option<Url>,
    ) -> Result<DependencyClosure, Error> {
        let name = normalize_name(name)?;
        let lock = self.op_lock(&name);
        let _guard = lock.lock().await;

        if self.is_installed(&name) {
            return Err(Error::ExtensionAlreadyInstalled(name));
        }
        if let Some(source) = source {
            self.index.register_source(&name, source).await?;
        }
        let descriptor = self.index.resolve(&name).await?;
        let closure = self.compute_closure(&descriptor).await?;
        if closure.is_satisfied() {
            self.installed.lock().unwrap().push(InstalledExtension {
                name: name.clone(),
                loaded: false,
            });
            info!("installed extension '{}'", name);
        } else {
            debug!(
                "extension '{}' has unsatisfied dependencies: packages={:?} extensions={:?}",
                name, closure.packages, closure.extensions
            );
        }
        Ok(closure)
    }

    /// Re-resolves the descriptor and reports only the dependencies that
    /// are newly declared and still unmet.
    pub async fn update(&self, name: &str) -> Result<DependencyClosure, Error> {
        let name = normalize_name(name)?;
        let lock = self.op_lock(&name);
        let _guard = lock.lock().await;

        if !self.is_installed(&name) {
            return Err(Error::ExtensionNotFound(name));
        }
        let descriptor = self.index.resolve(&name).await?;
        let closure = self.compute_closure(&descriptor).await?;
        if closure.is_satisfied() {
            info!("updated extension '{}'", name);
        }
        Ok(closure)
    }

    /// Computes the set of installed extensions that still depend on
    /// `name`. Removal is deferred: only when that cascade set is empty
    /// is the record actually dropped, so a dependent extension is never
    /// left referencing a removed one.
    pub async fn uninstall(&self, name: &str) -> Result<Vec<String>, Error> {
        let name = normalize_name(name)?;
        let lock = self.op_lock(&name);
        let _guard = lock.lock().await;

        if !self.is_installed(&name) {
            return Err(Error::ExtensionNotFound(name));
        }
        let to_cascade = self.dependents_of(&name).await?;
        if to_cascade.is_empty() {
            self.installed
                .lock()
                .unwrap()
                .retain(|record| record.name != name);
            info!("uninstalled extension '{}'", name);
        }
        Ok(to_cascade)
    }

    async fn compute_closure(
        &self,
        descriptor: &ExtensionDescriptor,
    ) -> Result<DependencyClosure, Error> {
        let mut closure = DependencyClosure::default();
        for package in &descriptor.package_deps {
            if !self.packages.is_installed(package).await? {
                closure.packages.push(package.clone());
            }
        }
        for dep in &descriptor.extension_deps {
            if !self.is_installed(dep) {
                closure.extensions.push(dep.clone());
            }
        }
        Ok(closure)
    }

    /// Reverse-dependency lookup: scans every installed record's declared
    /// extension dependencies, resolved lazily through the index.
    async fn dependents_of(&self, name: &str) -> Result<Vec<String>, Error> {
        let others: Vec<String> = self
            .installed
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.name != name)
            .map(|record| record.name.clone())
            .collect();

        let mut dependents = Vec::new();
        for other in others {
            match self.index.resolve(&other).await {
                Ok(descriptor) => {
                    if descriptor.extension_deps.contains(name) {
                        dependents.push(other);
                    }
                }
                Err(Error::ExtensionNotInIndex(_)) => {
                    // Installed but no longer indexed; its declared
                    // dependencies are unknowable, treat as none.
                    warn!("installed extension '{}' is missing from the index", other);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(dependents)
    }
}
