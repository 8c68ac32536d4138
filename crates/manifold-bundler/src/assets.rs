//! Asset registry shared by every target of one invocation.
//!
//! Assets referenced by several targets are emitted exactly once. Who emits
//! is decided at configuration time by the `EmissionPlan`: the first declared
//! target whose `url` transform has `emit = true` owns the source directory.
//! The orchestrator registers each owner's assets from the shared graph
//! before any target starts, and owners check-and-set into the registry
//! again as their chains run. Every other target leaves a placeholder in its
//! output and waits for the owner's registration once its own transforms are
//! done.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::debug;

/// An asset written by its owning target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedAsset {
    /// Project-relative path of the source file
    pub asset_id: String,
    /// Content-hashed file name, relative to the owner's output directory
    pub file_name: String,
    /// URL the bundles reference
    pub public_url: String,
    pub content_type: String,
    #[serde(skip)]
    pub bytes: Arc<[u8]>,
    /// Target that emitted the asset
    pub owner: String,
}

/// Asset directory a transform reads from, and whether it emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSource {
    pub source_dir: String,
    pub emit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    #[error("asset '{asset_id}' was never emitted by '{owner}'")]
    NeverEmitted { asset_id: String, owner: String },
}

/// Configuration-time owner designation per asset source directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmissionPlan {
    owners: IndexMap<String, String>,
}

impl EmissionPlan {
    /// Build the plan from `(target, source)` pairs in target declaration order.
    pub fn from_declarations<'a, I>(declarations: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a AssetSource)>,
    {
        let mut owners = IndexMap::new();
        for (target, source) in declarations {
            if source.emit && !owners.contains_key(&source.source_dir) {
                owners.insert(source.source_dir.clone(), target.to_string());
            }
        }
        Self { owners }
    }

    pub fn owner_of(&self, source_dir: &str) -> Option<&str> {
        self.owners.get(source_dir).map(String::as_str)
    }

    pub fn owners(&self) -> impl Iterator<Item = (&str, &str)> {
        self.owners.iter().map(|(dir, owner)| (dir.as_str(), owner.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    assets: IndexMap<String, EmittedAsset>,
    /// Targets whose emissions are final
    settled: FxHashSet<String>,
    writes: usize,
}

/// Synchronized single-writer registry of emitted assets.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    plan: EmissionPlan,
    state: Mutex<RegistryState>,
    changed: Notify,
}

impl AssetRegistry {
    pub fn new(plan: EmissionPlan) -> Self {
        Self {
            plan,
            state: Mutex::new(RegistryState::default()),
            changed: Notify::new(),
        }
    }

    pub fn plan(&self) -> &EmissionPlan {
        &self.plan
    }

    /// Register `asset` unless it is already present; returns the registered copy.
    pub fn emit(&self, asset: EmittedAsset) -> EmittedAsset {
        let registered = {
            let mut state = self.state.lock();
            if let Some(existing) = state.assets.get(&asset.asset_id) {
                return existing.clone();
            }
            state.writes += 1;
            state.assets.insert(asset.asset_id.clone(), asset.clone());
            asset
        };
        debug!(asset = %registered.asset_id, owner = %registered.owner, "asset emitted");
        self.changed.notify_waiters();
        registered
    }

    pub fn get(&self, asset_id: &str) -> Option<EmittedAsset> {
        self.state.lock().assets.get(asset_id).cloned()
    }

    /// Mark `target`'s emissions as final and wake waiters.
    pub fn settle(&self, target: &str) {
        let newly = self.state.lock().settled.insert(target.to_string());
        if newly {
            self.changed.notify_waiters();
        }
    }

    /// Wait until `owner` registers `asset_id`.
    ///
    /// Fails once `owner` has settled without emitting the asset.
    pub async fn wait_for(&self, asset_id: &str, owner: &str) -> Result<EmittedAsset, AssetError> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.state.lock();
                if let Some(asset) = state.assets.get(asset_id) {
                    return Ok(asset.clone());
                }
                if state.settled.contains(owner) {
                    return Err(AssetError::NeverEmitted {
                        asset_id: asset_id.to_string(),
                        owner: owner.to_string(),
                    });
                }
            }

            notified.await;
        }
    }

    /// Emitted assets in emission order.
    pub fn snapshot(&self) -> Vec<EmittedAsset> {
        self.state.lock().assets.values().cloned().collect()
    }

    /// Number of registry writes this invocation.
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    /// Handle for one target.
    pub fn access(self: &Arc<Self>, target: &str) -> AssetAccess {
        AssetAccess {
            registry: Arc::clone(self),
            target: target.to_string(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Guard settling `target` when dropped.
    pub fn guard(self: &Arc<Self>, target: &str) -> EmitterGuard {
        EmitterGuard {
            registry: Arc::clone(self),
            target: target.to_string(),
        }
    }
}

/// Settles a target's emissions when its task ends, however it ends, so
/// waiters never block forever.
#[derive(Debug)]
pub struct EmitterGuard {
    registry: Arc<AssetRegistry>,
    target: String,
}

impl EmitterGuard {
    pub fn settle(&self) {
        self.registry.settle(&self.target);
    }
}

impl Drop for EmitterGuard {
    fn drop(&mut self) {
        self.registry.settle(&self.target);
    }
}

/// A reference to an asset another target emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAsset {
    pub placeholder: String,
    pub asset_id: String,
    pub owner: String,
}

/// A target's view of the registry, handed to transforms.
#[derive(Debug)]
pub struct AssetAccess {
    registry: Arc<AssetRegistry>,
    target: String,
    pending: Mutex<Vec<PendingAsset>>,
}

impl AssetAccess {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn owner_of(&self, source_dir: &str) -> Option<&str> {
        self.registry.plan().owner_of(source_dir)
    }

    pub fn is_owner(&self, source_dir: &str) -> bool {
        self.owner_of(source_dir) == Some(self.target.as_str())
    }

    pub fn emit(&self, asset: EmittedAsset) -> EmittedAsset {
        self.registry.emit(asset)
    }

    /// Record a reference to an asset owned by `owner` and return the
    /// placeholder to put in the output until the owner registers it.
    pub fn defer(&self, asset_id: &str, owner: &str) -> String {
        let placeholder = placeholder_for(asset_id);
        let mut pending = self.pending.lock();
        if !pending.iter().any(|p| p.asset_id == asset_id) {
            pending.push(PendingAsset {
                placeholder: placeholder.clone(),
                asset_id: asset_id.to_string(),
                owner: owner.to_string(),
            });
        }
        placeholder
    }

    pub fn take_pending(&self) -> Vec<PendingAsset> {
        std::mem::take(&mut *self.pending.lock())
    }

    pub fn registry(&self) -> &Arc<AssetRegistry> {
        &self.registry
    }
}

/// Stable placeholder for an asset URL.
pub fn placeholder_for(asset_id: &str) -> String {
    let hash = blake3::hash(asset_id.as_bytes()).to_hex();
    format!("__MANIFOLD_ASSET_{}__", &hash.as_str()[..16])
}

/// Determine content type from file path.
pub fn content_type_from_path(path: &Path) -> &'static str {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "json" => "application/json",
        "css" => "text/css",
        _ => "application/octet-stream",
    }
}
