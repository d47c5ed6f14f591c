//! Store registry (§4.10): the durable `stores.json` catalog of every
//! `Store` this instance knows about. Grounded on the teacher's
//! `handlers/storage.rs` atomic write-temp-then-rename pattern, generalized
//! from one index file to a collection keyed by `StoreId`.

use crate::error::{CoreError, Result};
use crate::ids::StoreId;
use crate::model::{Store, StoreKind, StoreSpec, StoreStatus};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Filter criteria for `StoreRegistry::list` (§4.10): every `Some` field
/// narrows the result; `None` leaves that dimension unconstrained.
#[derive(Debug, Clone, Default)]
pub struct StoreFilter {
    pub kind: Option<StoreKind>,
    pub status: Option<StoreStatus>,
    pub tag: Option<String>,
}

/// Patchable fields of an existing store. `name` is deliberately absent:
/// uniqueness is enforced at creation and renaming would require
/// re-checking every other store, which nothing in this system needs.
#[derive(Debug, Clone, Default)]
pub struct StorePatch {
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub branch: Option<String>,
    pub url: Option<String>,
    pub path: Option<String>,
}

pub struct StoreRegistry {
    path: PathBuf,
    stores: BTreeMap<StoreId, Store>,
}

impl StoreRegistry {
    fn registry_path(data_dir: &Path) -> PathBuf {
        data_dir.join("stores.json")
    }

    /// Loads the registry, treating a missing file as empty and a corrupt
    /// one as a fatal error (§7: corruption is not silently papered over).
    pub fn load(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let path = Self::registry_path(&data_dir);
        if !path.exists() {
            return Ok(Self {
                path,
                stores: BTreeMap::new(),
            });
        }
        let raw = fs::read_to_string(&path).map_err(|e| CoreError::io(path.display().to_string(), e))?;
        let list: Vec<Store> = serde_json::from_str(&raw)
            .map_err(|e| CoreError::corruption(path.display().to_string(), e.to_string()))?;
        let stores = list.into_iter().map(|s| (s.id.clone(), s)).collect();
        Ok(Self { path, stores })
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| CoreError::io(parent.display().to_string(), e))?;
        }
        let list: Vec<&Store> = self.stores.values().collect();
        let body = serde_json::to_string_pretty(&list)
            .map_err(|e| CoreError::corruption(self.path.display().to_string(), e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| CoreError::io(tmp.display().to_string(), e))?;
        fs::rename(&tmp, &self.path).map_err(|e| CoreError::io(self.path.display().to_string(), e))?;
        Ok(())
    }

    /// Checks the kind-specific field invariants (§3): a local directory
    /// must name an existing path, a cloned repo must name a path or a
    /// url, and a web collection must name a url.
    fn validate_spec(spec: &StoreSpec) -> Result<()> {
        match spec.kind {
            StoreKind::LocalDirectory => {
                let Some(path) = &spec.path else {
                    return Err(CoreError::invalid("store", "local-directory store requires a path"));
                };
                if !Path::new(path).exists() {
                    return Err(CoreError::invalid("store", format!("path does not exist: {path}")));
                }
            }
            StoreKind::ClonedRepo => {
                if spec.path.is_none() && spec.url.is_none() {
                    return Err(CoreError::invalid("store", "cloned-repo store requires a path or a url"));
                }
            }
            StoreKind::WebCollection => {
                if spec.url.is_none() {
                    return Err(CoreError::invalid("store", "web-collection store requires a url"));
                }
            }
        }
        Ok(())
    }

    pub fn create(&mut self, spec: StoreSpec) -> Result<Store> {
        if self.stores.values().any(|s| s.name == spec.name) {
            return Err(CoreError::conflict("store", spec.name.clone(), "name already in use"));
        }
        Self::validate_spec(&spec)?;
        let now = crate::model::now_ms();
        let store = Store {
            id: StoreId::new(crate::ids::generate_id("store")),
            name: spec.name,
            kind: spec.kind,
            path: spec.path,
            url: spec.url,
            branch: spec.branch,
            description: spec.description,
            tags: spec.tags,
            created_at: now,
            updated_at: now,
            status: StoreStatus::Pending,
            dimension: None,
        };
        self.stores.insert(store.id.clone(), store.clone());
        self.persist()?;
        Ok(store)
    }

    pub fn get(&self, id: &StoreId) -> Result<&Store> {
        self.stores.get(id).ok_or_else(|| CoreError::not_found("store", id.as_str()))
    }

    pub fn get_by_name(&self, name: &str) -> Result<&Store> {
        self.stores
            .values()
            .find(|s| s.name == name)
            .ok_or_else(|| CoreError::not_found("store", name))
    }

    /// Tries an id lookup first, falling back to a name lookup — the shape
    /// every tool-surface handler that accepts a free-text store reference
    /// needs (§4.12).
    pub fn get_by_id_or_name(&self, id_or_name: &str) -> Result<&Store> {
        if let Some(store) = self.stores.get(&StoreId::from(id_or_name)) {
            return Ok(store);
        }
        self.get_by_name(id_or_name)
    }

    pub fn list(&self, filter: Option<&StoreFilter>) -> Vec<&Store> {
        self.stores
            .values()
            .filter(|s| match filter {
                None => true,
                Some(f) => {
                    f.kind.map_or(true, |k| k == s.kind)
                        && f.status.map_or(true, |status| status == s.status)
                        && f.tag.as_ref().map_or(true, |tag| s.tags.iter().any(|t| t == tag))
                }
            })
            .collect()
    }

    pub fn update_status(&mut self, id: &StoreId, status: StoreStatus, dimension: Option<usize>) -> Result<()> {
        let store = self.stores.get_mut(id).ok_or_else(|| CoreError::not_found("store", id.as_str()))?;
        store.status = status;
        if let Some(dim) = dimension {
            store.dimension = Some(dim);
        }
        store.updated_at = crate::model::now_ms();
        self.persist()
    }

    /// Applies a general field patch, leaving untouched fields as-is.
    pub fn update(&mut self, id: &StoreId, patch: StorePatch) -> Result<Store> {
        let store = self.stores.get_mut(id).ok_or_else(|| CoreError::not_found("store", id.as_str()))?;
        if let Some(description) = patch.description {
            store.description = Some(description);
        }
        if let Some(tags) = patch.tags {
            store.tags = tags;
        }
        if let Some(branch) = patch.branch {
            store.branch = Some(branch);
        }
        if let Some(url) = patch.url {
            store.url = Some(url);
        }
        if let Some(path) = patch.path {
            store.path = Some(path);
        }
        store.updated_at = crate::model::now_ms();
        let snapshot = store.clone();
        self.persist()?;
        Ok(snapshot)
    }

    /// Removes the registry entry. Callers must delete the store's
    /// on-disk documents/graph/cache *before* calling this, so a crash
    /// mid-delete never leaves a registry entry pointing at nothing and a
    /// directory the registry can no longer find (§4.10).
    pub fn delete(&mut self, id: &StoreId) -> Result<()> {
        if self.stores.remove(id).is_none() {
            return Err(CoreError::not_found("store", id.as_str()));
        }
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StoreKind;

    fn spec(name: &str) -> StoreSpec {
        StoreSpec {
            name: name.to_string(),
            kind: StoreKind::LocalDirectory,
            path: Some(std::env::temp_dir().to_string_lossy().to_string()),
            url: None,
            branch: None,
            description: None,
            tags: Vec::new(),
        }
    }

    #[test]
    fn create_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = StoreRegistry::load(dir.path()).unwrap();
        let store = registry.create(spec("proj")).unwrap();
        assert_eq!(registry.get(&store.id).unwrap().name, "proj");
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = StoreRegistry::load(dir.path()).unwrap();
        registry.create(spec("proj")).unwrap();
        assert!(registry.create(spec("proj")).is_err());
    }

    #[test]
    fn reload_after_persist_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let mut registry = StoreRegistry::load(dir.path()).unwrap();
            registry.create(spec("proj")).unwrap().id
        };
        let reloaded = StoreRegistry::load(dir.path()).unwrap();
        assert!(reloaded.get(&id).is_ok());
    }

    #[test]
    fn delete_unknown_store_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = StoreRegistry::load(dir.path()).unwrap();
        assert!(registry.delete(&StoreId::from("nope")).is_err());
    }

    #[test]
    fn get_by_id_or_name_falls_back_to_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = StoreRegistry::load(dir.path()).unwrap();
        let store = registry.create(spec("proj")).unwrap();
        assert_eq!(registry.get_by_id_or_name(store.id.as_str()).unwrap().name, "proj");
        assert_eq!(registry.get_by_id_or_name("proj").unwrap().id, store.id);
        assert!(registry.get_by_id_or_name("nope").is_err());
    }

    #[test]
    fn local_directory_store_requires_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = StoreRegistry::load(dir.path()).unwrap();
        let bad = StoreSpec {
            path: Some("/does/not/exist/anywhere".to_string()),
            ..spec("broken")
        };
        assert!(registry.create(bad).is_err());
    }

    #[test]
    fn web_collection_store_requires_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = StoreRegistry::load(dir.path()).unwrap();
        let bad = StoreSpec {
            kind: StoreKind::WebCollection,
            path: None,
            url: None,
            ..spec("web")
        };
        assert!(registry.create(bad).is_err());
    }

    #[test]
    fn list_filters_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = StoreRegistry::load(dir.path()).unwrap();
        registry.create(spec("proj")).unwrap();
        let filter = StoreFilter {
            kind: Some(StoreKind::WebCollection),
            ..Default::default()
        };
        assert!(registry.list(Some(&filter)).is_empty());
        assert_eq!(registry.list(None).len(), 1);
    }

    #[test]
    fn update_patches_description_without_touching_other_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = StoreRegistry::load(dir.path()).unwrap();
        let store = registry.create(spec("proj")).unwrap();
        let patched = registry
            .update(
                &store.id,
                StorePatch {
                    description: Some("a project".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(patched.description.as_deref(), Some("a project"));
        assert_eq!(patched.name, "proj");
    }
}
