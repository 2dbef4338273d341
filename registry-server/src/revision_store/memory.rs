use super::{plan_addition, plan_removal, RevisionStore, StoreError, StoreResult};
use crate::types::{PackageDocument, Removal, Revision, VersionRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// In-process revision store.
///
/// Every operation runs under one mutex with no await point inside the
/// critical section, so a cancelled caller either sees its mutation fully
/// applied or not at all.
#[derive(Default)]
pub struct MemoryRevisionStore {
    docs: Mutex<HashMap<String, PackageDocument>>,
    calls: AtomicUsize,
}

impl MemoryRevisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of trait operations served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, PackageDocument>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.docs
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl RevisionStore for MemoryRevisionStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, name: &str) -> StoreResult<PackageDocument> {
        self.lock()?
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::PackageNotFound(name.to_string()))
    }

    async fn remove_version(
        &self,
        name: &str,
        version: &str,
        expected: &Revision,
    ) -> StoreResult<Removal> {
        let mut docs = self.lock()?;
        let doc = docs
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::PackageNotFound(name.to_string()))?;

        let (removal, next) = plan_removal(doc, version, expected)?;
        match next {
            Some(doc) => {
                debug!(package = %name, rev = %doc.revision, "Stored reduced document");
                docs.insert(name.to_string(), doc);
            }
            None => {
                debug!(package = %name, "Deleted document with no remaining versions");
                docs.remove(name);
            }
        }
        Ok(removal)
    }

    async fn add_version(
        &self,
        name: &str,
        record: VersionRecord,
        expected: Option<&Revision>,
    ) -> StoreResult<PackageDocument> {
        let mut docs = self.lock()?;
        let doc = plan_addition(docs.get(name).cloned(), name, record, expected)?;
        docs.insert(name.to_string(), doc.clone());
        Ok(doc)
    }

    async fn list_names(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.lock()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
