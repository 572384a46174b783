// ==============================================================================
// registry.rs - Sample Registry
// ==============================================================================
// Description: Run-scoped cache of sample name -> sample id
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::collections::HashMap;
use tracing::{debug, error};

use crate::normalize::normalize_sample_name;
use crate::store::{upsert_by_unique_key, StoreError, Upserted, VariantStore};

/// Sample ids resolved during one run
///
/// Ids first inserted inside an open file transaction are pending until
/// `commit_pending`; `rollback_pending` evicts them so the cache never points
/// at a row that no longer exists.
#[derive(Debug, Default)]
pub struct SampleRegistry {
    ids: HashMap<String, i64>,
    pending: Vec<String>,
}

impl SampleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a sample id, inserting the sample if it is new
    ///
    /// Returns `Ok(None)` when the insert conflicts and the follow-up lookup
    /// still finds nothing; genotypes for that sample are skipped.
    pub fn register<S: VariantStore + ?Sized>(
        &mut self,
        store: &mut S,
        raw_name: &str,
    ) -> Result<Option<i64>, StoreError> {
        let name = normalize_sample_name(raw_name);
        if let Some(&id) = self.ids.get(&name) {
            return Ok(Some(id));
        }

        let upserted = upsert_by_unique_key(
            store,
            name.as_str(),
            |s| s.insert_sample(&name),
            |s, n| s.find_sample_by_name(n),
        )?;

        match upserted {
            Upserted::Inserted(id) => {
                debug!("Registered new sample {} (id {})", name, id);
                self.pending.push(name.clone());
                self.ids.insert(name, id);
                Ok(Some(id))
            }
            Upserted::Existing(id) => {
                self.ids.insert(name, id);
                Ok(Some(id))
            }
            Upserted::Missing => {
                error!("Sample {} conflicted on insert but could not be found", name);
                Ok(None)
            }
        }
    }

    pub fn get(&self, raw_name: &str) -> Option<i64> {
        self.ids.get(&normalize_sample_name(raw_name)).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The enclosing transaction committed; pending ids are now durable
    pub fn commit_pending(&mut self) {
        self.pending.clear();
    }

    /// The enclosing transaction rolled back; forget ids it created
    pub fn rollback_pending(&mut self) {
        for name in self.pending.drain(..) {
            self.ids.remove(&name);
        }
    }
}
