use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::category::Category;
use crate::error::ServiceError;

/// Owned item count per category. Always holds all nine categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<Category, u32>")]
pub struct ClosetCounts(BTreeMap<Category, u32>);

impl ClosetCounts {
    pub fn empty() -> Self {
        ClosetCounts(Category::ALL.iter().map(|&c| (c, 0)).collect())
    }

    pub fn get(&self, category: Category) -> u32 {
        self.0.get(&category).copied().unwrap_or(0)
    }

    pub fn set(&mut self, category: Category, count: u32) {
        self.0.insert(category, count);
    }

    pub fn increment(&mut self, category: Category) {
        let count = self.0.entry(category).or_insert(0);
        *count = count.saturating_add(1);
    }

    pub fn total(&self) -> u64 {
        self.0.values().map(|&count| u64::from(count)).sum()
    }

    /// Share of `category` in the closet, in percent. Zero for an empty closet.
    pub fn percentage(&self, category: Category) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        f64::from(self.get(category)) / total as f64 * 100.0
    }
}

impl TryFrom<BTreeMap<Category, u32>> for ClosetCounts {
    type Error = String;

    fn try_from(map: BTreeMap<Category, u32>) -> Result<Self, Self::Error> {
        let missing: Vec<&str> = Category::ALL
            .iter()
            .filter(|c| !map.contains_key(c))
            .map(|c| c.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing categories: {}", missing.join(", ")));
        }
        Ok(ClosetCounts(map))
    }
}

/// JSON-file backed closet.
///
/// Read-modify-write cycles go through [`ClosetStore::update`], which holds
/// an in-process lock for the whole cycle. Other processes writing the same
/// file are not coordinated with.
pub struct ClosetStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ClosetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<ClosetCounts, ServiceError> {
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            ServiceError::StoreUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            ServiceError::StoreUnavailable(format!("{}: {}", self.path.display(), e))
        })
    }

    /// Replaces the closet file. The new content is written to a sibling
    /// temp file and renamed into place.
    pub fn save(&self, counts: &ClosetCounts) -> Result<(), ServiceError> {
        let unavailable =
            |e: std::io::Error| ServiceError::StoreUnavailable(format!("{}: {}", self.path.display(), e));

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let body = serde_json::to_vec_pretty(counts)
            .map_err(|e| ServiceError::StoreUnavailable(e.to_string()))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(unavailable)?;
        tmp.write_all(&body).map_err(unavailable)?;
        tmp.as_file().sync_all().map_err(unavailable)?;
        tmp.persist(&self.path).map_err(|e| unavailable(e.error))?;
        Ok(())
    }

    /// Loads the closet, hands it to `f`, and saves it back if `f` returns
    /// `true` as its second value.
    pub fn update<R>(
        &self,
        f: impl FnOnce(&mut ClosetCounts) -> (R, bool),
    ) -> Result<(R, ClosetCounts), ServiceError> {
        // Guards no data; a poisoned lock is still usable.
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut counts = self.load()?;
        let (result, dirty) = f(&mut counts);
        if dirty {
            self.save(&counts)?;
        }
        Ok((result, counts))
    }
}
