//! Storage for entities with several validity variants over time.
//!
//! A route, a stop or any other keyed record may change part-way through
//! the feed horizon. `VersionedEntity` keeps each variant together with the
//! service days it is valid on; the bitmaps of two stored versions never
//! share a day. `VersionedStore` maps keys to such entities.

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::ServiceDaysBitmap;

/// Errors from version insertion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// The new version is never valid
    #[error("version has an empty calendar")]
    EmptyCalendar,

    /// The new version overlaps a stored version with different content
    #[error("version overlaps an existing version on day {first_shared_day}")]
    Overlap { first_shared_day: usize },
}

/// How `add_or_merge_version` stored a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionInsert {
    /// Stored as a new, separate version.
    Inserted,
    /// Folded into an existing content-equal version, whose calendar grew.
    Merged,
    /// Already present with identical content on a superset of the days.
    Duplicate,
}

/// One validity variant of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Version<T> {
    pub days: ServiceDaysBitmap,
    pub value: T,
}

/// All validity variants of one logical entity.
///
/// Holds at least one version. Versions are kept sorted by their first
/// day of service.
#[derive(Debug, Clone)]
pub struct VersionedEntity<T> {
    versions: Vec<Version<T>>,
}

impl<T> VersionedEntity<T> {
    /// Create an entity from its first version.
    pub fn new(days: ServiceDaysBitmap, value: T) -> Result<Self, VersionError> {
        if days.is_empty() {
            return Err(VersionError::EmptyCalendar);
        }
        Ok(Self {
            versions: vec![Version { days, value }],
        })
    }

    /// Stored versions, ordered by first day of service.
    pub fn versions(&self) -> &[Version<T>] {
        &self.versions
    }

    /// Union of all versions' calendars.
    pub fn days(&self) -> ServiceDaysBitmap {
        let len = self.versions[0].days.len();
        ServiceDaysBitmap::union_all(len, self.versions.iter().map(|v| &v.days))
    }

    /// Add a version that must not share any day with a stored one.
    pub fn add_version(&mut self, days: ServiceDaysBitmap, value: T) -> Result<(), VersionError> {
        if days.is_empty() {
            return Err(VersionError::EmptyCalendar);
        }
        if let Some(day) = self.first_overlap(&days) {
            return Err(VersionError::Overlap {
                first_shared_day: day,
            });
        }
        self.insert_sorted(Version { days, value });
        Ok(())
    }

    /// Add a version, folding it into a content-equal version when possible.
    ///
    /// * If the calendar overlaps stored versions, the call is accepted only
    ///   when each overlapped version covers the whole new calendar and is
    ///   content-equal; nothing changes in that case.
    /// * Otherwise, a content-equal version is removed, combined with the new
    ///   value through `merge`, given the union calendar and re-inserted.
    /// * Otherwise the value becomes a new version.
    pub fn add_or_merge_version(
        &mut self,
        days: ServiceDaysBitmap,
        value: T,
        equal: impl Fn(&T, &T) -> bool,
        merge: impl FnOnce(T, T) -> T,
    ) -> Result<VersionInsert, VersionError> {
        if days.is_empty() {
            return Err(VersionError::EmptyCalendar);
        }

        let overlapping: Vec<&Version<T>> = self
            .versions
            .iter()
            .filter(|v| v.days.intersects(&days))
            .collect();
        if !overlapping.is_empty() {
            let tolerated = overlapping
                .iter()
                .all(|v| days.is_subset_of(&v.days) && equal(&v.value, &value));
            if tolerated {
                return Ok(VersionInsert::Duplicate);
            }
            let first_shared_day = self.first_overlap(&days).unwrap_or_default();
            return Err(VersionError::Overlap { first_shared_day });
        }

        if let Some(pos) = self.versions.iter().position(|v| equal(&v.value, &value)) {
            let existing = self.versions.remove(pos);
            let merged = Version {
                days: existing.days.union(&days),
                value: merge(existing.value, value),
            };
            self.insert_sorted(merged);
            return Ok(VersionInsert::Merged);
        }

        self.insert_sorted(Version { days, value });
        Ok(VersionInsert::Inserted)
    }

    /// The version whose calendar contains all of `days`.
    pub fn find_exact(&self, days: &ServiceDaysBitmap) -> Option<&T> {
        if days.is_empty() {
            return None;
        }
        self.versions
            .iter()
            .find(|v| days.is_subset_of(&v.days))
            .map(|v| &v.value)
    }

    /// Find the best version for `days`, never failing.
    ///
    /// Returns `(true, value)` on exact containment. Otherwise falls back, in
    /// order, to the version active on the first day of `days`, the nearest
    /// version starting before that day, and finally the earliest version;
    /// these fallbacks return `(false, value)`.
    pub fn find_tolerant(&self, days: &ServiceDaysBitmap) -> (bool, &T) {
        if let Some(value) = self.find_exact(days) {
            return (true, value);
        }

        let Some(first) = days.first_day() else {
            return (false, &self.versions[0].value);
        };

        if let Some(v) = self.versions.iter().find(|v| v.days.get(first)) {
            return (false, &v.value);
        }

        let preceding = self
            .versions
            .iter()
            .rev()
            .find(|v| v.days.first_day().is_some_and(|d| d < first));
        match preceding {
            Some(v) => (false, &v.value),
            None => (false, &self.versions[0].value),
        }
    }

    fn first_overlap(&self, days: &ServiceDaysBitmap) -> Option<usize> {
        self.versions
            .iter()
            .filter_map(|v| v.days.intersect(days).first_day())
            .min()
    }

    fn insert_sorted(&mut self, version: Version<T>) {
        let first = version.days.first_day();
        let pos = self
            .versions
            .iter()
            .position(|v| v.days.first_day() > first)
            .unwrap_or(self.versions.len());
        self.versions.insert(pos, version);
    }
}

/// Keyed collection of versioned entities.
#[derive(Debug, Clone)]
pub struct VersionedStore<K, T> {
    entities: BTreeMap<K, VersionedEntity<T>>,
}

impl<K: Ord + Clone + std::fmt::Debug, T> VersionedStore<K, T> {
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
        }
    }

    /// Create `key` with its first version.
    ///
    /// Fails only when `days` is empty. Returns `false`, leaving the store
    /// unchanged, when `key` is already present; further versions go
    /// through [`add_version`](Self::add_version) or
    /// [`add_or_merge_version`](Self::add_or_merge_version).
    pub fn add_first_version(
        &mut self,
        key: K,
        days: ServiceDaysBitmap,
        value: T,
    ) -> Result<bool, VersionError> {
        if self.entities.contains_key(&key) {
            debug!(key = ?key, "first version supplied for a known key");
            return Ok(false);
        }
        let entity = VersionedEntity::new(days, value)?;
        self.entities.insert(key, entity);
        Ok(true)
    }

    /// Add a further version to `key`, creating the key if needed.
    ///
    /// Unlike [`add_first_version`](Self::add_first_version) this rejects
    /// a calendar that overlaps a stored version.
    pub fn add_version(
        &mut self,
        key: K,
        days: ServiceDaysBitmap,
        value: T,
    ) -> Result<(), VersionError> {
        match self.entities.get_mut(&key) {
            Some(entity) => entity.add_version(days, value),
            None => {
                let entity = VersionedEntity::new(days, value)?;
                self.entities.insert(key, entity);
                Ok(())
            }
        }
    }

    /// Insert or merge a version of `key`. See
    /// [`VersionedEntity::add_or_merge_version`].
    pub fn add_or_merge_version(
        &mut self,
        key: K,
        days: ServiceDaysBitmap,
        value: T,
        equal: impl Fn(&T, &T) -> bool,
        merge: impl FnOnce(T, T) -> T,
    ) -> Result<VersionInsert, VersionError> {
        match self.entities.get_mut(&key) {
            Some(entity) => {
                let outcome = entity.add_or_merge_version(days, value, equal, merge)?;
                if outcome == VersionInsert::Duplicate {
                    debug!(key = ?key, "identical version supplied twice");
                }
                Ok(outcome)
            }
            None => {
                let entity = VersionedEntity::new(days, value)?;
                self.entities.insert(key, entity);
                Ok(VersionInsert::Inserted)
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&VersionedEntity<T>> {
        self.entities.get(key)
    }

    pub fn find_exact(&self, key: &K, days: &ServiceDaysBitmap) -> Option<&T> {
        self.entities.get(key)?.find_exact(days)
    }

    pub fn find_tolerant(&self, key: &K, days: &ServiceDaysBitmap) -> Option<(bool, &T)> {
        Some(self.entities.get(key)?.find_tolerant(days))
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entities.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &VersionedEntity<T>)> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl<K: Ord + Clone + std::fmt::Debug, T> Default for VersionedStore<K, T> {
    fn default() -> Self {
        Self::new()
    }
}
