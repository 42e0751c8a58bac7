//! Alarm persistence.
//!
//! The rest of the crate only talks to [`AlarmStore`]; [`MemoryStore`] and [`TomlStore`]
//! are the two implementations shipped with it.

use std::{
    collections::HashMap,
    fs, io,
    hash::Hash,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
    time::SystemTime,
};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::alarm::AlarmRecord;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("couldn't access alarm file {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("couldn't parse alarm file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("couldn't serialize alarms: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub trait AlarmStore: Send + Sync {
    /// inserts the record, fully replacing any record with the same id
    fn insert(&self, record: AlarmRecord) -> Result<(), StoreError>;
    fn delete(&self, id: &Uuid) -> Result<Option<AlarmRecord>, StoreError>;
    fn fetch(&self, id: &Uuid) -> Result<Option<AlarmRecord>, StoreError>;
    fn list_ordered_by_time(&self) -> Result<Vec<AlarmRecord>, StoreError>;
}

pub trait GetId<T> {
    fn get_id(&self) -> &T;
}

/// Serializable collection, stored as a list but looked up by id
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(from = "Vec<V>", into = "Vec<V>")]
pub struct Collection<K, V>
where
    K: Eq + Hash + Clone,
    V: GetId<K> + Clone,
{
    pub data: HashMap<K, V>,
}

impl<K, V> Default for Collection<K, V>
where
    K: Eq + Hash + Clone,
    V: GetId<K> + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Collection<K, V>
where
    K: Eq + Hash + Clone,
    V: GetId<K> + Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    pub fn insert(&mut self, item: V) -> Option<V> {
        let id = item.get_id().to_owned();
        self.data.insert(id, item)
    }
}

impl<K, V> From<Vec<V>> for Collection<K, V>
where
    K: Eq + Hash + Clone,
    V: GetId<K> + Clone,
{
    fn from(value: Vec<V>) -> Self {
        let mut obj: Self = Self::new();
        value.into_iter().for_each(|v| {
            obj.insert(v);
        });
        obj
    }
}

impl<K, V> From<Collection<K, V>> for Vec<V>
where
    K: Eq + Hash + Clone,
    V: GetId<K> + Clone,
{
    fn from(val: Collection<K, V>) -> Self {
        Self::from_iter(val.data.into_values())
    }
}

type Alarms = Collection<Uuid, AlarmRecord>;

fn ordered(alarms: &Alarms) -> Vec<AlarmRecord> {
    let mut records: Vec<_> = alarms.data.values().cloned().collect();
    records.sort_by(|a, b| {
        a.scheduled_time
            .cmp(&b.scheduled_time)
            .then_with(|| a.id.cmp(&b.id))
    });
    records
}

fn lock(alarms: &Mutex<Alarms>) -> MutexGuard<'_, Alarms> {
    alarms.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    alarms: Mutex<Alarms>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlarmStore for MemoryStore {
    fn insert(&self, record: AlarmRecord) -> Result<(), StoreError> {
        lock(&self.alarms).insert(record);
        Ok(())
    }

    fn delete(&self, id: &Uuid) -> Result<Option<AlarmRecord>, StoreError> {
        Ok(lock(&self.alarms).data.remove(id))
    }

    fn fetch(&self, id: &Uuid) -> Result<Option<AlarmRecord>, StoreError> {
        Ok(lock(&self.alarms).data.get(id).cloned())
    }

    fn list_ordered_by_time(&self) -> Result<Vec<AlarmRecord>, StoreError> {
        Ok(ordered(&lock(&self.alarms)))
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct AlarmFile {
    #[serde(default)]
    alarms: Alarms,
}

/// size and modification time of the alarm file, compared to notice writes by other processes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    modified: SystemTime,
    len: u64,
}

#[derive(Debug, Default)]
struct Loaded {
    alarms: Alarms,
    /// `None` while there is no file
    stamp: Option<Stamp>,
    /// bumped whenever the file is reread, our own writes don't count
    revision: u64,
}

/// keeps every alarm in one toml file, rewritten after each change.
///
/// other processes may edit the same file, so every access first checks whether it
/// changed on disk and reloads it if so.
#[derive(Debug)]
pub struct TomlStore {
    path: PathBuf,
    loaded: Mutex<Loaded>,
}

impl TomlStore {
    /// opens the alarm file at `path`, starting empty if it doesn't exist yet
    ///
    /// # Errors
    /// if the file exists but can't be read or parsed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let store = Self {
            path,
            loaded: Mutex::default(),
        };
        {
            let loaded = store.current()?;
            info!(
                "loaded {} alarms from {}",
                loaded.alarms.data.len(),
                store.path.display()
            );
        }
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// rereads the file if someone else changed it, then returns how many times
    /// that has happened. a different revision means the alarms changed under us.
    ///
    /// # Errors
    /// if the changed file can't be read or parsed
    pub fn revision(&self) -> Result<u64, StoreError> {
        Ok(self.current()?.revision)
    }

    fn current(&self) -> Result<MutexGuard<'_, Loaded>, StoreError> {
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        self.reload_if_changed(&mut loaded)?;
        Ok(loaded)
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn stamp(&self) -> Result<Option<Stamp>, StoreError> {
        match fs::metadata(&self.path) {
            Ok(metadata) => Ok(Some(Stamp {
                modified: metadata.modified().map_err(|e| self.io_error(e))?,
                len: metadata.len(),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn reload_if_changed(&self, loaded: &mut Loaded) -> Result<(), StoreError> {
        let stamp = self.stamp()?;
        if stamp == loaded.stamp {
            return Ok(());
        }
        loaded.alarms = match stamp {
            Some(_) => {
                let contents = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
                toml::from_str::<AlarmFile>(&contents)?.alarms
            }
            None => {
                debug!("no alarm file at {}, starting empty", self.path.display());
                Alarms::new()
            }
        };
        loaded.stamp = stamp;
        loaded.revision += 1;
        debug!("reread {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(ToOwned::to_owned)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// writes through a temporary file so a reader never sees half a file
    fn save(&self, loaded: &mut Loaded) -> Result<(), StoreError> {
        let file = AlarmFile {
            alarms: loaded.alarms.clone(),
        };
        let contents = toml::to_string(&file)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let temp = self.temp_path();
        fs::write(&temp, contents).map_err(|e| self.io_error(e))?;
        fs::rename(&temp, &self.path).map_err(|e| self.io_error(e))?;
        loaded.stamp = self.stamp()?;
        Ok(())
    }
}

impl AlarmStore for TomlStore {
    fn insert(&self, record: AlarmRecord) -> Result<(), StoreError> {
        let mut loaded = self.current()?;
        let id = record.id;
        let previous = loaded.alarms.insert(record);
        if let Err(e) = self.save(&mut loaded) {
            // keep memory in step with what is on disk
            match previous {
                Some(previous) => {
                    loaded.alarms.insert(previous);
                }
                None => {
                    loaded.alarms.data.remove(&id);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, id: &Uuid) -> Result<Option<AlarmRecord>, StoreError> {
        let mut loaded = self.current()?;
        let Some(removed) = loaded.alarms.data.remove(id) else {
            return Ok(None);
        };
        if let Err(e) = self.save(&mut loaded) {
            loaded.alarms.insert(removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    fn fetch(&self, id: &Uuid) -> Result<Option<AlarmRecord>, StoreError> {
        Ok(self.current()?.alarms.data.get(id).cloned())
    }

    fn list_ordered_by_time(&self) -> Result<Vec<AlarmRecord>, StoreError> {
        Ok(ordered(&self.current()?.alarms))
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    use super::*;
    use crate::alarm::AlarmDraft;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .unwrap()
    }

    fn alarm(title: &str, hour: u32) -> AlarmRecord {
        AlarmDraft {
            title: title.to_string(),
            ..AlarmDraft::at(at(hour))
        }
        .build()
        .unwrap()
    }

    #[test]
    fn it_lists_alarms_by_time() {
        let store = MemoryStore::new();
        store.insert(alarm("late", 22)).unwrap();
        store.insert(alarm("early", 6)).unwrap();
        store.insert(alarm("noon", 12)).unwrap();
        let titles: Vec<_> = store
            .list_ordered_by_time()
            .unwrap()
            .into_iter()
            .map(|a| a.title)
            .collect();
        assert_eq!(titles, ["early", "noon", "late"]);
    }

    #[test]
    fn insert_replaces_the_whole_record() {
        let store = MemoryStore::new();
        let mut record = alarm("gym", 7);
        store.insert(record.clone()).unwrap();
        record.title = "swim".to_string();
        record.scheduled_time += Duration::minutes(30);
        store.insert(record.clone()).unwrap();
        assert_eq!(store.fetch(&record.id).unwrap(), Some(record));
        assert_eq!(store.list_ordered_by_time().unwrap().len(), 1);
    }

    #[test]
    fn deleting_unknown_ids_is_harmless() {
        let store = MemoryStore::new();
        assert!(store.delete(&Uuid::new_v4()).unwrap().is_none());
    }

    fn scratch_file() -> PathBuf {
        std::env::temp_dir()
            .join(format!("tocsin-store-{}", Uuid::new_v4()))
            .join("alarms.toml")
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).unwrap();
        }
    }

    #[test]
    fn toml_store_survives_a_reopen() {
        let path = scratch_file();
        let mut record = alarm("dentist", 9);
        record.note = Some("bring the forms".to_string());
        record.is_repeating = true;
        let kept = alarm("standup", 10);
        {
            let store = TomlStore::open(&path).unwrap();
            store.insert(record.clone()).unwrap();
            store.insert(kept.clone()).unwrap();
            store.delete(&kept.id).unwrap();
            store.insert(kept.clone()).unwrap();
        }
        let reopened = TomlStore::open(&path).unwrap();
        assert_eq!(reopened.fetch(&record.id).unwrap(), Some(record));
        assert_eq!(reopened.list_ordered_by_time().unwrap().len(), 2);
        cleanup(&path);
    }

    #[test]
    fn changes_made_through_another_handle_are_seen() {
        let path = scratch_file();
        let record = alarm("dentist", 9);
        let daemon = TomlStore::open(&path).unwrap();
        let start = daemon.revision().unwrap();
        daemon.insert(record.clone()).unwrap();
        assert_eq!(daemon.revision().unwrap(), start);

        let cli = TomlStore::open(&path).unwrap();
        assert_eq!(cli.delete(&record.id).unwrap(), Some(record.clone()));
        assert_eq!(daemon.fetch(&record.id).unwrap(), None);
        let after_delete = daemon.revision().unwrap();
        assert!(after_delete > start);

        let added = alarm("standup", 10);
        cli.insert(added.clone()).unwrap();
        assert!(daemon.revision().unwrap() > after_delete);
        assert_eq!(daemon.list_ordered_by_time().unwrap(), [added]);
        cleanup(&path);
    }

    #[test]
    fn failed_writes_leave_memory_matching_the_file() {
        let path = scratch_file();
        let store = TomlStore::open(&path).unwrap();
        let mut record = alarm("dentist", 9);
        store.insert(record.clone()).unwrap();

        // the temporary file can't be written while a directory sits in its place
        std::fs::create_dir_all(store.temp_path()).unwrap();

        assert!(matches!(
            store.delete(&record.id),
            Err(StoreError::Io { .. })
        ));
        assert_eq!(store.fetch(&record.id).unwrap(), Some(record.clone()));

        let original = record.clone();
        record.title = "orthodontist".to_string();
        assert!(store.insert(record.clone()).is_err());
        assert_eq!(store.fetch(&record.id).unwrap(), Some(original));

        let fresh = alarm("standup", 10);
        assert!(store.insert(fresh.clone()).is_err());
        assert_eq!(store.fetch(&fresh.id).unwrap(), None);
        assert_eq!(store.list_ordered_by_time().unwrap().len(), 1);
        cleanup(&path);
    }
}
