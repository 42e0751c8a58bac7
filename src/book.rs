use std::{fmt, sync::Arc};

use chrono::{Local, NaiveDateTime};
use log::{info, warn};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    alarm::AlarmRecord,
    scheduler::{SchedulingError, TriggerScheduler},
    store::{AlarmStore, StoreError},
    trigger::{TriggerHandle, TriggerSpec},
};

#[derive(Error, Debug)]
pub enum BookError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
}

/// the alarm list: every change to the store is paired with the matching scheduler call
#[derive(Clone)]
pub struct AlarmBook {
    store: Arc<dyn AlarmStore>,
    scheduler: TriggerScheduler,
}

impl fmt::Debug for AlarmBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlarmBook").finish_non_exhaustive()
    }
}

impl AlarmBook {
    #[must_use]
    pub fn new(store: Arc<dyn AlarmStore>, scheduler: TriggerScheduler) -> Self {
        Self { store, scheduler }
    }

    /// saves a new alarm and schedules it. an alarm whose time has passed is still
    /// saved, it just gets no trigger (`Ok(None)`).
    ///
    /// # Errors
    /// if the store fails or the substrate rejects the trigger
    pub fn add(&self, record: AlarmRecord) -> Result<Option<TriggerHandle>, BookError> {
        self.add_at(record, Local::now().naive_local())
    }

    /// # Errors
    /// see [`AlarmBook::add`]
    pub fn add_at(
        &self,
        record: AlarmRecord,
        now: NaiveDateTime,
    ) -> Result<Option<TriggerHandle>, BookError> {
        self.store.insert(record.clone())?;
        info!("added alarm {record}");
        schedule(&self.scheduler, &record, now)
    }

    /// swaps in an edited alarm, its old trigger never outlives the edit
    ///
    /// # Errors
    /// see [`AlarmBook::add`]
    pub fn replace(&self, record: AlarmRecord) -> Result<Option<TriggerHandle>, BookError> {
        self.replace_at(record, Local::now().naive_local())
    }

    /// # Errors
    /// see [`AlarmBook::add`]
    pub fn replace_at(
        &self,
        record: AlarmRecord,
        now: NaiveDateTime,
    ) -> Result<Option<TriggerHandle>, BookError> {
        self.scheduler.cancel(record.id);
        self.store.insert(record.clone())?;
        info!("updated alarm {record}");
        schedule(&self.scheduler, &record, now)
    }

    /// cancels the alarm's trigger, then deletes it
    ///
    /// # Errors
    /// if the store fails, the trigger is cancelled regardless
    pub fn remove(&self, id: Uuid) -> Result<Option<AlarmRecord>, BookError> {
        self.scheduler.cancel(id);
        let removed = self.store.delete(&id)?;
        match &removed {
            Some(record) => info!("removed alarm {record}"),
            None => warn!("no alarm {id} to remove"),
        }
        Ok(removed)
    }

    /// # Errors
    /// if the store fails part way, some alarms may then remain
    pub fn clear(&self) -> Result<usize, BookError> {
        self.scheduler.cancel_all();
        let alarms = self.store.list_ordered_by_time()?;
        for alarm in &alarms {
            self.store.delete(&alarm.id)?;
        }
        Ok(alarms.len())
    }

    /// # Errors
    /// if the store can't be read
    pub fn list(&self) -> Result<Vec<AlarmRecord>, BookError> {
        Ok(self.store.list_ordered_by_time()?)
    }

    /// registers every stored alarm again, e.g. after a restart lost the triggers.
    /// repeating alarms count from their next occurrence, so they survive a restart
    /// long after they were first set.
    /// returns how many got a trigger, alarms that can't be scheduled are logged and skipped.
    ///
    /// # Errors
    /// if the store can't be read
    pub fn rearm_all(&self, now: NaiveDateTime) -> Result<usize, BookError> {
        let mut armed = 0;
        for mut alarm in self.store.list_ordered_by_time()? {
            if alarm.is_repeating {
                if let Some(next) = TriggerSpec::for_alarm(&alarm).next_fire_after(now) {
                    alarm.scheduled_time = next;
                }
            }
            match self.scheduler.register_at(&alarm, now) {
                Ok(_) => armed += 1,
                Err(SchedulingError::AlreadyElapsed { .. }) => {}
                Err(e) => warn!("skipping {}: {e}", alarm.title),
            }
        }
        info!("re-armed {armed} alarms");
        Ok(armed)
    }

    /// drops every trigger and re-arms from the store, for when the alarms were
    /// changed by someone who couldn't reach this book's scheduler
    ///
    /// # Errors
    /// if the store can't be read, no triggers are left armed then
    pub fn resync(&self, now: NaiveDateTime) -> Result<usize, BookError> {
        self.scheduler.cancel_all();
        self.rearm_all(now)
    }
}

fn schedule(
    scheduler: &TriggerScheduler,
    record: &AlarmRecord,
    now: NaiveDateTime,
) -> Result<Option<TriggerHandle>, BookError> {
    match scheduler.register_at(record, now) {
        Ok(handle) => Ok(Some(handle)),
        Err(SchedulingError::AlreadyElapsed { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
