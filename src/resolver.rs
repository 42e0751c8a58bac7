use std::{fmt, sync::Arc};

use log::{debug, warn};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    store::{AlarmStore, StoreError},
    trigger::CorrelationPayload,
};

/// what a fired trigger turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAlarm {
    pub id: Uuid,
    /// as stored, the sound resolver picks the actual file later
    pub sound_name: String,
}

#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("trigger payload has no usable alarm id ({0:?})")]
    MalformedPayload(Option<String>),
    #[error("alarm {0} no longer exists")]
    NotFound(Uuid),
    #[error("couldn't look up alarm {id}: {source}")]
    Store { id: Uuid, source: StoreError },
}

/// maps a fired trigger back to the alarm behind it, without ever writing to the store
#[derive(Clone)]
pub struct TriggerResolver {
    store: Arc<dyn AlarmStore>,
}

impl fmt::Debug for TriggerResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerResolver").finish_non_exhaustive()
    }
}

impl TriggerResolver {
    #[must_use]
    pub fn new(store: Arc<dyn AlarmStore>) -> Self {
        Self { store }
    }

    /// # Errors
    /// if the payload carries no valid id, the alarm is gone or the store can't be read
    pub fn resolve(&self, payload: &CorrelationPayload) -> Result<ResolvedAlarm, ResolutionError> {
        let raw = payload.alarm_id();
        let id = raw
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .ok_or_else(|| {
                warn!("couldn't extract an alarm id from trigger payload {payload:?}");
                ResolutionError::MalformedPayload(raw.map(ToString::to_string))
            })?;

        let alarm = self
            .store
            .fetch(&id)
            .map_err(|source| ResolutionError::Store { id, source })?
            .ok_or_else(|| {
                warn!("couldn't find alarm {id}, it was probably deleted after being scheduled");
                ResolutionError::NotFound(id)
            })?;

        debug!("trigger resolved to {} ({id})", alarm.title);
        Ok(ResolvedAlarm {
            id,
            sound_name: alarm.sound_name,
        })
    }
}
