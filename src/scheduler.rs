use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use log::{error, info};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    alarm::AlarmRecord,
    trigger::{DeliverySubstrate, SubstrateError, TriggerHandle, TriggerRequest},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    /// the alarm's time is not in the future, nothing was registered
    #[error("alarm {id} was due at {scheduled_time}, which has already passed")]
    AlreadyElapsed {
        id: Uuid,
        scheduled_time: NaiveDateTime,
    },
    #[error("alarm {id} couldn't be scheduled: {source}")]
    Rejected { id: Uuid, source: SubstrateError },
}

/// turns alarms into triggers on a [`DeliverySubstrate`]
#[derive(Clone)]
pub struct TriggerScheduler {
    substrate: Arc<dyn DeliverySubstrate>,
}

impl TriggerScheduler {
    #[must_use]
    pub fn new(substrate: Arc<dyn DeliverySubstrate>) -> Self {
        Self { substrate }
    }

    /// # Errors
    /// see [`TriggerScheduler::register_at`]
    pub fn register(&self, alarm: &AlarmRecord) -> Result<TriggerHandle, SchedulingError> {
        self.register_at(alarm, Local::now().naive_local())
    }

    /// registers `alarm`, replacing whatever was registered for its id before
    ///
    /// # Errors
    /// [`SchedulingError::AlreadyElapsed`] if the alarm isn't after `now`,
    /// [`SchedulingError::Rejected`] if the substrate refuses it. neither is retried.
    pub fn register_at(
        &self,
        alarm: &AlarmRecord,
        now: NaiveDateTime,
    ) -> Result<TriggerHandle, SchedulingError> {
        if alarm.scheduled_time <= now {
            info!(
                "not scheduling {} ({}): {} has already passed",
                alarm.title, alarm.id, alarm.scheduled_time
            );
            return Err(SchedulingError::AlreadyElapsed {
                id: alarm.id,
                scheduled_time: alarm.scheduled_time,
            });
        }

        let request = TriggerRequest::for_alarm(alarm);
        let priority = request.priority;
        // only ever one live trigger per alarm
        self.substrate.cancel_trigger(alarm.id);
        match self.substrate.register_trigger(request) {
            Ok(handle) => {
                info!(
                    "scheduled {} ({}) {}, priority {priority:?}",
                    alarm.title, alarm.id, handle.spec
                );
                Ok(handle)
            }
            Err(source) => {
                error!("couldn't schedule {} ({}): {source}", alarm.title, alarm.id);
                Err(SchedulingError::Rejected {
                    id: alarm.id,
                    source,
                })
            }
        }
    }

    /// cancelling an alarm that has no trigger does nothing
    pub fn cancel(&self, id: Uuid) {
        info!("cancelling pending trigger for alarm {id}");
        self.substrate.cancel_trigger(id);
    }

    pub fn cancel_all(&self) {
        info!("cancelling all pending triggers");
        self.substrate.cancel_all_triggers();
    }
}
