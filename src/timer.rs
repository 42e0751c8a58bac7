//! An in-process [`DeliverySubstrate`]: a ticker thread that fires triggers when they come due.

use std::{
    collections::HashMap,
    sync::{mpsc::Sender, Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::Duration,
};

use chrono::{Local, NaiveDateTime};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::{
    communication::DeliveryEvent,
    trigger::{DeliverySubstrate, InterruptionLevel, SubstrateError, TriggerHandle, TriggerRequest},
};

/// how many triggers may be pending at once unless configured otherwise
pub const DEFAULT_MAX_PENDING: usize = 64;

#[derive(Debug, Clone)]
struct Pending {
    request: TriggerRequest,
    due: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct TimerSubstrate {
    pending: Arc<Mutex<HashMap<Uuid, Pending>>>,
    events: Sender<DeliveryEvent>,
    max_pending: usize,
}

impl TimerSubstrate {
    #[must_use]
    pub fn new(events: Sender<DeliveryEvent>, max_pending: usize) -> Self {
        Self {
            pending: Arc::default(),
            events,
            max_pending,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// registrations ordered by when they fire next
    #[must_use]
    pub fn pending(&self) -> Vec<(NaiveDateTime, TriggerRequest)> {
        let mut pending: Vec<_> = self
            .lock()
            .values()
            .map(|pending| (pending.due, pending.request.clone()))
            .collect();
        pending.sort_by_key(|(due, request)| (*due, request.id));
        pending
    }

    /// registers `request` as if the clock read `now`
    ///
    /// # Errors
    /// if the trigger can never fire after `now` or too many triggers are pending
    pub fn register_at(
        &self,
        request: TriggerRequest,
        now: NaiveDateTime,
    ) -> Result<TriggerHandle, SubstrateError> {
        let due = request
            .spec
            .next_fire_after(now)
            .ok_or(SubstrateError::NeverFires(request.spec))?;
        let mut pending = self.lock();
        if !pending.contains_key(&request.id) && pending.len() >= self.max_pending {
            return Err(SubstrateError::TooManyPending {
                limit: self.max_pending,
            });
        }
        let handle = TriggerHandle {
            id: request.id,
            spec: request.spec,
            next_fire: Some(due),
        };
        debug!("trigger {} due at {due}", request.id);
        pending.insert(request.id, Pending { request, due });
        Ok(handle)
    }

    /// fires everything due at `now`, returning how many fired
    ///
    /// # Errors
    /// [`SubstrateError::Closed`] once nobody listens for events anymore
    pub fn tick(&self, now: NaiveDateTime) -> Result<usize, SubstrateError> {
        let due: Vec<TriggerRequest> = {
            let mut pending = self.lock();
            let ids: Vec<Uuid> = pending
                .values()
                .filter(|pending| pending.due <= now)
                .map(|pending| pending.request.id)
                .collect();
            ids.into_iter()
                .filter_map(|id| {
                    let entry = pending.remove(&id)?;
                    if entry.request.repeats {
                        match entry.request.spec.next_fire_after(now) {
                            Some(next) => {
                                pending.insert(
                                    id,
                                    Pending {
                                        request: entry.request.clone(),
                                        due: next,
                                    },
                                );
                            }
                            None => warn!("repeating trigger {id} has no next occurrence"),
                        }
                    }
                    Some(entry.request)
                })
                .collect()
        };

        for request in &due {
            present_banner(request);
            self.events
                .send(DeliveryEvent::WillPresent(request.payload.clone()))
                .map_err(|_| SubstrateError::Closed)?;
        }
        Ok(due.len())
    }

    /// ticks every `interval` on a background thread until the event receiver is dropped
    ///
    /// # Errors
    /// if the thread couldn't be spawned
    pub fn spawn_ticker(&self, interval: Duration) -> std::io::Result<thread::JoinHandle<()>> {
        let substrate = self.clone();
        thread::Builder::new()
            .name("tocsin-timer".to_string())
            .spawn(move || loop {
                thread::sleep(interval);
                if substrate.tick(Local::now().naive_local()).is_err() {
                    info!("nobody is listening for alarms anymore, timer stopping");
                    break;
                }
            })
    }
}

/// the substrate's own banner, shown whether or not a sound plays
fn present_banner(request: &TriggerRequest) {
    let marker = match request.priority {
        InterruptionLevel::Critical => "!!",
        InterruptionLevel::Active => "",
    };
    println!("⏰{marker} {}: {}", request.title, request.body);
    info!("presented banner for {} ({})", request.title, request.id);
}

impl DeliverySubstrate for TimerSubstrate {
    fn register_trigger(&self, request: TriggerRequest) -> Result<TriggerHandle, SubstrateError> {
        self.register_at(request, Local::now().naive_local())
    }

    fn cancel_trigger(&self, id: Uuid) {
        if self.lock().remove(&id).is_some() {
            debug!("cancelled trigger {id}");
        }
    }

    fn cancel_all_triggers(&self) {
        self.lock().clear();
    }
}
