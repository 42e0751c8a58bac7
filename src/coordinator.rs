use std::sync::{mpsc::Receiver, Arc};

use log::{error, info, warn};

use crate::{
    communication::{DeliveryEvent, PresentationOptions, ResponseAction},
    playback::{PlaybackController, StopOutcome},
    resolver::TriggerResolver,
    trigger::CorrelationPayload,
};

/// reacts to delivered alarms by ringing the right sound.
///
/// nothing here returns an error: a fired alarm has nobody to report to,
/// so failures are logged and the event is dropped.
#[derive(Debug, Clone)]
pub struct AlarmCoordinator {
    resolver: TriggerResolver,
    playback: Arc<PlaybackController>,
}

impl AlarmCoordinator {
    #[must_use]
    pub fn new(resolver: TriggerResolver, playback: Arc<PlaybackController>) -> Self {
        Self { resolver, playback }
    }

    #[must_use]
    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    /// handles one event, returning how to present it if the substrate asked
    pub fn on_delivery_event(&self, event: &DeliveryEvent) -> Option<PresentationOptions> {
        match event {
            DeliveryEvent::WillPresent(payload) => Some(self.will_present(payload)),
            DeliveryEvent::DidRespond { payload, action } => {
                self.did_respond(payload, action);
                None
            }
        }
    }

    pub fn will_present(&self, payload: &CorrelationPayload) -> PresentationOptions {
        self.ring(payload);
        PresentationOptions::BANNER
    }

    pub fn did_respond(&self, payload: &CorrelationPayload, action: &ResponseAction) {
        // every response rings, even `Dismiss`; stopping the sound is `dismiss()`'s job
        self.ring(payload);
        info!(
            "user {action} alarm {}",
            payload.alarm_id().unwrap_or("<unknown>")
        );
    }

    /// stops the ringing alarm on behalf of whoever shows the dismiss button
    pub fn dismiss(&self) -> StopOutcome {
        self.playback.stop()
    }

    fn ring(&self, payload: &CorrelationPayload) {
        let resolved = match self.resolver.resolve(payload) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("not ringing: {e}");
                return;
            }
        };
        if let Err(e) = self.playback.start(&resolved.sound_name) {
            error!("alarm {} fired without sound: {e}", resolved.id);
        }
    }

    /// handles events until every sender is gone
    pub fn run(&self, events: &Receiver<DeliveryEvent>) {
        for event in events {
            if let Some(options) = self.on_delivery_event(&event) {
                info!("presenting with {options:?}");
            }
        }
        info!("delivery channel closed, coordinator stopping");
    }
}
