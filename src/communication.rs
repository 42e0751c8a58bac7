use std::fmt;

use crate::trigger::CorrelationPayload;

/// what the user did with a delivered alarm
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseAction {
    /// tapped the banner
    Default,
    Dismiss,
    Custom(String),
}

impl fmt::Display for ResponseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("tapped"),
            Self::Dismiss => f.write_str("dismissed"),
            Self::Custom(action) => write!(f, "custom action {action}"),
        }
    }
}

/// events the delivery substrate sends the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryEvent {
    /// an alarm is about to be shown
    WillPresent(CorrelationPayload),
    /// the user interacted with a shown alarm
    DidRespond {
        payload: CorrelationPayload,
        action: ResponseAction,
    },
}

impl DeliveryEvent {
    #[must_use]
    pub const fn payload(&self) -> &CorrelationPayload {
        match self {
            Self::WillPresent(payload) | Self::DidRespond { payload, .. } => payload,
        }
    }
}

/// how a delivered alarm may present itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresentationOptions {
    pub banner: bool,
    pub sound: bool,
    pub badge: bool,
}

impl PresentationOptions {
    /// the sound comes from our own playback, so the substrate only shows the banner
    pub const BANNER: Self = Self {
        banner: true,
        sound: false,
        badge: false,
    };
}
