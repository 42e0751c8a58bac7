//! What gets handed to the delivery substrate when an alarm is scheduled.

use std::{collections::BTreeMap, fmt};

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use thiserror::Error;
use uuid::Uuid;

use crate::alarm::AlarmRecord;

/// key under which the alarm id travels in a [`CorrelationPayload`]
pub const ALARM_ID_KEY: &str = "alarm_id";

/// calendar fields a trigger matches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerSpec {
    /// fires once at exactly this date and time
    Once {
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    },
    /// fires every day at this time of day
    Daily { hour: u32, minute: u32, second: u32 },
}

impl TriggerSpec {
    /// one-shot alarms keep the whole timestamp, repeating ones only the time of day
    #[must_use]
    pub fn for_alarm(alarm: &AlarmRecord) -> Self {
        let at = alarm.scheduled_time;
        if alarm.is_repeating {
            Self::Daily {
                hour: at.hour(),
                minute: at.minute(),
                second: at.second(),
            }
        } else {
            Self::Once {
                year: at.year(),
                month: at.month(),
                day: at.day(),
                hour: at.hour(),
                minute: at.minute(),
                second: at.second(),
            }
        }
    }

    #[must_use]
    pub const fn repeats(&self) -> bool {
        matches!(self, Self::Daily { .. })
    }

    #[must_use]
    pub fn time_of_day(&self) -> Option<NaiveTime> {
        match *self {
            Self::Once {
                hour,
                minute,
                second,
                ..
            }
            | Self::Daily {
                hour,
                minute,
                second,
            } => NaiveTime::from_hms_opt(hour, minute, second),
        }
    }

    /// the first moment strictly after `now` this trigger matches, if any
    #[must_use]
    pub fn next_fire_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let time = self.time_of_day()?;
        match *self {
            Self::Once {
                year, month, day, ..
            } => NaiveDate::from_ymd_opt(year, month, day)
                .map(|date| date.and_time(time))
                .filter(|at| *at > now),
            Self::Daily { .. } => {
                let today = now.date().and_time(time);
                if today > now {
                    Some(today)
                } else {
                    now.date()
                        .checked_add_days(Days::new(1))
                        .map(|date| date.and_time(time))
                }
            }
        }
    }
}

impl fmt::Display for TriggerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Once {
                year,
                month,
                day,
                hour,
                minute,
                second,
            } => write!(
                f,
                "once at {year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
            ),
            Self::Daily {
                hour,
                minute,
                second,
            } => write!(f, "daily at {hour:02}:{minute:02}:{second:02}"),
        }
    }
}

/// how loudly the substrate may interrupt the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptionLevel {
    #[default]
    Active,
    /// breaks through silent and do-not-disturb modes
    Critical,
}

impl From<bool> for InterruptionLevel {
    fn from(is_critical: bool) -> Self {
        if is_critical {
            Self::Critical
        } else {
            Self::Active
        }
    }
}

/// data attached to a trigger and handed back verbatim when it fires
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CorrelationPayload(BTreeMap<String, String>);

impl CorrelationPayload {
    #[must_use]
    pub fn for_alarm(id: Uuid) -> Self {
        let mut payload = Self::default();
        payload.insert(ALARM_ID_KEY, id.to_string());
        payload
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// the raw alarm id, not yet validated
    #[must_use]
    pub fn alarm_id(&self) -> Option<&str> {
        self.get(ALARM_ID_KEY)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CorrelationPayload {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// everything the substrate needs to deliver one alarm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRequest {
    pub id: Uuid,
    pub spec: TriggerSpec,
    pub repeats: bool,
    pub priority: InterruptionLevel,
    pub title: String,
    pub body: String,
    /// for substrates that ring natively
    pub sound_name: String,
    pub payload: CorrelationPayload,
}

impl TriggerRequest {
    #[must_use]
    pub fn for_alarm(alarm: &AlarmRecord) -> Self {
        let spec = TriggerSpec::for_alarm(alarm);
        Self {
            id: alarm.id,
            spec,
            repeats: spec.repeats(),
            priority: alarm.is_critical.into(),
            title: alarm.title.clone(),
            body: alarm.body().to_string(),
            sound_name: alarm.sound_name.clone(),
            payload: CorrelationPayload::for_alarm(alarm.id),
        }
    }
}

/// receipt for a live registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerHandle {
    pub id: Uuid,
    pub spec: TriggerSpec,
    /// when the substrate expects to fire it next
    pub next_fire: Option<NaiveDateTime>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubstrateError {
    #[error("{0} will never fire")]
    NeverFires(TriggerSpec),
    #[error("too many pending triggers (limit is {limit})")]
    TooManyPending { limit: usize },
    #[error("delivery has shut down")]
    Closed,
    #[error("registration rejected: {0}")]
    Rejected(String),
}

/// whatever fires timers and shows banners on our behalf
///
/// registrations are keyed by alarm id, registering an id again replaces it.
pub trait DeliverySubstrate: Send + Sync {
    fn register_trigger(&self, request: TriggerRequest) -> Result<TriggerHandle, SubstrateError>;
    /// unknown ids are ignored
    fn cancel_trigger(&self, id: Uuid);
    fn cancel_all_triggers(&self);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::alarm::AlarmDraft;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .and_then(|date| date.and_hms_opt(h, mi, s))
            .unwrap()
    }

    fn alarm(when: NaiveDateTime, repeating: bool) -> AlarmRecord {
        AlarmDraft {
            title: "t".to_string(),
            is_repeating: repeating,
            ..AlarmDraft::at(when)
        }
        .build()
        .unwrap()
    }

    #[test]
    fn one_shot_specs_keep_the_full_date() {
        let spec = TriggerSpec::for_alarm(&alarm(at(2026, 11, 2, 7, 15, 30), false));
        assert_eq!(
            spec,
            TriggerSpec::Once {
                year: 2026,
                month: 11,
                day: 2,
                hour: 7,
                minute: 15,
                second: 30
            }
        );
        assert!(!spec.repeats());
    }

    #[test]
    fn repeating_specs_only_keep_the_time_of_day() {
        let first = TriggerSpec::for_alarm(&alarm(at(2026, 11, 2, 7, 0, 0), true));
        let second = TriggerSpec::for_alarm(&alarm(at(2031, 1, 9, 7, 0, 0), true));
        assert_eq!(first, second);
        assert_eq!(
            first,
            TriggerSpec::Daily {
                hour: 7,
                minute: 0,
                second: 0
            }
        );
        assert!(first.repeats());
    }

    #[test]
    fn daily_specs_roll_over_to_tomorrow() {
        let spec = TriggerSpec::Daily {
            hour: 7,
            minute: 0,
            second: 0,
        };
        let now = at(2026, 12, 31, 8, 0, 0);
        assert_eq!(spec.next_fire_after(now), Some(at(2027, 1, 1, 7, 0, 0)));
        let early = at(2026, 12, 31, 6, 0, 0);
        assert_eq!(spec.next_fire_after(early), Some(at(2026, 12, 31, 7, 0, 0)));
        // exactly on time counts as already fired
        assert_eq!(
            spec.next_fire_after(at(2026, 12, 31, 7, 0, 0)),
            Some(at(2027, 1, 1, 7, 0, 0))
        );
    }

    #[test]
    fn one_shot_specs_never_fire_in_the_past() {
        let spec = TriggerSpec::for_alarm(&alarm(at(2026, 1, 1, 0, 0, 0), false));
        assert_eq!(spec.next_fire_after(at(2026, 6, 1, 0, 0, 0)), None);
        assert_eq!(
            spec.next_fire_after(at(2025, 6, 1, 0, 0, 0)),
            Some(at(2026, 1, 1, 0, 0, 0))
        );
    }

    #[test]
    fn requests_carry_the_alarm_id_and_priority() {
        let mut record = alarm(at(2026, 11, 2, 7, 0, 0), false);
        record.is_critical = true;
        let request = TriggerRequest::for_alarm(&record);
        assert_eq!(request.payload.alarm_id(), Some(record.id.to_string().as_str()));
        assert_eq!(request.priority, InterruptionLevel::Critical);
        assert_eq!(request.body, "Scheduled Alarm");
        assert!(!request.repeats);
    }
}
