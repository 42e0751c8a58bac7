use std::{fmt, str::FromStr};

use chrono::{Days, Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{sound::DEFAULT_SOUND, store::GetId};

/// represents an alarm
/// contains the time that the alarm should go off at,
/// how it should be delivered and which sound to ring with.
///
/// records are only ever replaced as a whole, so every edit goes back through the scheduler.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AlarmRecord {
    pub id: Uuid,
    /// for repeating alarms only the time of day is used
    #[serde(with = "toml_datetime_compat")]
    pub scheduled_time: NaiveDateTime,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub category: AlarmCategory,
    #[serde(default)]
    pub is_critical: bool,
    #[serde(default)]
    pub is_repeating: bool,
    // TODO: re-arm a short one-shot trigger on dismiss once a snooze interval is decided
    #[serde(default)]
    pub is_snooze_enabled: bool,
    #[serde(default = "default_sound_name")]
    pub sound_name: String,
    #[serde(default)]
    pub quick_action: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_action_target: Option<String>,
}

fn default_sound_name() -> String {
    DEFAULT_SOUND.to_string()
}

impl GetId<Uuid> for AlarmRecord {
    fn get_id(&self) -> &Uuid {
        &self.id
    }
}

impl AlarmRecord {
    #[must_use]
    pub fn time_of_day(&self) -> NaiveTime {
        self.scheduled_time.time()
    }

    /// body shown with the banner
    #[must_use]
    pub fn body(&self) -> &str {
        self.note.as_deref().unwrap_or("Scheduled Alarm")
    }
}

impl fmt::Display for AlarmRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let when = if self.is_repeating {
            format!("daily at {}", self.time_of_day().format("%H:%M:%S"))
        } else {
            self.scheduled_time.format("%Y-%m-%d %H:%M:%S").to_string()
        };
        write!(f, "{} [{}] {} ({when}", self.id, self.category, self.title)?;
        if self.is_critical {
            write!(f, ", critical")?;
        }
        write!(f, ", sound: {})", self.sound_name)
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmCategory {
    Travel,
    Bills,
    Messages,
    Health,
    Study,
    Project,
    #[default]
    Custom,
}

impl AlarmCategory {
    pub const ALL: [Self; 7] = [
        Self::Travel,
        Self::Bills,
        Self::Messages,
        Self::Health,
        Self::Study,
        Self::Project,
        Self::Custom,
    ];
}

impl fmt::Display for AlarmCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Travel => stringify!(Travel),
                Self::Bills => stringify!(Bills),
                Self::Messages => stringify!(Messages),
                Self::Health => stringify!(Health),
                Self::Study => stringify!(Study),
                Self::Project => stringify!(Project),
                Self::Custom => stringify!(Custom),
            }
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseKindError {
    #[error("unknown category: {0}")]
    Category(String),
    #[error("unknown quick action: {0}")]
    Action(String),
}

impl FromStr for AlarmCategory {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseKindError::Category(s.to_string()))
    }
}

/// what tapping the alarm should lead to, dispatched outside of the trigger/playback path
#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "Open URL")]
    OpenUrl,
    #[serde(rename = "Open Contact")]
    OpenContact,
    #[serde(rename = "Open App")]
    OpenApp,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::OpenUrl => "Open URL",
            Self::OpenContact => "Open Contact",
            Self::OpenApp => "Open App",
        })
    }
}

impl FromStr for ActionType {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // accept both the display form and a cli friendly one ("open-url")
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "none" => Ok(Self::None),
            "open url" => Ok(Self::OpenUrl),
            "open contact" => Ok(Self::OpenContact),
            "open app" => Ok(Self::OpenApp),
            _ => Err(ParseKindError::Action(s.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DraftError {
    #[error("an alarm needs a title")]
    EmptyTitle,
}

/// editor state for a new alarm, turned into an [`AlarmRecord`] by [`AlarmDraft::build`]
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmDraft {
    pub scheduled_time: NaiveDateTime,
    pub title: String,
    pub note: String,
    pub category: AlarmCategory,
    pub is_critical: bool,
    pub is_repeating: bool,
    pub is_snooze_enabled: bool,
    pub sound_name: String,
    pub quick_action: ActionType,
    pub quick_action_target: String,
}

impl AlarmDraft {
    /// a blank draft one hour from `now`
    #[must_use]
    pub fn new(now: NaiveDateTime) -> Self {
        Self::at(now + Duration::hours(1))
    }

    #[must_use]
    pub fn at(scheduled_time: NaiveDateTime) -> Self {
        Self {
            scheduled_time,
            title: String::new(),
            note: String::new(),
            category: AlarmCategory::Custom,
            is_critical: false,
            is_repeating: false,
            is_snooze_enabled: false,
            sound_name: default_sound_name(),
            quick_action: ActionType::None,
            quick_action_target: String::new(),
        }
    }

    /// quick alarms go off at the start of tomorrow and are critical with snooze on
    #[must_use]
    pub fn quick(now: NaiveDateTime) -> Self {
        let tomorrow = now
            .date()
            .checked_add_days(Days::new(1))
            .unwrap_or_else(|| now.date());
        Self {
            is_critical: true,
            is_snooze_enabled: true,
            ..Self::at(tomorrow.and_time(NaiveTime::MIN))
        }
    }

    #[must_use]
    pub fn is_title_valid(&self) -> bool {
        !self.title.trim().is_empty()
    }

    /// # Errors
    /// if the title is empty after trimming
    pub fn build(self) -> Result<AlarmRecord, DraftError> {
        if !self.is_title_valid() {
            return Err(DraftError::EmptyTitle);
        }
        Ok(AlarmRecord {
            id: Uuid::new_v4(),
            scheduled_time: self.scheduled_time,
            title: self.title.trim().to_string(),
            note: non_empty(&self.note),
            category: self.category,
            is_critical: self.is_critical,
            is_repeating: self.is_repeating,
            is_snooze_enabled: self.is_snooze_enabled,
            sound_name: if self.sound_name.trim().is_empty() {
                default_sound_name()
            } else {
                self.sound_name
            },
            quick_action: self.quick_action,
            quick_action_target: non_empty(&self.quick_action_target),
        })
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// a handful of alarms a few minutes out, handy to see the whole firing path work
#[must_use]
pub fn sample_alarms(now: NaiveDateTime) -> Vec<AlarmRecord> {
    let drafts = [
        AlarmDraft {
            title: "Flight to India".to_string(),
            note: "Don't forget your passport and boarding pass".to_string(),
            category: AlarmCategory::Travel,
            is_critical: true,
            sound_name: "india".to_string(),
            quick_action: ActionType::OpenUrl,
            quick_action_target: "https://www.airindia.in/".to_string(),
            ..AlarmDraft::at(now + Duration::minutes(1))
        },
        AlarmDraft {
            title: "Credit card payments".to_string(),
            note: "Must pay by end of the month".to_string(),
            category: AlarmCategory::Bills,
            is_critical: true,
            is_repeating: true,
            is_snooze_enabled: true,
            sound_name: "clock".to_string(),
            ..AlarmDraft::at(now + Duration::minutes(3))
        },
        AlarmDraft {
            title: "Stand up Call".to_string(),
            note: "Week day 10:00 - 10:20 CST".to_string(),
            category: AlarmCategory::Project,
            is_critical: true,
            is_repeating: true,
            sound_name: "alarm".to_string(),
            quick_action: ActionType::OpenApp,
            quick_action_target: "Zoom".to_string(),
            ..AlarmDraft::at(now + Duration::minutes(2))
        },
    ];
    drafts
        .into_iter()
        .filter_map(|draft| draft.build().ok())
        .collect()
}

/// parses either a full `YYYY-MM-DD HH:MM[:SS]` or a bare `HH:MM[:SS]`,
/// the latter meaning its next occurrence after `now`
#[must_use]
pub fn parse_when(input: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let input = input.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(when) = NaiveDateTime::parse_from_str(input, format) {
            return Some(when);
        }
    }
    let time = NaiveTime::parse_from_str(input, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M"))
        .ok()?;
    let today = now.date().and_time(time);
    if today > now {
        Some(today)
    } else {
        now.date()
            .checked_add_days(Days::new(1))
            .map(|date| date.and_time(time))
    }
}
