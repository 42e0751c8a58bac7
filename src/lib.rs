#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(clippy::use_self, rust_2018_idioms)]
#![allow(clippy::multiple_crate_versions, clippy::module_name_repetitions)]

//! Alarm scheduling with looping, preemptive playback.
//!
//! Alarms are kept in an [`store::AlarmStore`] and handed to a
//! [`trigger::DeliverySubstrate`] by the [`scheduler::TriggerScheduler`].
//! When a trigger fires, the [`coordinator::AlarmCoordinator`] looks the alarm
//! up again and rings its sound through the [`playback::PlaybackController`].

pub mod alarm;
pub mod audio;
pub mod book;
pub mod communication;
pub mod config;
pub mod coordinator;
pub mod playback;
pub mod resolver;
pub mod scheduler;
pub mod sound;
pub mod store;
pub mod timer;
pub mod trigger;
