//! The one audio output an alarm rings through.
//!
//! [`PlaybackController`] moves between [`PlaybackState::Idle`], [`PlaybackState::Loaded`]
//! and [`PlaybackState::Playing`]. Every transition happens under a single lock, and
//! [`PlaybackController::start`] always stops the current sound before loading the next
//! one, so two alarms can never ring over each other.

use std::{
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use log::{error, info, warn};
use thiserror::Error;

use crate::sound::{Sound, SoundError, SoundResolver};

/// how often a loaded sound repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Once,
    /// until stopped
    Forever,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("couldn't open audio output: {0}")]
    Output(String),
    #[error("couldn't decode {sound}: {reason}")]
    Decode { sound: String, reason: String },
    #[error("audio thread has stopped")]
    Disconnected,
}

/// the audio device, holding at most one sound at a time
pub trait AudioBackend: Send {
    /// prepares `sound` without starting it, dropping whatever was loaded before
    fn load(&mut self, sound: &Sound, repeat: Repeat) -> Result<(), BackendError>;
    fn play(&mut self) -> Result<(), BackendError>;
    /// halts and releases the loaded sound
    fn stop(&mut self);
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("couldn't load a sound: {0}")]
    LoadFailed(#[from] SoundError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loaded,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NothingToStop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Session {
    Idle,
    Loaded(Sound),
    Playing(Sound),
}

struct Inner {
    session: Session,
    backend: Box<dyn AudioBackend>,
}

pub struct PlaybackController {
    resolver: SoundResolver,
    inner: Mutex<Inner>,
}

impl fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackController")
            .field("resolver", &self.resolver)
            .field("session", &self.lock().session)
            .finish_non_exhaustive()
    }
}

impl PlaybackController {
    #[must_use]
    pub fn new(resolver: SoundResolver, backend: Box<dyn AudioBackend>) -> Self {
        Self {
            resolver,
            inner: Mutex::new(Inner {
                session: Session::Idle,
                backend,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// stops whatever is ringing, then loads and loops `sound_name` until [`stop`](Self::stop)
    ///
    /// # Errors
    /// if no sound could be loaded or the device refused to play it.
    /// the previous sound is stopped either way.
    pub fn start(&self, sound_name: &str) -> Result<(), PlaybackError> {
        let mut inner = self.lock();
        stop_session(&mut inner);
        load_session(&self.resolver, &mut inner, sound_name)?;
        let Session::Loaded(sound) = std::mem::replace(&mut inner.session, Session::Idle) else {
            return Ok(());
        };
        if let Err(e) = inner.backend.play() {
            error!("couldn't start playing {sound}: {e}");
            inner.backend.stop();
            return Err(e.into());
        }
        info!("alarm sound {} is playing", sound.name());
        inner.session = Session::Playing(sound);
        Ok(())
    }

    /// loads `sound_name` looping forever, without playing it yet.
    /// a sound that is already playing is stopped first.
    ///
    /// # Errors
    /// if neither the sound nor the default sound could be loaded, the controller is then idle
    pub fn load(&self, sound_name: &str) -> Result<(), PlaybackError> {
        let mut inner = self.lock();
        stop_session(&mut inner);
        load_session(&self.resolver, &mut inner, sound_name)
    }

    pub fn stop(&self) -> StopOutcome {
        let outcome = stop_session(&mut self.lock());
        if outcome == StopOutcome::NothingToStop {
            info!("alarm is not playing currently");
        }
        outcome
    }

    #[must_use]
    pub fn state(&self) -> PlaybackState {
        match self.lock().session {
            Session::Idle => PlaybackState::Idle,
            Session::Loaded(_) => PlaybackState::Loaded,
            Session::Playing(_) => PlaybackState::Playing,
        }
    }

    /// whether an alarm is ringing right now, i.e. whether there is anything to dismiss
    #[must_use]
    pub fn is_sounding(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    #[must_use]
    pub fn current_sound(&self) -> Option<Sound> {
        match &self.lock().session {
            Session::Idle => None,
            Session::Loaded(sound) | Session::Playing(sound) => Some(sound.clone()),
        }
    }
}

fn stop_session(inner: &mut Inner) -> StopOutcome {
    match std::mem::replace(&mut inner.session, Session::Idle) {
        Session::Playing(sound) => {
            inner.backend.stop();
            info!("stopped playing {}", sound.name());
            StopOutcome::Stopped
        }
        other => {
            inner.session = other;
            StopOutcome::NothingToStop
        }
    }
}

fn load_session(
    resolver: &SoundResolver,
    inner: &mut Inner,
    sound_name: &str,
) -> Result<(), PlaybackError> {
    if matches!(inner.session, Session::Loaded(_)) {
        inner.backend.stop();
    }
    inner.session = Session::Idle;
    let sound = resolver.resolve(sound_name).map_err(|e| {
        warn!("no sound to ring for {sound_name}: {e}");
        e
    })?;
    inner.backend.load(&sound, Repeat::Forever).map_err(|e| {
        error!("couldn't load {sound}: {e}");
        e
    })?;
    inner.session = Session::Loaded(sound);
    Ok(())
}
