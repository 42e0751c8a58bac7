//! Audio backends for the [`PlaybackController`](crate::playback::PlaybackController).

use log::info;

use crate::{
    playback::{AudioBackend, BackendError, Repeat},
    sound::Sound,
};

#[cfg(feature = "rodio")]
pub use self::rodio_output::RodioBackend;

/// used when built without audio output, alarms then only show up in the log
#[derive(Debug, Default)]
pub struct SilentBackend {
    loaded: Option<Sound>,
}

impl AudioBackend for SilentBackend {
    fn load(&mut self, sound: &Sound, repeat: Repeat) -> Result<(), BackendError> {
        info!("(silent) loaded {sound}, repeat {repeat:?}");
        self.loaded = Some(sound.clone());
        Ok(())
    }

    fn play(&mut self) -> Result<(), BackendError> {
        match &self.loaded {
            Some(sound) => {
                info!("(silent) ringing {sound}");
                Ok(())
            }
            None => Err(BackendError::Output("nothing loaded".to_string())),
        }
    }

    fn stop(&mut self) {
        if let Some(sound) = self.loaded.take() {
            info!("(silent) stopped {sound}");
        }
    }
}

#[cfg(feature = "rodio")]
mod rodio_output {
    use std::{fs::File, io::BufReader, sync::mpsc, thread};

    use log::{debug, error};
    use rodio::{Decoder, OutputStream, Sink, Source};

    use super::{AudioBackend, BackendError, Repeat, Sound};

    enum Command {
        Load {
            sound: Sound,
            repeat: Repeat,
            reply: mpsc::Sender<Result<(), BackendError>>,
        },
        Play,
        Stop,
    }

    /// plays through the default output device.
    ///
    /// the output stream lives on its own thread, this handle only sends it commands
    #[derive(Debug)]
    pub struct RodioBackend {
        commands: mpsc::Sender<Command>,
    }

    impl std::fmt::Debug for Command {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Load { sound, repeat, .. } => write!(f, "Load({sound}, {repeat:?})"),
                Self::Play => f.write_str("Play"),
                Self::Stop => f.write_str("Stop"),
            }
        }
    }

    impl RodioBackend {
        /// # Errors
        /// if there is no default output device
        pub fn open() -> Result<Self, BackendError> {
            let (commands, receiver) = mpsc::channel();
            let (ready_tx, ready_rx) = mpsc::channel();
            thread::Builder::new()
                .name("tocsin-audio".to_string())
                .spawn(move || {
                    let stream = match rodio::OutputStreamBuilder::open_default_stream() {
                        Ok(stream) => {
                            let _ = ready_tx.send(Ok(()));
                            stream
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(BackendError::Output(e.to_string())));
                            return;
                        }
                    };
                    run(&stream, &receiver);
                })
                .map_err(|e| BackendError::Output(e.to_string()))?;
            ready_rx.recv().map_err(|_| BackendError::Disconnected)??;
            Ok(Self { commands })
        }

        fn send(&self, command: Command) -> Result<(), BackendError> {
            self.commands
                .send(command)
                .map_err(|_| BackendError::Disconnected)
        }
    }

    fn run(stream: &OutputStream, commands: &mpsc::Receiver<Command>) {
        let mut sink: Option<Sink> = None;
        // ends once the backend handle is dropped
        for command in commands {
            debug!("audio thread got {command:?}");
            match command {
                Command::Load {
                    sound,
                    repeat,
                    reply,
                } => {
                    if let Some(old) = sink.take() {
                        old.stop();
                    }
                    let result = open_sink(stream, &sound, repeat).map(|new_sink| {
                        sink = Some(new_sink);
                    });
                    if let Err(e) = &result {
                        error!("{e}");
                    }
                    let _ = reply.send(result);
                }
                Command::Play => {
                    if let Some(sink) = &sink {
                        sink.play();
                    }
                }
                Command::Stop => {
                    if let Some(sink) = sink.take() {
                        sink.stop();
                    }
                }
            }
        }
    }

    fn open_sink(stream: &OutputStream, sound: &Sound, repeat: Repeat) -> Result<Sink, BackendError> {
        let decode_error = |reason: String| BackendError::Decode {
            sound: sound.name.clone(),
            reason,
        };
        let file = File::open(&sound.path).map_err(|e| decode_error(e.to_string()))?;
        let input = Decoder::new(BufReader::new(file)).map_err(|e| decode_error(e.to_string()))?;
        let sink = Sink::connect_new(stream.mixer());
        // loaded but silent until played
        sink.pause();
        match repeat {
            Repeat::Forever => sink.append(input.repeat_infinite()),
            Repeat::Once => sink.append(input),
        }
        Ok(sink)
    }

    impl AudioBackend for RodioBackend {
        fn load(&mut self, sound: &Sound, repeat: Repeat) -> Result<(), BackendError> {
            let (reply, result) = mpsc::channel();
            self.send(Command::Load {
                sound: sound.clone(),
                repeat,
                reply,
            })?;
            result.recv().map_err(|_| BackendError::Disconnected)?
        }

        fn play(&mut self) -> Result<(), BackendError> {
            self.send(Command::Play)
        }

        fn stop(&mut self) {
            if self.send(Command::Stop).is_err() {
                error!("audio thread is gone, nothing to stop");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn silent_backend_needs_something_loaded() {
        let mut backend = SilentBackend::default();
        assert!(backend.play().is_err());
        let sound = Sound::new("india".to_string(), PathBuf::from("india.mp3"));
        backend.load(&sound, Repeat::Forever).unwrap();
        backend.play().unwrap();
        backend.stop();
        assert!(backend.loaded.is_none());
    }
}
