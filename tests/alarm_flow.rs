use std::{
    collections::HashSet,
    path::PathBuf,
    sync::{mpsc, Arc, Mutex},
};

use chrono::{Duration, Local, NaiveDateTime, NaiveTime};
use tocsin::{
    alarm::{AlarmDraft, AlarmRecord},
    book::AlarmBook,
    communication::{DeliveryEvent, PresentationOptions},
    coordinator::AlarmCoordinator,
    playback::{
        AudioBackend, BackendError, PlaybackController, PlaybackState, Repeat, StopOutcome,
    },
    resolver::TriggerResolver,
    scheduler::TriggerScheduler,
    sound::{CatalogError, Sound, SoundCatalog, SoundResolver},
    store::{AlarmStore, MemoryStore, TomlStore},
    timer::{TimerSubstrate, DEFAULT_MAX_PENDING},
    trigger::CorrelationPayload,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Load(String, Repeat),
    Play,
    Stop,
}

#[derive(Debug, Clone, Default)]
struct FakeSpeaker(Arc<Mutex<Vec<Op>>>);

impl FakeSpeaker {
    fn ops(&self) -> Vec<Op> {
        self.0.lock().unwrap().clone()
    }
}

impl AudioBackend for FakeSpeaker {
    fn load(&mut self, sound: &Sound, repeat: Repeat) -> Result<(), BackendError> {
        self.0
            .lock()
            .unwrap()
            .push(Op::Load(sound.name().to_string(), repeat));
        Ok(())
    }

    fn play(&mut self) -> Result<(), BackendError> {
        self.0.lock().unwrap().push(Op::Play);
        Ok(())
    }

    fn stop(&mut self) {
        self.0.lock().unwrap().push(Op::Stop);
    }
}

struct Sounds(HashSet<&'static str>);

impl SoundCatalog for Sounds {
    fn exists(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    fn open(&self, name: &str) -> Result<Sound, CatalogError> {
        if self.exists(name) {
            Ok(Sound::new(name.to_string(), PathBuf::from(format!("{name}.mp3"))))
        } else {
            Err(CatalogError::NotFound(name.to_string()))
        }
    }
}

struct Daemon {
    book: AlarmBook,
    timer: TimerSubstrate,
    events: mpsc::Receiver<DeliveryEvent>,
    coordinator: AlarmCoordinator,
    speaker: FakeSpeaker,
}

impl Daemon {
    fn new(sounds: &[&'static str]) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), sounds)
    }

    fn with_store(store: Arc<dyn AlarmStore>, sounds: &[&'static str]) -> Self {
        let speaker = FakeSpeaker::default();
        let resolver = SoundResolver::new(
            Arc::new(Sounds(sounds.iter().copied().collect())),
            "india",
        );
        let playback = Arc::new(PlaybackController::new(
            resolver,
            Box::new(speaker.clone()),
        ));
        let (sender, events) = mpsc::channel();
        let timer = TimerSubstrate::new(sender, DEFAULT_MAX_PENDING);
        Self {
            book: AlarmBook::new(
                store.clone(),
                TriggerScheduler::new(Arc::new(timer.clone())),
            ),
            timer,
            events,
            coordinator: AlarmCoordinator::new(TriggerResolver::new(store), playback),
            speaker,
        }
    }

    /// fires everything due at `at` and lets the coordinator handle it
    fn fire(&self, at: NaiveDateTime) -> Vec<Option<PresentationOptions>> {
        self.timer.tick(at).unwrap();
        self.events
            .try_iter()
            .map(|event| self.coordinator.on_delivery_event(&event))
            .collect()
    }
}

fn alarm(title: &str, sound: &str, at: NaiveDateTime) -> AlarmRecord {
    AlarmDraft {
        title: title.to_string(),
        sound_name: sound.to_string(),
        ..AlarmDraft::at(at)
    }
    .build()
    .unwrap()
}

#[test]
fn deleted_alarms_never_ring() {
    let daemon = Daemon::new(&["clock", "india"]);
    let now = Local::now().naive_local();
    let record = alarm("dentist", "clock", now + Duration::hours(1));
    let handle = daemon.book.add_at(record.clone(), now).unwrap().unwrap();
    assert_eq!(daemon.book.remove(record.id).unwrap(), Some(record.clone()));

    let due = handle.next_fire.unwrap();
    assert!(daemon.fire(due).is_empty());

    // a delivery already in flight when the alarm was deleted changes nothing either
    let late = DeliveryEvent::WillPresent(CorrelationPayload::for_alarm(record.id));
    assert_eq!(
        daemon.coordinator.on_delivery_event(&late),
        Some(PresentationOptions::BANNER)
    );
    assert_eq!(daemon.coordinator.playback().state(), PlaybackState::Idle);
    assert!(daemon.speaker.ops().is_empty());
}

#[test]
fn a_daily_alarm_loops_until_dismissed() {
    let daemon = Daemon::new(&["alarm", "india"]);
    let now = Local::now().naive_local();
    let seven = NaiveTime::from_hms_opt(7, 0, 0).unwrap();
    let tomorrow = now.date().succ_opt().unwrap();
    let mut record = alarm("wake up", "alarm", tomorrow.and_time(seven));
    record.is_repeating = true;

    let handle = daemon.book.add_at(record.clone(), now).unwrap().unwrap();
    let due = handle.next_fire.unwrap();
    assert_eq!(due.time(), seven);
    assert!(due > now);
    assert_eq!(daemon.coordinator.playback().state(), PlaybackState::Idle);

    assert!(daemon.fire(due - Duration::seconds(1)).is_empty());
    assert_eq!(daemon.fire(due), [Some(PresentationOptions::BANNER)]);
    assert_eq!(daemon.coordinator.playback().state(), PlaybackState::Playing);
    assert_eq!(
        daemon.speaker.ops(),
        [Op::Load("alarm".to_string(), Repeat::Forever), Op::Play]
    );

    assert_eq!(daemon.coordinator.dismiss(), StopOutcome::Stopped);
    assert_eq!(daemon.coordinator.dismiss(), StopOutcome::NothingToStop);
    assert_eq!(daemon.coordinator.playback().state(), PlaybackState::Idle);

    // still armed for the next morning
    let pending = daemon.timer.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].0, due + Duration::days(1));
}

#[test]
fn the_latest_alarm_takes_over_and_missing_sounds_fall_back() {
    let daemon = Daemon::new(&["clock", "india"]);
    let now = Local::now().naive_local();
    let first = alarm("tea", "clock", now + Duration::minutes(5));
    let second = alarm("laundry", "rooster", now + Duration::minutes(10));
    daemon.book.add_at(first, now).unwrap();
    daemon.book.add_at(second, now).unwrap();

    daemon.fire(now + Duration::minutes(5));
    daemon.fire(now + Duration::minutes(10));

    assert_eq!(
        daemon.coordinator.playback().current_sound().unwrap().name(),
        "india"
    );
    assert_eq!(
        daemon.speaker.ops(),
        [
            Op::Load("clock".to_string(), Repeat::Forever),
            Op::Play,
            Op::Stop,
            Op::Load("india".to_string(), Repeat::Forever),
            Op::Play,
        ]
    );
    assert!(daemon.timer.pending().is_empty());
    assert_eq!(daemon.book.list().unwrap().len(), 2);
}

#[test]
fn edits_reach_the_alarm_when_it_fires() {
    let daemon = Daemon::new(&["clock", "alarm", "india"]);
    let now = Local::now().naive_local();
    let mut record = alarm("standup", "clock", now + Duration::minutes(30));
    daemon.book.add_at(record.clone(), now).unwrap();

    record.sound_name = "alarm".to_string();
    record.scheduled_time = now + Duration::minutes(45);
    daemon.book.replace_at(record, now).unwrap();

    assert!(daemon.fire(now + Duration::minutes(30)).is_empty());
    assert_eq!(daemon.fire(now + Duration::minutes(45)).len(), 1);
    assert_eq!(
        daemon.coordinator.playback().current_sound().unwrap().name(),
        "alarm"
    );
}

#[test]
fn alarms_removed_by_another_process_never_ring() {
    let dir = std::env::temp_dir().join(format!("tocsin-flow-{}", uuid::Uuid::new_v4()));
    let path = dir.join("alarms.toml");
    let daemon = Daemon::with_store(Arc::new(TomlStore::open(&path).unwrap()), &["clock"]);
    let now = Local::now().naive_local();
    let record = alarm("dentist", "clock", now + Duration::hours(1));
    daemon.book.add_at(record.clone(), now).unwrap();

    // `tocsin remove` works on its own handle to the same file
    let cli = TomlStore::open(&path).unwrap();
    cli.delete(&record.id).unwrap();

    assert_eq!(daemon.fire(now + Duration::hours(1)).len(), 1);
    assert_eq!(daemon.coordinator.playback().state(), PlaybackState::Idle);
    assert!(daemon.speaker.ops().is_empty());

    // and the daemon's book sees the file as it is now
    let added = alarm("standup", "clock", now + Duration::hours(2));
    cli.insert(added.clone()).unwrap();
    assert_eq!(daemon.book.resync(now).unwrap(), 1);
    assert_eq!(daemon.timer.pending()[0].1.id, added.id);
    std::fs::remove_dir_all(dir).unwrap();
}
