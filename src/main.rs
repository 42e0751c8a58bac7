use std::{
    error::Error,
    io::{self, BufRead},
    sync::{mpsc, Arc},
    thread,
    time::Duration,
};

use chrono::Local;
use clap::{command, Parser, Subcommand};
use log::{info, warn};
use tocsin::{
    alarm::{parse_when, sample_alarms, ActionType, AlarmCategory, AlarmDraft, AlarmRecord},
    audio::SilentBackend,
    book::AlarmBook,
    communication::DeliveryEvent,
    config::Config,
    coordinator::AlarmCoordinator,
    playback::{AudioBackend, PlaybackController, StopOutcome},
    resolver::TriggerResolver,
    scheduler::TriggerScheduler,
    sound::SoundResolver,
    store::TomlStore,
    timer::TimerSubstrate,
};
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// write the default config and create the sounds directory
    Init {
        #[clap(long, short)]
        force: bool,
    },
    Add {
        title: String,
        /// `YYYY-MM-DD HH:MM[:SS]` or `HH:MM[:SS]`, defaults to an hour from now
        #[clap(long, short)]
        at: Option<String>,
        #[clap(long, short)]
        note: Option<String>,
        #[clap(long, short, default_value = "custom")]
        category: AlarmCategory,
        #[clap(long)]
        critical: bool,
        /// ring every day at the same time
        #[clap(long, short)]
        repeat: bool,
        #[clap(long)]
        snooze: bool,
        #[clap(long, short)]
        sound: Option<String>,
        #[clap(long, default_value = "none")]
        action: ActionType,
        #[clap(long)]
        target: Option<String>,
    },
    /// a critical alarm for the start of tomorrow
    Quick {
        title: String,
    },
    List,
    Remove {
        id: Uuid,
    },
    Clear,
    /// add a few alarms due in the next minutes
    Demo,
    /// ring alarms as they come due (the default)
    Run,
}

fn main() -> Result<(), Box<dyn Error>> {
    // initilize the logger
    simple_file_logger::init_logger!("tocsin").expect("couldn't initialize logger");

    let args = Args::parse();
    let config = Config::load_or_default(&Config::config_path()?)?;
    let now = Local::now().naive_local();
    match args.command.unwrap_or(Command::Run) {
        Command::Init { force } => init(force)?,
        Command::Add {
            title,
            at,
            note,
            category,
            critical,
            repeat,
            snooze,
            sound,
            action,
            target,
        } => {
            let scheduled_time = match at {
                Some(at) => {
                    parse_when(&at, now).ok_or_else(|| format!("couldn't parse time {at:?}"))?
                }
                None => AlarmDraft::new(now).scheduled_time,
            };
            let record = AlarmDraft {
                title,
                note: note.unwrap_or_default(),
                category,
                is_critical: critical,
                is_repeating: repeat,
                is_snooze_enabled: snooze,
                sound_name: sound.unwrap_or_else(|| config.default_sound.clone()),
                quick_action: action,
                quick_action_target: target.unwrap_or_default(),
                ..AlarmDraft::at(scheduled_time)
            }
            .build()?;
            add(&open_book(&config)?, record)?;
        }
        Command::Quick { title } => {
            let record = AlarmDraft {
                title,
                ..AlarmDraft::quick(now)
            }
            .build()?;
            add(&open_book(&config)?, record)?;
        }
        Command::List => {
            for alarm in open_book(&config)?.list()? {
                println!("{alarm}");
            }
        }
        Command::Remove { id } => match open_book(&config)?.remove(id)? {
            Some(alarm) => println!("removed {alarm}"),
            None => println!("no alarm with id {id}"),
        },
        Command::Clear => println!("removed {} alarms", open_book(&config)?.clear()?),
        Command::Demo => {
            let book = open_book(&config)?;
            for alarm in sample_alarms(now) {
                add(&book, alarm)?;
            }
        }
        Command::Run => run(&config)?,
    }
    Ok(())
}

fn init(force: bool) -> Result<(), Box<dyn Error>> {
    if force || !Config::is_config_present() {
        let path = Config::config_path()?;
        Config::new().save(&path)?;
        println!("wrote {}", path.display());
    }
    let sounds = Config::sounds_path()?;
    std::fs::create_dir_all(&sounds)?;
    println!("put your .mp3 alarm sounds in {}", sounds.display());
    Ok(())
}

/// the alarm book on top of the alarm file.
/// triggers registered here are only checked, a running daemon notices the file
/// changed and re-arms from it
fn open_book(config: &Config) -> Result<AlarmBook, Box<dyn Error>> {
    let store = Arc::new(TomlStore::open(Config::alarms_path()?)?);
    let (sender, _) = mpsc::channel::<DeliveryEvent>();
    let timer = TimerSubstrate::new(sender, config.max_pending);
    Ok(AlarmBook::new(store, TriggerScheduler::new(Arc::new(timer))))
}

fn add(book: &AlarmBook, alarm: AlarmRecord) -> Result<(), Box<dyn Error>> {
    let scheduled = book.add(alarm.clone())?;
    println!("added {alarm}");
    if scheduled.is_none() {
        println!("its time has already passed, it won't ring");
    }
    Ok(())
}

#[cfg(feature = "rodio")]
fn audio_backend() -> Box<dyn AudioBackend> {
    match tocsin::audio::RodioBackend::open() {
        Ok(backend) => Box::new(backend),
        Err(e) => {
            log::error!("no audio output, alarms will be silent: {e}");
            Box::new(SilentBackend::default())
        }
    }
}

#[cfg(not(feature = "rodio"))]
fn audio_backend() -> Box<dyn AudioBackend> {
    Box::new(SilentBackend::default())
}

/// re-arms whenever another `tocsin` process (`add`, `remove`, ...) changed the alarm file
fn watch_alarms(
    store: Arc<TomlStore>,
    book: AlarmBook,
    mut seen: u64,
    interval: Duration,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("tocsin-watch".to_string())
        .spawn(move || loop {
            thread::sleep(interval);
            match store.revision() {
                Ok(revision) if revision != seen => {
                    seen = revision;
                    info!("alarm file changed, re-arming");
                    if let Err(e) = book.resync(Local::now().naive_local()) {
                        warn!("couldn't re-arm alarms: {e}");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("couldn't reread alarms: {e}"),
            }
        })
}

fn run(config: &Config) -> Result<(), Box<dyn Error>> {
    let store = Arc::new(TomlStore::open(Config::alarms_path()?)?);
    let sounds = SoundResolver::new(Arc::new(config.catalog()?), config.default_sound.clone());
    let playback = Arc::new(PlaybackController::new(sounds, audio_backend()));
    let coordinator = AlarmCoordinator::new(TriggerResolver::new(store.clone()), playback);

    let (sender, receiver) = mpsc::channel();
    let timer = TimerSubstrate::new(sender, config.max_pending);
    let book = AlarmBook::new(store.clone(), TriggerScheduler::new(Arc::new(timer.clone())));
    let seen = store.revision()?;
    let armed = book.rearm_all(Local::now().naive_local())?;
    println!("{armed} alarms armed, press enter to stop a ringing alarm, q to quit");

    {
        let coordinator = coordinator.clone();
        thread::Builder::new()
            .name("tocsin-coordinator".to_string())
            .spawn(move || coordinator.run(&receiver))?;
    }
    timer.spawn_ticker(config.tick_interval())?;
    watch_alarms(store, book, seen, config.tick_interval())?;

    for line in io::stdin().lock().lines() {
        match line?.trim() {
            "q" | "quit" => break,
            _ => match coordinator.dismiss() {
                StopOutcome::Stopped => println!("stopped"),
                StopOutcome::NothingToStop => {}
            },
        }
    }
    info!("shutting down");
    Ok(())
}
