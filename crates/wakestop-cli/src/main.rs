mod console;
mod enrich;
mod source;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use wakestop_alarm::audio::AudioOutput;
use wakestop_alarm::{strings, AlarmConfig, AlarmLoop, ConsoleSink, VibrationPattern};
use wakestop_nav::detector::{evaluate, ArmState, DetectorInput, Evaluation};
use wakestop_nav::gnss::{Fix, PositionError};
use wakestop_nav::session::{SessionStatus, TripSession};
use wakestop_nav::snooze::SnoozeCountdown;
use wakestop_nav::watch::{WatchEvent, WatchSlot};
use wakestop_nav::doctor as nav_doctor;
use wakestop_proto::telemetry::{EventKind, TelemetryEvent};
use wakestop_proto::{AlarmSettings, AlertType, Coordinate, Destination, Language};
use wakestop_store::{doctor as store_doctor, Trip, TripBook};

use console::UserCommand;
use enrich::EnrichmentSlot;
use source::{Reconnect, Source};

#[derive(Debug, Parser)]
#[command(name = "wakestop", version, about = "wakestop - wake me before my stop")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Doctor,
    /// Track a destination and ring when it is near.
    Run(DestArgs),
    /// Distance, ETA and trigger decision for a single position.
    Check {
        #[arg(long, allow_hyphen_values = true)]
        from_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        from_lng: f64,
        #[command(flatten)]
        dest: DestArgs,
    },
    History,
    Favorites { #[command(subcommand)] cmd: FavCmd },
}

#[derive(Debug, Subcommand)]
enum FavCmd {
    List,
    /// Save a destination with the alarm settings from the config file.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
    Remove { #[arg(long)] name: String },
}

#[derive(Debug, Args)]
struct DestArgs {
    /// Use a saved favorite, including its alarm settings.
    #[arg(long, conflicts_with_all = ["name", "lat", "lng"])]
    favorite: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    lng: Option<f64>,
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    alarm: AlarmCfg,
    #[serde(default)]
    eta: EtaCfg,
    gnss: GnssCfg,
    #[serde(default)]
    ui: UiCfg,
    store: StoreCfg,
}

#[derive(Debug, serde::Deserialize)]
struct AlarmCfg {
    #[serde(flatten)]
    settings: AlarmSettings,
    vibration_pattern_ms: Option<VibrationPattern>,
    repeat_interval_ms: Option<u64>,
    #[serde(default = "default_snooze_s")]
    snooze_s: u64,
}

fn default_snooze_s() -> u64 {
    300
}

#[derive(Debug, serde::Deserialize)]
struct EtaCfg {
    avg_speed_kmh: f64,
}

impl Default for EtaCfg {
    fn default() -> Self {
        Self { avg_speed_kmh: wakestop_nav::eta::DEFAULT_AVG_SPEED_KMH }
    }
}

#[derive(Debug, serde::Deserialize)]
struct GnssCfg {
    source: String,
    nmea_device: Option<String>,
    nmea_file: Option<String>,
    baud: Option<u32>,
    sample_timeout_s: Option<u64>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct UiCfg {
    #[serde(default)]
    language: Language,
}

#[derive(Debug, serde::Deserialize)]
struct StoreCfg {
    path: String,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    parse_config(&s)
}

fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Run(args) => run(&cfg, args).await?,
        Command::Check { from_lat, from_lng, dest } => check(&cfg, Coordinate::new(from_lat, from_lng), dest).await?,
        Command::History => history(&cfg).await?,
        Command::Favorites { cmd } => favorites(&cfg, cmd).await?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    nav_doctor::check_alarm_settings(&cfg.alarm.settings)?;
    nav_doctor::check_eta(cfg.eta.avg_speed_kmh)?;
    nav_doctor::check_sample_timeout(sample_timeout(&cfg.gnss).as_secs())?;
    Source::from_cfg(&cfg.gnss)?;
    if let Some(ms) = cfg.alarm.repeat_interval_ms {
        anyhow::ensure!(ms >= 250, "alarm.repeat_interval_ms too small; set >= 250");
    }
    store_doctor::check_store(&PathBuf::from(&cfg.store.path))?;

    info!("doctor: OK");
    Ok(())
}

fn sample_timeout(g: &GnssCfg) -> Duration {
    g.sample_timeout_s.map(Duration::from_secs).unwrap_or(wakestop_nav::gnss::DEFAULT_SAMPLE_TIMEOUT)
}

fn alarm_config(cfg: &Config) -> AlarmConfig {
    let mut out = AlarmConfig { language: cfg.ui.language, ..AlarmConfig::default() };
    if let Some(ms) = cfg.alarm.repeat_interval_ms {
        out.repeat_interval = Duration::from_millis(ms);
    }
    if let Some(p) = &cfg.alarm.vibration_pattern_ms {
        out.vibration = p.clone();
    }
    out
}

fn resolve_destination(args: &DestArgs, book: &TripBook, defaults: &AlarmSettings) -> Result<(Destination, AlarmSettings)> {
    if let Some(name) = &args.favorite {
        let fav = book.favorite(name).with_context(|| format!("no favorite named {:?}", name))?;
        return Ok((fav.destination.clone(), fav.settings.clone()));
    }
    let lat = args.lat.context("--lat missing (or use --favorite)")?;
    let lng = args.lng.context("--lng missing (or use --favorite)")?;
    let name = args.name.clone().unwrap_or_else(|| format!("{:.5}, {:.5}", lat, lng));
    Ok((Destination::new(name, Coordinate::new(lat, lng)), defaults.clone()))
}

async fn run(cfg: &Config, args: DestArgs) -> Result<()> {
    info!("run: starting");

    let lang = cfg.ui.language;
    let store_path = PathBuf::from(&cfg.store.path);
    let mut book = TripBook::load(&store_path).await?;
    let (dest, settings) = resolve_destination(&args, &book, &cfg.alarm.settings)?;
    nav_doctor::check_destination(&dest)?;
    if let Err(e) = nav_doctor::check_alarm_settings(&settings) {
        warn!("run: {:#}", e);
    }

    let mut session = TripSession::new(cfg.eta.avg_speed_kmh);
    session.begin_search()?;
    let mut enrich = EnrichmentSlot::new();
    let mut enrich_rx = enrich.subscribe();
    enrich.request(&dest, history_note(book.history.clone(), dest.name.clone()));

    let source = Source::from_cfg(&cfg.gnss)?;
    session.start(dest.clone(), settings.clone())?;
    let started_ms = now_ms();

    // starting a trip is the user gesture that unlocks audio
    if let Err(e) = AudioOutput::global().resume() {
        debug!("run: audio output not available: {:#}", e);
    }

    let (tx, mut samples) = mpsc::channel(32);
    let mut watch = WatchSlot::default();
    let mut reconnect = Reconnect::new(source, sample_timeout(&cfg.gnss));
    let mut alarm = AlarmLoop::new(Arc::new(ConsoleSink), alarm_config(cfg));
    let mut countdown = SnoozeCountdown::new();
    let mut countdown_rx = countdown.subscribe();
    let mut commands = console::spawn_reader();
    let mut arrived_ms = None;

    eprintln!("Tracking {}. Commands: s [secs] | d | c | ?", dest.name);

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(reconnect.retry_at()), if !watch.is_active() => {
                if let Err(err) = reconnect.connect(&mut watch, &tx).await {
                    report_position_error(&mut session, err, lang);
                }
            }
            _ = watch.ended() => debug!("run: position source ended, resubscribing"),
            Some(ev) = samples.recv() => match ev {
                WatchEvent::Fix(fix) => {
                    reconnect.healthy();
                    let now = OffsetDateTime::now_utc();
                    let out = session.on_fix(&fix, now);
                    let Some(eval) = out.evaluation else { continue };
                    let kind = if out.fired { EventKind::Arrived } else { EventKind::Tracking };
                    emit(&fix_event(kind, &fix, &eval, session.status(now).snooze_remaining_s));
                    if out.fired {
                        arrived_ms = Some(now_ms());
                        countdown.stop();
                        alarm.announce(&dest.name, eval.distance_m, eval.eta_min);
                        alarm.start(session.settings());
                    }
                }
                WatchEvent::Error(err) => report_position_error(&mut session, err, lang),
            },
            Some(cmd) = commands.recv() => {
                let now = OffsetDateTime::now_utc();
                match cmd {
                    UserCommand::Snooze(secs) => {
                        let secs = secs.unwrap_or(cfg.alarm.snooze_s);
                        match session.snooze(now, secs) {
                            Ok(_) => {
                                countdown.start(session.snooze_remaining(now));
                                emit(&TelemetryEvent::note(now_ms(), EventKind::Snoozed, format!("snoozed {}s", secs)));
                            }
                            Err(e) => eprintln!("{}", e),
                        }
                    }
                    UserCommand::Dismiss => match session.dismiss() {
                        Ok(()) => {
                            emit(&TelemetryEvent::note(now_ms(), EventKind::Dismissed, "alarm dismissed"));
                            break;
                        }
                        Err(e) => eprintln!("{}", e),
                    },
                    UserCommand::Cancel => {
                        session.cancel();
                        emit(&TelemetryEvent::note(now_ms(), EventKind::Cancelled, "trip cancelled"));
                        break;
                    }
                    UserCommand::Status => print_status(&session.status(now), lang),
                }
            }
            Ok(()) = countdown_rx.changed() => {
                let left = *countdown_rx.borrow_and_update();
                if left > 0 {
                    eprintln!("{}", strings::snoozed(lang, left));
                }
            }
            Ok(()) = enrich_rx.changed() => {
                if let Some(e) = enrich_rx.borrow_and_update().clone() {
                    eprintln!("{}", e.text);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                session.cancel();
                emit(&TelemetryEvent::note(now_ms(), EventKind::Cancelled, "interrupted"));
                break;
            }
        }
    }

    teardown(&mut watch, &mut alarm, &mut countdown, &mut enrich).await;

    book.record(Trip { destination: dest, settings, started_unix_ms: started_ms, arrived_unix_ms: arrived_ms });
    book.save(&store_path).await?;
    info!("run: done");
    Ok(())
}

/// Stops ringing and unsubscribes from the position source.
async fn teardown(watch: &mut WatchSlot, alarm: &mut AlarmLoop, countdown: &mut SnoozeCountdown, enrich: &mut EnrichmentSlot) {
    watch.clear().await;
    let rings = alarm.stop().await;
    countdown.stop();
    enrich.cancel();
    debug!("run: torn down after {} rings", rings);
}

/// Shows a position error once per run of identical failures.
fn report_position_error(session: &mut TripSession, err: PositionError, lang: Language) {
    let repeated = session.last_error() == Some(err);
    session.on_position_error(err);
    if !repeated {
        eprintln!("{}", strings::position_error(lang, err));
        emit(&TelemetryEvent::note(now_ms(), EventKind::PositionError, err.to_string()));
    }
}

async fn history_note(history: Vec<Trip>, name: String) -> Result<String> {
    let last = history
        .into_iter()
        .find(|t| t.destination.name == name)
        .context("no earlier trip to this destination")?;
    let unit = match last.settings.alert_type {
        AlertType::Distance => "m",
        AlertType::Time => "min",
    };
    let outcome = if last.arrived_unix_ms.is_some() { "woke you up" } else { "was cancelled" };
    Ok(format!("{}: last trip ({} {} alert) {}", name, last.settings.threshold, unit, outcome))
}

async fn check(cfg: &Config, from: Coordinate, args: DestArgs) -> Result<()> {
    let book = TripBook::load(&PathBuf::from(&cfg.store.path)).await?;
    let (dest, settings) = resolve_destination(&args, &book, &cfg.alarm.settings)?;
    let eval = evaluate(&DetectorInput {
        position: from,
        destination: dest.at,
        settings: &settings,
        avg_speed_kmh: cfg.eta.avg_speed_kmh,
        now: OffsetDateTime::now_utc(),
        snooze_until: None,
        arm: ArmState::Armed,
    })?;
    println!("destination={}", dest.name);
    println!("distance_m={:.1}", eval.distance_m);
    println!("eta_min={}", eval.eta_min);
    println!("would_fire={}", eval.should_fire);
    Ok(())
}

async fn history(cfg: &Config) -> Result<()> {
    let book = TripBook::load(&PathBuf::from(&cfg.store.path)).await?;
    for t in &book.history {
        println!(
            "{} ({:.5}, {:.5}) started={} arrived={}",
            t.destination.name,
            t.destination.at.lat,
            t.destination.at.lng,
            t.started_unix_ms,
            t.arrived_unix_ms.map(|ms| ms.to_string()).unwrap_or_else(|| "-".to_string())
        );
    }
    Ok(())
}

async fn favorites(cfg: &Config, cmd: FavCmd) -> Result<()> {
    let path = PathBuf::from(&cfg.store.path);
    let mut book = TripBook::load(&path).await?;
    match cmd {
        FavCmd::List => {
            for t in &book.favorites {
                println!(
                    "{} ({:.5}, {:.5}) {:?} {}",
                    t.destination.name, t.destination.at.lat, t.destination.at.lng, t.settings.alert_type, t.settings.threshold
                );
            }
        }
        FavCmd::Add { name, lat, lng } => {
            let destination = Destination::new(name, Coordinate::new(lat, lng));
            nav_doctor::check_destination(&destination)?;
            book.add_favorite(Trip {
                destination,
                settings: cfg.alarm.settings.clone(),
                started_unix_ms: now_ms(),
                arrived_unix_ms: None,
            });
            book.save(&path).await?;
        }
        FavCmd::Remove { name } => {
            anyhow::ensure!(book.remove_favorite(&name), "no favorite named {:?}", name);
            book.save(&path).await?;
        }
    }
    Ok(())
}

fn fix_event(kind: EventKind, fix: &Fix, eval: &Evaluation, snooze_remaining_s: u64) -> TelemetryEvent {
    let msg = if eval.snoozed {
        "snoozed".to_string()
    } else if eval.condition_met {
        "within threshold".to_string()
    } else {
        "approaching".to_string()
    };
    TelemetryEvent {
        ts_unix_ms: now_ms(),
        kind,
        lat: Some(fix.at.lat),
        lng: Some(fix.at.lng),
        accuracy_m: fix.accuracy_m,
        distance_m: Some(eval.distance_m),
        eta_min: Some(eval.eta_min),
        snooze_remaining_s,
        msg,
    }
}

fn print_status(st: &SessionStatus, lang: Language) {
    eprintln!("mode={:?} arm={:?}", st.mode, st.arm);
    if let Some(d) = &st.destination {
        eprintln!("destination={}", d.name);
    }
    match st.last {
        Some(e) => eprintln!("distance={} eta={}min", strings::format_distance(e.distance_m), e.eta_min),
        None => eprintln!("no position yet"),
    }
    if let Some(err) = st.last_error {
        eprintln!("{}", strings::position_error(lang, err));
    }
    if st.snooze_remaining_s > 0 {
        eprintln!("{}", strings::snoozed(lang, st.snooze_remaining_s));
    }
}

fn emit(ev: &TelemetryEvent) {
    match serde_json::to_string(ev) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!("telemetry encode failed: {}", e),
    }
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
