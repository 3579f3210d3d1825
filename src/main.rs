use anyhow::{anyhow, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::env;
use std::time::Duration;
use tracing::info;

use bobber_rs::audio::{AudioSource, MicrophoneSource};
use bobber_rs::capture::{CaptureSource, ScreenCapture};
use bobber_rs::clock::SystemClock;
use bobber_rs::config::{Config, DetectionMode, Region};
use bobber_rs::hotkey::{spawn_stop_listener, StopSignal};
use bobber_rs::input::EnigoExecutor;
use bobber_rs::logging;
use bobber_rs::overlay::{DebugDisplay, FrameDumpDisplay};
use bobber_rs::session::{Sensors, Session};

fn cli() -> Command {
    Command::new("bobber-rs")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Watches the fishing bobber by screen and/or sound and reels in on a bite")
        .arg(
            Arg::new("mode")
                .long("mode")
                .help("Detectors to use")
                .default_value("combined")
                .value_parser(["combined", "audio", "motion"]),
        )
        .arg(Arg::new("top").long("top").default_value("180").value_parser(value_parser!(i32)))
        .arg(Arg::new("left").long("left").default_value("4600").value_parser(value_parser!(i32)))
        .arg(Arg::new("width").long("width").default_value("2600").value_parser(value_parser!(u32)))
        .arg(Arg::new("height").long("height").default_value("800").value_parser(value_parser!(u32)))
        .arg(
            Arg::new("sample-rate")
                .long("sample-rate")
                .help("Audio sample rate (Hz)")
                .default_value("44100")
                .value_parser(value_parser!(u32)),
        )
        .arg(seconds("block", "Audio block duration", "0.1"))
        .arg(
            Arg::new("threshold")
                .long("threshold")
                .help("Spike when RMS exceeds baseline by this factor")
                .default_value("2.0")
                .value_parser(value_parser!(f32)),
        )
        .arg(
            Arg::new("alpha")
                .long("alpha")
                .help("Baseline smoothing factor, closer to 1 adapts slower")
                .default_value("0.98")
                .value_parser(value_parser!(f32)),
        )
        .arg(seconds("cooldown", "Minimum spacing between recognized events", "2.0"))
        .arg(seconds("debounce", "Minimum spacing between actions", "2.0"))
        .arg(seconds("watchdog", "Force a recast after this long without action", "30.0"))
        .arg(seconds("settle", "Wait after recasting before detecting again", "5.0"))
        .arg(seconds("startup-delay", "Wait before the first sample", "5.0"))
        .arg(
            Arg::new("min-area")
                .long("min-area")
                .help("Smallest motion blob in pixels")
                .default_value("1500")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("recast-key")
                .long("recast-key")
                .default_value("1")
                .value_parser(value_parser!(char)),
        )
        .arg(
            Arg::new("stop-key")
                .long("stop-key")
                .help("Global key that stops the bot")
                .default_value("F12"),
        )
        .arg(
            Arg::new("debug-frames")
                .long("debug-frames")
                .help("Write annotated frames to screenshots/ (also enabled by DEBUG_CAPTURE)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("debug-every")
                .long("debug-every")
                .help("Iterations between debug frames")
                .default_value("10")
                .value_parser(value_parser!(u32)),
        )
        .arg(Arg::new("log-level").long("log-level").default_value("info"))
        .arg(Arg::new("log-json").long("log-json").action(ArgAction::SetTrue))
}

fn seconds(id: &'static str, help: &'static str, default: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .help(format!("{help} (seconds)"))
        .default_value(default)
        .value_parser(value_parser!(f64))
}

fn value<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> Result<T> {
    matches
        .get_one::<T>(id)
        .cloned()
        .with_context(|| format!("Missing --{id}"))
}

fn duration(matches: &ArgMatches, id: &str) -> Result<Duration> {
    let secs: f64 = value(matches, id)?;
    Duration::try_from_secs_f64(secs).with_context(|| format!("Invalid --{id} value {secs}"))
}

fn config_from(matches: &ArgMatches) -> Result<Config> {
    let mode_name: String = value(matches, "mode")?;
    let mode = DetectionMode::parse(&mode_name).ok_or_else(|| anyhow!("Unknown mode '{mode_name}'"))?;

    let mut config = Config {
        mode,
        region: Region {
            top: value(matches, "top")?,
            left: value(matches, "left")?,
            width: value(matches, "width")?,
            height: value(matches, "height")?,
        },
        sample_rate: value(matches, "sample-rate")?,
        block_duration: duration(matches, "block")?,
        spike_threshold: value(matches, "threshold")?,
        baseline_alpha: value(matches, "alpha")?,
        event_cooldown: duration(matches, "cooldown")?,
        action_debounce: duration(matches, "debounce")?,
        watchdog_timeout: duration(matches, "watchdog")?,
        settle: duration(matches, "settle")?,
        startup_delay: duration(matches, "startup-delay")?,
        recast_key: value(matches, "recast-key")?,
        stop_key: value(matches, "stop-key")?,
        ..Config::default()
    };
    config.motion.min_area = value(matches, "min-area")?;
    if matches.get_flag("debug-frames") || env::var_os("DEBUG_CAPTURE").is_some() {
        config.debug_every = Some(value(matches, "debug-every")?);
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    let level: String = value(&matches, "log-level")?;
    logging::init_logging(&level, matches.get_flag("log-json"));

    let mut config = config_from(&matches)?;
    info!(
        mode = %config.mode,
        sample_rate = config.sample_rate,
        block = ?config.block_duration,
        threshold = config.spike_threshold,
        "bobber-rs starting"
    );

    let capture: Option<Box<dyn CaptureSource>> = if config.mode.uses_vision() {
        Some(Box::new(ScreenCapture::for_region(&config.region)?))
    } else {
        None
    };
    let audio: Option<Box<dyn AudioSource>> = if config.mode.uses_audio() {
        let mic = MicrophoneSource::open_default(config.sample_rate)?;
        // Block length follows the rate the device actually delivers.
        config.sample_rate = mic.sample_rate();
        Some(Box::new(mic))
    } else {
        None
    };
    let executor = EnigoExecutor::new(config.recast_key)?;
    let display: Option<Box<dyn DebugDisplay>> = match config.debug_every {
        Some(every) => Some(Box::new(FrameDumpDisplay::new("screenshots", every)?)),
        None => None,
    };

    let stop = StopSignal::new();
    spawn_stop_listener(&config.stop_key, stop.clone())?;

    let mut session = Session::new(
        config,
        Sensors { capture, audio },
        Box::new(executor),
        display,
        SystemClock,
        stop,
    )?;
    session.run().context("Fishing session failed")?;
    Ok(())
}
