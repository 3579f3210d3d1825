//! Stop signal and the global stop-key listener.
//! The sampling loop polls `StopSignal` once per iteration; an rdev listener
//! thread raises it when the configured key is pressed.

use anyhow::{bail, Context, Result};
use rdev::{listen, Event, EventType, Key};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub fn parse_key(s: &str) -> Option<Key> {
    match s.to_uppercase().as_str() {
        "F1" => Some(Key::F1),
        "F2" => Some(Key::F2),
        "F3" => Some(Key::F3),
        "F4" => Some(Key::F4),
        "F5" => Some(Key::F5),
        "F6" => Some(Key::F6),
        "F7" => Some(Key::F7),
        "F8" => Some(Key::F8),
        "F9" => Some(Key::F9),
        "F10" => Some(Key::F10),
        "F11" => Some(Key::F11),
        "F12" => Some(Key::F12),
        "ESC" | "ESCAPE" => Some(Key::Escape),
        "PAUSE" | "BREAK" => Some(Key::Pause),
        "SCROLLLOCK" | "SCROLL_LOCK" | "SCROLL" => Some(Key::ScrollLock),
        "END" => Some(Key::End),
        "Q" => Some(Key::KeyQ),
        _ => None,
    }
}

/// How long a listener has to fail before it counts as running. Backends
/// that cannot hook the keyboard (missing permissions, Wayland) fail at once.
const LISTENER_GRACE: Duration = Duration::from_millis(250);

/// Spawns a detached thread that raises `signal` when `key_name` is pressed.
/// Errors if the listener cannot start.
pub fn spawn_stop_listener(key_name: &str, signal: StopSignal) -> Result<()> {
    let Some(stop_key) = parse_key(key_name) else {
        bail!("Unknown stop key '{key_name}'");
    };

    start_listener(stop_key, signal, listen::<Box<dyn FnMut(Event)>>)?;
    info!(key = key_name, "press the stop key to quit");
    Ok(())
}

fn start_listener<L, E>(stop_key: Key, signal: StopSignal, listen_with: L) -> Result<()>
where
    L: FnOnce(Box<dyn FnMut(Event)>) -> Result<(), E> + Send + 'static,
    E: fmt::Debug,
{
    let (done_tx, done_rx) = mpsc::channel();

    std::thread::Builder::new()
        .name("stop-key".into())
        .spawn(move || {
            let pressed = signal.clone();
            let callback = move |event: Event| {
                if let EventType::KeyPress(key) = event.event_type {
                    if key == stop_key && !pressed.is_stopped() {
                        info!("stop key pressed");
                        pressed.request_stop();
                    }
                }
            };
            let outcome = listen_with(Box::new(callback)).map_err(|e| format!("{e:?}"));
            match &outcome {
                Err(e) => error!(error = %e, "stop key listener failed, stopping"),
                Ok(()) => warn!("stop key listener exited, stopping"),
            }
            // Nothing else can stop the loop once the listener is gone.
            signal.request_stop();
            let _ = done_tx.send(outcome);
        })
        .context("Failed to spawn stop key listener thread")?;

    match done_rx.recv_timeout(LISTENER_GRACE) {
        Err(RecvTimeoutError::Timeout) => Ok(()),
        Ok(Err(e)) => bail!("Stop key listener failed to start: {e}"),
        Ok(Ok(())) => bail!("Stop key listener exited immediately"),
        Err(RecvTimeoutError::Disconnected) => bail!("Stop key listener thread died"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Instant, SystemTime};

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("F12"), Some(Key::F12));
        assert_eq!(parse_key("esc"), Some(Key::Escape));
        assert_eq!(parse_key("q"), Some(Key::KeyQ));
        assert_eq!(parse_key("HYPER"), None);
    }

    #[test]
    fn test_stop_signal_shared_between_clones() {
        let signal = StopSignal::new();
        let remote = signal.clone();
        assert!(!signal.is_stopped());
        remote.request_stop();
        assert!(signal.is_stopped());
    }

    #[test]
    fn test_unknown_stop_key_is_rejected() {
        assert!(spawn_stop_listener("HYPER", StopSignal::new()).is_err());
    }

    fn key_press(key: Key) -> Event {
        Event {
            time: SystemTime::now(),
            name: None,
            event_type: EventType::KeyPress(key),
        }
    }

    #[test]
    fn test_listener_start_failure_is_reported_and_stops() {
        let signal = StopSignal::new();
        let result = start_listener(Key::F12, signal.clone(), |_callback| {
            Err::<(), _>("accessibility permission denied")
        });

        let err = result.unwrap_err();
        assert!(err.to_string().contains("accessibility permission denied"));
        assert!(signal.is_stopped());
    }

    #[test]
    fn test_listener_raises_signal_on_stop_key_only() {
        let signal = StopSignal::new();
        let (events, feed) = mpsc::channel::<Event>();
        start_listener(Key::F12, signal.clone(), move |mut callback| {
            for event in feed {
                callback(event);
            }
            Ok::<(), String>(())
        })
        .unwrap();
        assert!(!signal.is_stopped());

        events.send(key_press(Key::KeyQ)).unwrap();
        events.send(key_press(Key::F12)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !signal.is_stopped() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(signal.is_stopped());
    }

    #[test]
    fn test_listener_exit_after_start_stops() {
        let signal = StopSignal::new();
        let (events, feed) = mpsc::channel::<Event>();
        start_listener(Key::F12, signal.clone(), move |_callback| {
            // Runs until the sender hangs up, then reports an error.
            let _ = feed.recv();
            Err::<(), _>("device disconnected")
        })
        .unwrap();

        drop(events);
        let deadline = Instant::now() + Duration::from_secs(2);
        while !signal.is_stopped() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(signal.is_stopped());
    }
}
