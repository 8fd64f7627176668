//! Event types and the main event loop driver for the haze TUI.
//!
//! This module defines the [`Event`] enum (keyboard input, ticks and
//! pollution updates) and the [`EventHandler`], which runs a background task
//! that polls crossterm for key events and emits periodic [`Event::Tick`]s.
//! The main loop in `main.rs` receives events via [`EventHandler::next`] and
//! other tasks (e.g. the pollution poller) send events via [`EventHandler::tx`].

use crate::models::PollutionPoint;
use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::io;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::error;

/// Events processed by the application event loop.
pub enum Event {
    /// Periodic tick used for UI refresh.
    Tick,
    /// User key press from the terminal.
    Input(KeyEvent),
    /// New pollution data from the poller (or a failed fetch).
    PollutionUpdate {
        /// Real and interpolated points; empty on failure.
        points: Vec<PollutionPoint>,
        /// When this update was produced.
        timestamp: Instant,
        /// Whether the pipeline succeeded.
        is_success: bool,
    },
    /// The terminal stopped delivering input; the UI should shut down.
    InputClosed,
}

/// Multiplexes terminal input and ticks into a single event stream.
///
/// Holds an unbounded channel: the sender ([`tx`](EventHandler::tx)) can be
/// cloned and given to other tasks, while the receiver is consumed by
/// [`next`](EventHandler::next) in the main loop.
pub struct EventHandler {
    /// Sender for posting events (e.g. from the pollution poller).
    pub tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
    /// Creates a new event handler and spawns the input/tick task.
    ///
    /// The task polls crossterm with a timeout of `tick_rate_ms`, forwarding
    /// key presses as [`Event::Input`] and emitting [`Event::Tick`] whenever
    /// the interval elapses. If the terminal stops answering, the task logs
    /// the error and sends [`Event::InputClosed`] before exiting.
    pub fn new(tick_rate_ms: u64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let event_tx = tx.clone();

        tokio::task::spawn_blocking(move || {
            pump_input(
                |timeout| {
                    if event::poll(timeout)? {
                        event::read().map(Some)
                    } else {
                        Ok(None)
                    }
                },
                &event_tx,
                Duration::from_millis(tick_rate_ms),
            )
        });

        Self { tx, rx }
    }

    /// Receives the next event from the channel.
    ///
    /// Returns `None` when all senders have been dropped.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

/// Input loop body. `poll_event` waits up to the given timeout for one
/// terminal event. Returns once the receiver is gone or the terminal fails.
fn pump_input<P>(mut poll_event: P, tx: &mpsc::UnboundedSender<Event>, tick_rate: Duration)
where
    P: FnMut(Duration) -> io::Result<Option<CrosstermEvent>>,
{
    let mut last_tick = Instant::now();
    loop {
        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::from_secs(0));
        match poll_event(timeout) {
            Ok(Some(CrosstermEvent::Key(key))) if key.kind == KeyEventKind::Press => {
                if tx.send(Event::Input(key)).is_err() {
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!("Terminal input failed: {}", e);
                let _ = tx.send(Event::InputClosed);
                return;
            }
        }
        if last_tick.elapsed() >= tick_rate {
            if tx.send(Event::Tick).is_err() {
                return;
            }
            last_tick = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    #[test]
    fn terminal_failure_closes_input() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut polls = 0;
        pump_input(
            |_| {
                polls += 1;
                match polls {
                    1 => Ok(Some(CrosstermEvent::Key(KeyEvent::new(
                        KeyCode::Char('j'),
                        KeyModifiers::NONE,
                    )))),
                    _ => Err(io::Error::new(io::ErrorKind::BrokenPipe, "tty gone")),
                }
            },
            &tx,
            Duration::from_secs(60),
        );

        assert!(matches!(rx.try_recv(), Ok(Event::Input(_))));
        assert!(matches!(rx.try_recv(), Ok(Event::InputClosed)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_stops_the_loop() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        pump_input(|_| Ok(None), &tx, Duration::from_millis(0));
    }
}
