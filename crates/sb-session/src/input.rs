//! Blocking reader for local terminal events

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::keys::InputEvent;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Forward terminal events into a channel until its receiver goes away
pub fn spawn_terminal_reader(tx: mpsc::Sender<InputEvent>) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        use crossterm::event;

        while !tx.is_closed() {
            match event::poll(POLL_INTERVAL) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!("Terminal event poll failed: {}", e);
                    break;
                }
            }
            let event = match event::read() {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Terminal event read failed: {}", e);
                    break;
                }
            };
            if let Some(input) = InputEvent::from_terminal(event) {
                if tx.blocking_send(input).is_err() {
                    break;
                }
            }
        }
        tracing::debug!("Terminal reader stopped");
    })
}

/// Channel fed from the local terminal
pub fn terminal_input() -> (mpsc::Receiver<InputEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(256);
    (rx, spawn_terminal_reader(tx))
}
