//! Operator quit signal, polled by the session between frames.

use std::{
    io::{self, BufRead},
    thread,
};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};

/// Latching "please stop" flag fed from another thread.
#[derive(Debug)]
pub struct QuitSignal {
    rx: Option<Receiver<()>>,
    requested: bool,
}

/// Sending side of a [`QuitSignal`].
#[derive(Clone, Debug)]
pub struct QuitHandle {
    tx: Sender<()>,
}

impl QuitHandle {
    pub fn request(&self) {
        let _ = self.tx.try_send(());
    }
}

impl QuitSignal {
    pub fn channel() -> (QuitHandle, QuitSignal) {
        let (tx, rx) = bounded(1);
        (
            QuitHandle { tx },
            QuitSignal {
                rx: Some(rx),
                requested: false,
            },
        )
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self {
            rx: None,
            requested: false,
        }
    }

    pub fn poll(&mut self) -> bool {
        if self.requested {
            return true;
        }
        if let Some(rx) = &self.rx {
            match rx.try_recv() {
                Ok(()) => self.requested = true,
                // the listener going away is not a request to stop
                Err(TryRecvError::Disconnected) => self.rx = None,
                Err(TryRecvError::Empty) => {}
            }
        }
        self.requested
    }
}

/// Watches stdin on a detached thread; a line reading `q` requests a quit.
pub fn spawn_stdin_listener() -> QuitSignal {
    let (handle, signal) = QuitSignal::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if is_quit_command(&line) => {
                    log::info!("quit requested from console");
                    handle.request();
                    return;
                }
                Ok(_) => {}
                Err(err) => {
                    log::warn!("stopped reading console input: {err}");
                    return;
                }
            }
        }
    });
    signal
}

fn is_quit_command(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("q")
}
