//! Background thread that owns the synchronizer
//!
//! Ticks travel over a rendezvous channel, so a tick offered while the worker
//! is busy writing is dropped rather than queued. Commands use an unbounded
//! channel and are always delivered.

use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Instant;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use crossbeam::select;

use crate::pointer::Pointer;

use super::host::DirectiveSink;
use super::mode::FilterMode;
use super::sync::{FilterStatus, FilterSynchronizer};

/// Control requests for the sync worker
#[derive(Debug, Clone, PartialEq)]
pub enum SyncCommand {
    SetMode(FilterMode),
    SetEnabled(bool),
    /// Write the disabled directive now
    Disable,
    Shutdown,
}

struct Tick {
    pointer: Pointer,
    at: Instant,
}

pub struct SyncWorker {
    ticks: Sender<Tick>,
    commands: Sender<SyncCommand>,
    status: Arc<RwLock<FilterStatus>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SyncWorker {
    pub fn spawn<S>(sync: FilterSynchronizer<S>) -> std::io::Result<Self>
    where
        S: DirectiveSink + Send + 'static,
    {
        let (tick_tx, tick_rx) = channel::bounded(0);
        let (command_tx, command_rx) = channel::unbounded();
        let status = Arc::new(RwLock::new(sync.status()));

        let shared = Arc::clone(&status);
        let handle = thread::Builder::new()
            .name("deskwave-sync".into())
            .spawn(move || run(sync, tick_rx, command_rx, shared))?;

        Ok(Self {
            ticks: tick_tx,
            commands: command_tx,
            status,
            handle: Some(handle),
        })
    }

    /// Offer the current pointer. Returns false when the worker was busy and
    /// the tick was dropped.
    pub fn tick(&self, pointer: Pointer) -> bool {
        match self.ticks.try_send(Tick {
            pointer,
            at: Instant::now(),
        }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn send(&self, command: SyncCommand) {
        if self.commands.send(command).is_err() {
            log::debug!("Sync worker already stopped");
        }
    }

    /// Last status published by the worker
    pub fn status(&self) -> FilterStatus {
        match self.status.read() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Write the final disabled directive and join the thread. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.commands.send(SyncCommand::Shutdown);
            if handle.join().is_err() {
                log::error!("Sync worker panicked");
            }
        }
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<S: DirectiveSink>(
    mut sync: FilterSynchronizer<S>,
    ticks: Receiver<Tick>,
    commands: Receiver<SyncCommand>,
    status: Arc<RwLock<FilterStatus>>,
) {
    log::debug!("Sync worker started");
    loop {
        select! {
            recv(commands) -> command => {
                let command = command.unwrap_or(SyncCommand::Shutdown);
                let done = command == SyncCommand::Shutdown;
                let result = match command {
                    SyncCommand::SetMode(mode) => {
                        sync.set_mode(mode);
                        Ok(())
                    }
                    SyncCommand::SetEnabled(enabled) => sync.set_enabled(enabled),
                    SyncCommand::Disable => sync.disable(),
                    SyncCommand::Shutdown => sync.shutdown(),
                };
                if let Err(err) = result {
                    log::debug!("Sync command failed: {}", err);
                }
                publish(&status, &sync);
                if done {
                    break;
                }
            }
            recv(ticks) -> tick => {
                let Ok(tick) = tick else { continue };
                match sync.update(tick.pointer, tick.at) {
                    Ok(outcome) => log::trace!("Sync tick: {:?}", outcome),
                    Err(err) => log::debug!("Sync tick failed: {}", err),
                }
                publish(&status, &sync);
            }
        }
    }
    log::debug!("Sync worker stopped");
}

fn publish<S: DirectiveSink>(status: &RwLock<FilterStatus>, sync: &FilterSynchronizer<S>) {
    let current = sync.status();
    match status.write() {
        Ok(mut guard) => *guard = current,
        Err(poisoned) => *poisoned.into_inner() = current,
    }
}
