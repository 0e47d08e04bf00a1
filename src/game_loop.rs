// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Background game loop driver
//!
//! One worker thread drives a [`SystemLoop`] until it stops. The host thread
//! polls [`GameLoop::is_running`] or waits on the completion channel, which
//! receives exactly one [`LoopExit`] per run.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::RwLock;

use crate::assets::SharedAssets;
use crate::error::{EcsError, Result};
use crate::report;
use crate::system_loop::{LoopState, SystemLoop};
use crate::world::SharedWorld;

/// Completion message sent when the worker finishes.
#[derive(Debug)]
pub struct LoopExit {
    pub ticks: u64,
    pub result: Result<()>,
}

/// Guarantees a single active loop and tells the host when it ends.
#[derive(Debug)]
pub struct GameLoop {
    running: Arc<RwLock<bool>>,
    completion_tx: Sender<LoopExit>,
    completion_rx: Receiver<LoopExit>,
}

/// Running (or finished) game loop worker.
#[derive(Debug)]
pub struct GameLoopHandle {
    worker: JoinHandle<SystemLoop>,
}

impl GameLoopHandle {
    /// Wait for the worker and take the system loop back.
    pub fn join(self) -> Result<SystemLoop> {
        self.worker
            .join()
            .map_err(|_| report!(EcsError::GameLoopFailed("worker thread panicked".into())))
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }
}

/// Clears the running flag even when the worker unwinds.
struct RunningGuard(Arc<RwLock<bool>>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        *self.0.write() = false;
    }
}

impl GameLoop {
    pub fn new() -> Self {
        let (completion_tx, completion_rx) = channel::unbounded();
        Self {
            running: Arc::new(RwLock::new(false)),
            completion_tx,
            completion_rx,
        }
    }

    /// Start driving `system_loop` on a worker thread.
    ///
    /// Fails with `GameLoopAlreadyRunning` while a previous run is active.
    /// The loop is initialized here if it has not been yet.
    pub fn run(
        &self,
        mut system_loop: SystemLoop,
        world: SharedWorld,
        assets: SharedAssets,
    ) -> Result<GameLoopHandle> {
        {
            let mut running = self.running.write();
            if *running {
                return Err(report!(EcsError::GameLoopAlreadyRunning));
            }
            *running = true;
        }
        let guard = RunningGuard(self.running.clone());

        let thread_name = system_loop.config().thread_name.clone();
        let completion = self.completion_tx.clone();

        let worker = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                tracing::info!("game loop started");

                let result = match system_loop.state() {
                    LoopState::Uninitialized => system_loop.initialize(),
                    _ => Ok(()),
                }
                .and_then(|()| system_loop.run_shared(&world, &assets).map(|_| ()));

                let ticks = system_loop.ticks();
                match &result {
                    Ok(()) => tracing::info!(ticks, "game loop finished"),
                    Err(err) => tracing::error!(ticks, error = %err, "game loop failed"),
                }

                drop(guard);
                // The host may have dropped the GameLoop; nobody to notify then.
                let _ = completion.send(LoopExit { ticks, result });
                system_loop
            })
            .map_err(|err| report!(EcsError::GameLoopFailed(err.to_string())))?;

        Ok(GameLoopHandle { worker })
    }

    /// Non-blocking, callable from any thread.
    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Receives one [`LoopExit`] per finished run.
    pub fn completion(&self) -> &Receiver<LoopExit> {
        &self.completion_rx
    }
}

impl Default for GameLoop {
    fn default() -> Self {
        Self::new()
    }
}
