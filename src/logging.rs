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

//! Subscriber setup for hosts that do not install their own.
//!
//! Requires the `logging` feature. Library code only emits `tracing`
//! events; nothing is printed unless a subscriber is installed.
//!
//! ```no_run
//! use pooled_ecs::config::LoggingConfig;
//!
//! let _guard = pooled_ecs::logging::init(&LoggingConfig::default()).unwrap();
//! tracing::info!("ready");
//! ```

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{EcsError, Result};
use crate::report;

/// Install the global subscriber described by `config`.
///
/// Keep the returned guard alive for as long as file output should be
/// flushed. Fails if a global subscriber is already set.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|err| report!(EcsError::ConfigError(format!("log level: {err}"))))?;

    let console = if config.json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().with_thread_names(true).boxed()
    };

    let (file, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "pooled_ecs.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|err| report!(EcsError::ConfigError(format!("logging: {err}"))))?;

    Ok(guard)
}
