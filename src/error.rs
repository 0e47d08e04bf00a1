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

//! Error types and the error notification path.
//!
//! Every error raised inside the crate goes through [`report!`], which logs
//! it with its source location and forwards it to the host hook installed
//! with [`set_error_hook`] before it is returned to the caller.
//!
//! Errors fall into three categories. Contract violations and capacity
//! exhaustion are fatal: the system loop stops on them and the game loop
//! hands them back to the host. Recoverable errors (missing files, bad data)
//! are returned to the caller, which decides whether to retry or skip.

use std::fmt;
use std::io;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::entity::Entity;

/// Error category used by the notification path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Programmer error: stale entity, absent component, bad loop state...
    ContractViolation,
    /// I/O or data problem the caller may handle.
    Recoverable,
    /// A fixed capacity budget was exceeded.
    Capacity,
}

impl ErrorCategory {
    pub fn is_fatal(self) -> bool {
        !matches!(self, ErrorCategory::Recoverable)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::ContractViolation => write!(f, "contract violation"),
            ErrorCategory::Recoverable => write!(f, "recoverable"),
            ErrorCategory::Capacity => write!(f, "capacity"),
        }
    }
}

/// ECS error type
#[derive(Debug, Clone, PartialEq)]
pub enum EcsError {
    /// Entity does not exist or the id is stale
    EntityNotFound(Entity),

    /// Invalid entity ID
    InvalidEntity,

    /// Entity index space exhausted
    EntityCapacityExhausted { max: u32 },

    /// Entity lacks the requested component
    ComponentNotFound {
        entity: Entity,
        component: &'static str,
    },

    /// Entity already holds the component
    ComponentAlreadyPresent {
        entity: Entity,
        component: &'static str,
    },

    /// Component key or type is not known to the world
    UnknownComponent(String),

    /// Live instance budget of a component type is used up
    CapacityExhausted { component: &'static str, max: usize },

    /// Type or factory registered twice
    AlreadyRegistered(String),

    /// Type or factory missing from a registry
    NotRegistered(String),

    /// World builder is missing a collaborator
    WorldNotReady(String),

    /// Entity is not part of the staging area being committed
    EntityNotStaged(Entity),

    /// World-side structural change on an uncommitted staged entity
    StagedEntityMutation(Entity),

    /// Staging area created by a different world
    ForeignStagingArea,

    /// System loop run before `initialize`
    LoopNotInitialized,

    /// System loop already stopped
    LoopStopped,

    /// System loop has no factory to build from
    LoopNotReady(String),

    /// System not found
    SystemNotFound(String),

    /// Game loop started while another run is active
    GameLoopAlreadyRunning,

    /// Game loop worker panicked or vanished
    GameLoopFailed(String),

    /// Parent links form a cycle or exceed the depth limit
    HierarchyError(String),

    /// Asset not found
    AssetNotFound(String),

    /// Asset load error
    AssetLoadError(String),

    /// File not found
    FileNotFound(String),

    /// Parse error (file contents, configuration)
    ParseError(String),

    /// IO error (file operations, etc.)
    IoError(String),

    /// Configuration error
    ConfigError(String),
}

impl EcsError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EcsError::EntityCapacityExhausted { .. } | EcsError::CapacityExhausted { .. } => {
                ErrorCategory::Capacity
            }
            EcsError::AssetNotFound(_)
            | EcsError::AssetLoadError(_)
            | EcsError::FileNotFound(_)
            | EcsError::ParseError(_)
            | EcsError::IoError(_)
            | EcsError::ConfigError(_) => ErrorCategory::Recoverable,
            _ => ErrorCategory::ContractViolation,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.category().is_fatal()
    }
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::EntityNotFound(e) => write!(f, "Entity not found: {e}"),
            EcsError::InvalidEntity => write!(f, "Invalid entity ID"),
            EcsError::EntityCapacityExhausted { max } => {
                write!(f, "Entity capacity exhausted: max index is {max}")
            }
            EcsError::ComponentNotFound { entity, component } => {
                write!(f, "Entity {entity} does not have component {component}")
            }
            EcsError::ComponentAlreadyPresent { entity, component } => {
                write!(f, "Entity {entity} already has component {component}")
            }
            EcsError::UnknownComponent(name) => write!(f, "Unknown component: {name}"),
            EcsError::CapacityExhausted { component, max } => {
                write!(f, "Component capacity exhausted: {component} allows {max} live instances")
            }
            EcsError::AlreadyRegistered(name) => write!(f, "Already registered: {name}"),
            EcsError::NotRegistered(name) => write!(f, "Not registered: {name}"),
            EcsError::WorldNotReady(msg) => write!(f, "World not ready: {msg}"),
            EcsError::EntityNotStaged(e) => write!(f, "Entity {e} is not staged in this area"),
            EcsError::StagedEntityMutation(e) => {
                write!(f, "Entity {e} is still staged and cannot be changed through the world")
            }
            EcsError::ForeignStagingArea => {
                write!(f, "Staging area belongs to a different world")
            }
            EcsError::LoopNotInitialized => write!(f, "System loop is not initialized"),
            EcsError::LoopStopped => write!(f, "System loop has stopped"),
            EcsError::LoopNotReady(msg) => write!(f, "System loop not ready: {msg}"),
            EcsError::SystemNotFound(name) => write!(f, "System not found: {name}"),
            EcsError::GameLoopAlreadyRunning => write!(f, "Game loop is already running"),
            EcsError::GameLoopFailed(msg) => write!(f, "Game loop failed: {msg}"),
            EcsError::HierarchyError(msg) => write!(f, "Hierarchy error: {msg}"),
            EcsError::AssetNotFound(msg) => write!(f, "Asset not found: {msg}"),
            EcsError::AssetLoadError(msg) => write!(f, "Asset load error: {msg}"),
            EcsError::FileNotFound(path) => write!(f, "File not found: {path}"),
            EcsError::ParseError(msg) => write!(f, "Parse error: {msg}"),
            EcsError::IoError(msg) => write!(f, "IO error: {msg}"),
            EcsError::ConfigError(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for EcsError {}

impl From<io::Error> for EcsError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => EcsError::FileNotFound(err.to_string()),
            _ => EcsError::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for EcsError {
    fn from(err: serde_json::Error) -> Self {
        EcsError::ParseError(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;

/// What the host hook receives for every raised error.
#[derive(Debug, Clone, Copy)]
pub struct ErrorReport<'a> {
    pub error: &'a EcsError,
    pub category: ErrorCategory,
    pub file: &'static str,
    pub line: u32,
    pub module: &'static str,
}

type ErrorHook = Arc<dyn Fn(&ErrorReport<'_>) + Send + Sync>;

static ERROR_HOOK: RwLock<Option<ErrorHook>> = parking_lot::const_rwlock(None);

/// Install the host hook called for every raised error.
///
/// Replaces any previous hook. The hook runs on whichever thread raised the
/// error, so it must not call back into the world.
pub fn set_error_hook<F>(hook: F)
where
    F: Fn(&ErrorReport<'_>) + Send + Sync + 'static,
{
    *ERROR_HOOK.write() = Some(Arc::new(hook));
}

pub fn clear_error_hook() {
    *ERROR_HOOK.write() = None;
}

/// Log `error` with its location, notify the hook and hand it back.
///
/// Use through [`report!`](crate::report) so the location is filled in.
pub fn raise(error: EcsError, file: &'static str, line: u32, module: &'static str) -> EcsError {
    let report = ErrorReport {
        category: error.category(),
        error: &error,
        file,
        line,
        module,
    };

    if report.category.is_fatal() {
        tracing::error!(
            category = %report.category,
            file,
            line,
            module,
            "{error}"
        );
    } else {
        tracing::warn!(category = %report.category, file, line, module, "{error}");
    }

    // Cloned out so the hook may replace or clear itself.
    let hook = ERROR_HOOK.read().clone();
    if let Some(hook) = hook {
        hook(&report);
    }

    error
}

/// Raise an [`EcsError`] through the notification path.
///
/// ```
/// use pooled_ecs::error::{EcsError, Result};
/// use pooled_ecs::report;
///
/// fn lookup() -> Result<()> {
///     Err(report!(EcsError::SystemNotFound("Physics".into())))
/// }
/// assert!(lookup().is_err());
/// ```
#[macro_export]
macro_rules! report {
    ($err:expr) => {
        $crate::error::raise($err, file!(), line!(), module_path!())
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_categories() {
        let cap = EcsError::CapacityExhausted {
            component: "Health",
            max: 2,
        };
        assert_eq!(cap.category(), ErrorCategory::Capacity);
        assert!(cap.is_fatal());

        let io = EcsError::FileNotFound("a.json".into());
        assert_eq!(io.category(), ErrorCategory::Recoverable);
        assert!(!io.is_fatal());

        assert_eq!(
            EcsError::LoopNotInitialized.category(),
            ErrorCategory::ContractViolation
        );
    }

    #[test]
    fn test_io_conversion() {
        let missing = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert!(matches!(EcsError::from(missing), EcsError::FileNotFound(_)));

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(EcsError::from(denied), EcsError::IoError(_)));
    }

    #[test]
    fn test_report_reaches_hook() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        set_error_hook(move |report| {
            if let EcsError::SystemNotFound(name) = report.error {
                if name == "hook-target" {
                    assert_eq!(report.category, ErrorCategory::ContractViolation);
                    assert!(report.file.ends_with("error.rs"));
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        let err = report!(EcsError::SystemNotFound("hook-target".into()));
        assert_eq!(err, EcsError::SystemNotFound("hook-target".into()));
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // A one-shot hook that removes itself must not deadlock.
        let counter = seen.clone();
        set_error_hook(move |report| {
            if matches!(report.error, EcsError::SystemNotFound(name) if name == "one-shot") {
                counter.fetch_add(1, Ordering::SeqCst);
                clear_error_hook();
            }
        });
        report!(EcsError::SystemNotFound("one-shot".into()));
        report!(EcsError::SystemNotFound("one-shot".into()));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        clear_error_hook();
    }
}
