//! Engine lifecycle policies.
//!
//! A Lua runtime is never shared between concurrent calls. Two policies are
//! supported:
//!
//! - `fresh`: every call builds a new runtime, loads the script, and drops the
//!   runtime afterwards. No call can observe state left by another.
//! - `pooled`: calls check out an idle runtime exclusively and return it when
//!   done. Script globals persist between calls served by the same runtime.

use std::ops::Deref;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::engine::{LoadedProgram, ScriptError};
use super::sandbox::EngineLimits;
use crate::core::metrics::record_engine_instance;

fn default_pool_size() -> usize {
    8
}

/// How runtimes are provisioned for each call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineLifecycle {
    #[default]
    Fresh,
    Pooled,
}

/// Engine settings from the `transform.engine` configuration section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub lifecycle: EngineLifecycle,

    /// Maximum number of idle runtimes kept by the pooled lifecycle
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(flatten)]
    pub limits: EngineLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lifecycle: EngineLifecycle::default(),
            pool_size: default_pool_size(),
            limits: EngineLimits::default(),
        }
    }
}

/// Hands out a program that is exclusive to the caller for the duration of
/// one call.
pub enum EngineProvider {
    Fresh {
        source: Arc<str>,
        limits: EngineLimits,
    },
    Pooled(EnginePool),
}

impl EngineProvider {
    pub fn new(source: impl Into<Arc<str>>, config: &EngineConfig) -> Self {
        let source = source.into();
        match config.lifecycle {
            EngineLifecycle::Fresh => EngineProvider::Fresh {
                source,
                limits: config.limits,
            },
            EngineLifecycle::Pooled => {
                EngineProvider::Pooled(EnginePool::new(source, config.limits, config.pool_size))
            }
        }
    }

    pub fn lifecycle(&self) -> EngineLifecycle {
        match self {
            EngineProvider::Fresh { .. } => EngineLifecycle::Fresh,
            EngineProvider::Pooled(_) => EngineLifecycle::Pooled,
        }
    }

    /// Obtain a program for a single call.
    pub fn checkout(&self) -> Result<ProgramLease<'_>, ScriptError> {
        match self {
            EngineProvider::Fresh { source, limits } => {
                let program = LoadedProgram::load(source, limits)?;
                record_engine_instance("fresh");
                Ok(ProgramLease {
                    program: Some(program),
                    pool: None,
                    reusable: false,
                })
            }
            EngineProvider::Pooled(pool) => pool.checkout(),
        }
    }
}

/// Idle runtimes with the script already loaded.
pub struct EnginePool {
    source: Arc<str>,
    limits: EngineLimits,
    capacity: usize,
    idle: Mutex<Vec<LoadedProgram>>,
}

impl EnginePool {
    pub fn new(source: Arc<str>, limits: EngineLimits, capacity: usize) -> Self {
        Self {
            source,
            limits,
            capacity,
            idle: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Number of runtimes currently parked in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    /// Take an idle runtime, or build a new one when none is idle. Never
    /// waits for another call to finish.
    pub fn checkout(&self) -> Result<ProgramLease<'_>, ScriptError> {
        let idle = self.idle.lock().ok().and_then(|mut idle| idle.pop());
        let program = match idle {
            Some(program) => {
                record_engine_instance("pooled");
                program
            }
            None => {
                let program = LoadedProgram::load(&self.source, &self.limits)?;
                record_engine_instance("fresh");
                program
            }
        };

        Ok(ProgramLease {
            program: Some(program),
            pool: Some(self),
            reusable: true,
        })
    }

    /// Park an idle program, unless the pool is already full.
    pub fn park(&self, program: LoadedProgram) {
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < self.capacity {
                idle.push(program);
            }
        }
    }
}

/// A program checked out for one call.
///
/// Dropping the lease disposes of the runtime, or parks it back in its pool
/// when it came from one and was not marked as failed.
pub struct ProgramLease<'a> {
    program: Option<LoadedProgram>,
    pool: Option<&'a EnginePool>,
    reusable: bool,
}

impl ProgramLease<'_> {
    /// Prevent the runtime from being returned to its pool.
    pub fn discard(&mut self) {
        self.reusable = false;
    }
}

impl Deref for ProgramLease<'_> {
    type Target = LoadedProgram;

    fn deref(&self) -> &LoadedProgram {
        // Only `Drop` takes the program out.
        self.program
            .as_ref()
            .expect("program lease accessed after release")
    }
}

impl Drop for ProgramLease<'_> {
    fn drop(&mut self) {
        if let (Some(program), Some(pool)) = (self.program.take(), self.pool) {
            if self.reusable {
                pool.park(program);
            }
        }
    }
}
