//! Lua program loading and invocation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use mlua::{Lua, Value};

use super::bindings::install_json_codec;
use super::sandbox::{create_sandboxed_lua, EngineLimits, MAX_SCRIPT_SIZE};

/// Chunk name reported in Lua error messages.
const CHUNK_NAME: &str = "=transform_script";

/// Errors raised by the script engine.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ScriptError {
    /// The source could not be compiled or its top-level chunk failed.
    #[error("failed to load Lua script: {0}")]
    Load(String),

    /// The entry point is missing or raised an error.
    #[error("Lua script runtime error: {0}")]
    Runtime(String),

    /// The entry point returned something other than a string.
    #[error("Lua transform returned {found}, expected a string")]
    Type { found: &'static str },
}

/// A sandboxed Lua runtime with a script loaded into its globals.
///
/// One program serves one call at a time: `invoke` takes `&self`, but callers
/// must never hand the same program to two concurrent calls.
pub struct LoadedProgram {
    lua: Lua,
    /// Reset to 0 before each invocation to give a fresh instruction budget.
    instruction_counter: Arc<AtomicU32>,
}

impl LoadedProgram {
    /// Create a fresh runtime and execute `source` in it.
    pub fn load(source: &str, limits: &EngineLimits) -> Result<Self, ScriptError> {
        if source.len() > MAX_SCRIPT_SIZE {
            return Err(ScriptError::Load(format!(
                "script size ({} bytes) exceeds maximum ({MAX_SCRIPT_SIZE} bytes)",
                source.len(),
            )));
        }

        let (lua, counter) = create_sandboxed_lua(limits)
            .map_err(|e| ScriptError::Load(format!("failed to create Lua runtime: {e}")))?;

        install_json_codec(&lua)
            .map_err(|e| ScriptError::Load(format!("failed to install json codec: {e}")))?;

        lua.load(source)
            .set_name(CHUNK_NAME)
            .exec()
            .map_err(|e| ScriptError::Load(e.to_string()))?;

        // Loading consumes part of the budget; invocations start from zero.
        counter.store(0, Ordering::Relaxed);

        Ok(Self {
            lua,
            instruction_counter: counter,
        })
    }

    /// Whether the loaded script defines a global function named `name`.
    pub fn has_entry_point(&self, name: &str) -> bool {
        matches!(
            self.lua.globals().get::<Value>(name),
            Ok(Value::Function(_))
        )
    }

    /// Call the global function `entry_point` with `input` as its only
    /// argument and return its first result as bytes.
    pub fn invoke(&self, entry_point: &str, input: &[u8]) -> Result<Bytes, ScriptError> {
        self.instruction_counter.store(0, Ordering::Relaxed);

        let func = match self.lua.globals().get::<Value>(entry_point) {
            Ok(Value::Function(func)) => func,
            Ok(Value::Nil) => {
                return Err(ScriptError::Runtime(format!(
                    "entry point `{entry_point}` is not defined"
                )))
            }
            Ok(other) => {
                return Err(ScriptError::Runtime(format!(
                    "entry point `{entry_point}` is a {}, not a function",
                    other.type_name()
                )))
            }
            Err(e) => return Err(ScriptError::Runtime(e.to_string())),
        };

        let arg = self
            .lua
            .create_string(input)
            .map_err(|e| ScriptError::Runtime(format!("failed to bind payload: {e}")))?;

        let result = func
            .call::<Value>(arg)
            .map_err(|e| ScriptError::Runtime(format!("`{entry_point}` failed: {e}")))?;

        match result {
            Value::String(s) => Ok(Bytes::copy_from_slice(&s.as_bytes())),
            other => Err(ScriptError::Type {
                found: other.type_name(),
            }),
        }
    }
}
