//! Lua scripting engine for body transformation.
//!
//! Scripts define a global `transform(body)` function that receives the raw
//! body as a Lua string and returns the replacement body as a string. A
//! `json` codec table is available to every script.

pub mod bindings;
pub mod engine;
pub mod pool;
pub mod sandbox;

pub use engine::{LoadedProgram, ScriptError};
pub use pool::{EngineConfig, EngineLifecycle, EnginePool, EngineProvider, ProgramLease};
pub use sandbox::{EngineLimits, MAX_SCRIPT_SIZE};
