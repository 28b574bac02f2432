//! Sandboxed Lua runtime creation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use mlua::{HookTriggers, Lua, Result as LuaResult, VmState};
use serde::{Deserialize, Serialize};

const DEFAULT_MEMORY_LIMIT: usize = 16 * 1024 * 1024; // 16 MB
const DEFAULT_MAX_INSTRUCTIONS: u32 = 1_000_000;
const HOOK_GRANULARITY: u32 = 10_000;

/// Maximum script source size in bytes (1 MB).
pub const MAX_SCRIPT_SIZE: usize = 1024 * 1024;

/// Globals stripped from every runtime before the script is loaded.
const BLOCKED_GLOBALS: &[&str] = &[
    "io", "os", "debug", "loadfile", "dofile", "require", "package", "jit",
];

/// Resource limits applied to each Lua runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineLimits {
    /// Maximum heap size of a single runtime
    #[serde(default = "default_memory_limit")]
    pub memory_limit_bytes: usize,

    /// Instruction budget for a single `transform` call
    #[serde(default = "default_instruction_limit")]
    pub instruction_limit: u32,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            memory_limit_bytes: default_memory_limit(),
            instruction_limit: default_instruction_limit(),
        }
    }
}

fn default_memory_limit() -> usize {
    DEFAULT_MEMORY_LIMIT
}

fn default_instruction_limit() -> u32 {
    DEFAULT_MAX_INSTRUCTIONS
}

/// Create a sandboxed Lua runtime with dangerous globals removed, memory
/// limit, and an instruction-count hook to prevent infinite loops.
///
/// Returns `(lua, counter)` where `counter` should be reset to 0 before
/// each invocation so the script gets a fresh instruction budget.
pub fn create_sandboxed_lua(limits: &EngineLimits) -> LuaResult<(Lua, Arc<AtomicU32>)> {
    let lua = Lua::new();
    lua.set_memory_limit(limits.memory_limit_bytes)?;

    // Disable JIT so instruction-count hooks fire reliably (LuaJIT skips
    // hooks for JIT-compiled code paths).
    lua.load("if jit then jit.off() end").exec()?;

    let globals = lua.globals();
    for name in BLOCKED_GLOBALS {
        globals.set(*name, mlua::Value::Nil)?;
    }

    let max_instructions = limits.instruction_limit;
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(HOOK_GRANULARITY),
        move |_lua, _debug| {
            let prev = counter_clone.fetch_add(HOOK_GRANULARITY, Ordering::Relaxed);
            if prev.saturating_add(HOOK_GRANULARITY) > max_instructions {
                return Err(mlua::Error::runtime(
                    "script exceeded instruction limit (possible infinite loop)",
                ));
            }
            Ok(VmState::Continue)
        },
    );

    Ok((lua, counter))
}
