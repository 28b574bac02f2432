//! Transform invocation: one exclusive Lua runtime per call.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use crate::core::config::TransformMode;
use crate::core::error::{AppError, Result};
use crate::core::metrics::record_transform;
use crate::scripting::{EngineConfig, EngineProvider, LoadedProgram, ScriptError};

/// Global function every transform script must define.
pub const TRANSFORM_ENTRY_POINT: &str = "transform";

/// Runs the configured script's `transform` function against payloads.
///
/// The invoker itself is immutable and shared by all in-flight requests;
/// every call gets its own runtime from the [`EngineProvider`].
pub struct TransformInvoker {
    mode: TransformMode,
    provider: EngineProvider,
}

impl TransformInvoker {
    /// Compile `script` once to validate it, then build the runtime provider.
    ///
    /// Fails with [`ScriptError::Load`] when the script does not load.
    pub fn new(
        script: &str,
        mode: TransformMode,
        engine: &EngineConfig,
    ) -> std::result::Result<Self, ScriptError> {
        let validated = LoadedProgram::load(script, &engine.limits)?;
        if !validated.has_entry_point(TRANSFORM_ENTRY_POINT) {
            tracing::warn!(
                entry_point = TRANSFORM_ENTRY_POINT,
                "Lua script does not define the entry point; every transform will fail"
            );
        }

        let provider = EngineProvider::new(script, engine);
        if let EngineProvider::Pooled(pool) = &provider {
            pool.park(validated);
        }

        Ok(Self { mode, provider })
    }

    pub fn mode(&self) -> TransformMode {
        self.mode
    }

    pub fn provider(&self) -> &EngineProvider {
        &self.provider
    }

    /// Transform `input` synchronously on the current thread.
    pub fn transform(&self, input: &[u8]) -> std::result::Result<Bytes, ScriptError> {
        let start = Instant::now();
        let result = self.invoke(input);
        let outcome = match &result {
            Ok(_) => "success",
            Err(ScriptError::Load(_)) => "load_error",
            Err(ScriptError::Runtime(_)) => "runtime_error",
            Err(ScriptError::Type { .. }) => "type_error",
        };
        record_transform(self.mode.as_str(), outcome, start.elapsed().as_secs_f64());
        result
    }

    fn invoke(&self, input: &[u8]) -> std::result::Result<Bytes, ScriptError> {
        let mut program = self.provider.checkout()?;
        let result = program.invoke(TRANSFORM_ENTRY_POINT, input);
        if result.is_err() {
            program.discard();
        }
        result
    }

    /// Transform `input` on the blocking thread pool.
    ///
    /// If the returned future is dropped the call still finishes in the
    /// background, but its runtime is disposed and its result discarded.
    pub async fn transform_blocking_task(self: &Arc<Self>, input: Bytes) -> Result<Bytes> {
        let invoker = Arc::clone(self);
        let output = tokio::task::spawn_blocking(move || invoker.transform(&input))
            .await
            .map_err(|e| AppError::Internal(format!("transform task failed: {e}")))??;
        Ok(output)
    }
}
