use rquickjs::{Context, Ctx, Runtime};
use tracing::{debug, warn};

use crate::{
    consts::{ANALYSIS_MEMORY_LIMIT, ANALYSIS_STACK_LIMIT},
    error::FramelensError,
};

/// Load state of a synthesized analysis function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loaded,
    LoadFailed,
}

/// Captured diagnostic for a failed load: the engine message plus the
/// script stack when one exists.
#[derive(Clone, Debug)]
pub struct LoadDiagnostic {
    pub stage: String,
    pub message: String,
}

impl std::fmt::Display for LoadDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

/// Result of a load attempt. The loader reports failure, it never
/// propagates an error to its caller.
pub enum LoadOutcome {
    Loaded(AnalysisFunction),
    Failed(LoadDiagnostic),
}

/// A synthesized function bound inside its own disposable evaluation
/// unit.
///
/// Every load owns a dedicated engine runtime and context, so two
/// loads can never collide on the function name or see each other's
/// module-level state. Dropping the handle disposes the whole unit.
pub struct AnalysisFunction {
    context: Context,
    // The context borrows the runtime; keeping it here pins the unit's
    // lifetime to the handle.
    _runtime: Runtime,
    function_name: String,
}

/// Turns a string of source code into an invocable unit exposing one
/// function with the expected name.
///
/// Syntax errors, runtime errors raised by top-level statements, a
/// missing definition, or a binding that is not callable all produce
/// `LoadOutcome::Failed` with a captured diagnostic. When the snippet
/// defines more than one function, exactly the one with the expected
/// name is bound and the rest are inert.
pub fn load(source: &str, function_name: &str) -> LoadOutcome {
    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            return LoadOutcome::Failed(LoadDiagnostic {
                stage: "runtime".to_string(),
                message: err.to_string(),
            });
        }
    };
    runtime.set_memory_limit(ANALYSIS_MEMORY_LIMIT);
    runtime.set_max_stack_size(ANALYSIS_STACK_LIMIT);

    let context = match Context::full(&runtime) {
        Ok(context) => context,
        Err(err) => {
            return LoadOutcome::Failed(LoadDiagnostic {
                stage: "context".to_string(),
                message: err.to_string(),
            });
        }
    };

    let bound = context.with(|ctx| -> Result<(), LoadDiagnostic> {
        if let Err(err) = ctx.eval::<(), _>(source) {
            return Err(LoadDiagnostic {
                stage: "eval".to_string(),
                message: describe_error(&ctx, err),
            });
        }

        let binding: rquickjs::Value = ctx
            .globals()
            .get(function_name)
            .map_err(|err| LoadDiagnostic {
                stage: "bind".to_string(),
                message: describe_error(&ctx, err),
            })?;

        if !binding.is_function() {
            return Err(LoadDiagnostic {
                stage: "bind".to_string(),
                message: format!("source does not define a function named `{function_name}`"),
            });
        }
        Ok(())
    });

    match bound {
        Ok(()) => {
            debug!("bound analysis function `{function_name}`");
            LoadOutcome::Loaded(AnalysisFunction {
                context,
                _runtime: runtime,
                function_name: function_name.to_string(),
            })
        }
        Err(diagnostic) => {
            warn!("analysis function load failed: {diagnostic}");
            LoadOutcome::Failed(diagnostic)
        }
    }
}

impl AnalysisFunction {
    /// Invokes the bound function with `metadata` as its sole argument
    /// and returns its JSON-serializable result.
    ///
    /// The argument crosses into the unit as JSON and the result
    /// crosses back the same way, so the function sees plain engine
    /// values and nothing from the host leaks in. An exception raised
    /// by the function is captured per-invocation; the unit itself
    /// stays loaded.
    pub fn invoke(
        &self,
        frame: &str,
        metadata: &serde_json::Value,
    ) -> Result<serde_json::Value, FramelensError> {
        let payload = metadata.to_string();
        let call = format!(
            "JSON.stringify(globalThis[{}](JSON.parse(globalThis.__framelens_arg)))",
            serde_json::Value::String(self.function_name.clone())
        );

        let produced = self.context.with(|ctx| -> Result<Option<String>, String> {
            ctx.globals()
                .set("__framelens_arg", payload.as_str())
                .map_err(|err| describe_error(&ctx, err))?;
            ctx.eval::<Option<String>, _>(call.as_str())
                .map_err(|err| describe_error(&ctx, err))
        });

        match produced {
            Ok(Some(json)) => {
                serde_json::from_str(&json).map_err(|err| FramelensError::ExecutionFailure {
                    frame: frame.to_string(),
                    message: format!("result is not valid JSON: {err}"),
                })
            }
            // The function returned undefined (or a value JSON cannot
            // express); report it as null rather than failing the frame.
            Ok(None) => Ok(serde_json::Value::Null),
            Err(message) => Err(FramelensError::ExecutionFailure {
                frame: frame.to_string(),
                message,
            }),
        }
    }
}

/// Renders an engine error, pulling the thrown value's message and
/// script stack out of the context when the error was an exception.
fn describe_error(ctx: &Ctx<'_>, err: rquickjs::Error) -> String {
    if !matches!(err, rquickjs::Error::Exception) {
        return err.to_string();
    }
    let caught = ctx.catch();
    if let Some(exception) = caught.as_exception() {
        let message = exception
            .message()
            .unwrap_or_else(|| "unknown exception".to_string());
        match exception.stack() {
            Some(stack) if !stack.is_empty() => format!("{message}\n{stack}"),
            _ => message,
        }
    } else {
        format!("exception value: {caught:?}")
    }
}
