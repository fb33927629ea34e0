use super::coerce::check;
use super::signature::FunctionSignature;
use crate::types::{ArgMap, ExecutionResult, FunctionCall, Outcome, ToolDefinition};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Domain code that performs the state change behind a function.
///
/// Receives arguments already validated and coerced against the signature.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn call(&self, arguments: ArgMap) -> anyhow::Result<ArgMap>;
}

/// Adapts an async closure into a [`FunctionHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> FunctionHandler for FnHandler<F>
where
    F: Fn(ArgMap) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ArgMap>> + Send,
{
    async fn call(&self, arguments: ArgMap) -> anyhow::Result<ArgMap> {
        (self.0)(arguments).await
    }
}

struct Registered {
    signature: FunctionSignature,
    handler: Arc<dyn FunctionHandler>,
}

/// Validation and dispatch boundary between model output and domain code.
///
/// Never calls the model. Every outcome, including an unknown name or a handler
/// panic, comes back as an [`ExecutionResult`].
#[derive(Default)]
pub struct FunctionBridge {
    functions: RwLock<HashMap<String, Registered>>,
}

impl std::fmt::Debug for FunctionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionBridge")
            .field("functions", &self.names())
            .finish()
    }
}

impl FunctionBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under the signature's name. A name can be registered once.
    pub fn register(
        &self,
        signature: FunctionSignature,
        handler: Arc<dyn FunctionHandler>,
    ) -> Result<()> {
        let mut functions = self.functions.write().unwrap_or_else(PoisonError::into_inner);
        if functions.contains_key(&signature.name) {
            return Err(Error::configuration_with_context(
                "function already registered",
                ErrorContext::new()
                    .with_field_path(format!("functions.{}", signature.name))
                    .with_source("function_bridge"),
            ));
        }
        debug!(function = signature.name.as_str(), "function registered");
        functions.insert(signature.name.clone(), Registered { signature, handler });
        Ok(())
    }

    /// Register an async closure.
    pub fn register_fn<F, Fut>(&self, signature: FunctionSignature, handler: F) -> Result<()>
    where
        F: Fn(ArgMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ArgMap>> + Send + 'static,
    {
        self.register(signature, Arc::new(FnHandler(handler)))
    }

    pub fn names(&self) -> Vec<String> {
        let functions = self.functions.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = functions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn signature(&self, name: &str) -> Option<FunctionSignature> {
        let functions = self.functions.read().unwrap_or_else(PoisonError::into_inner);
        functions.get(name).map(|r| r.signature.clone())
    }

    /// Definitions of every registered function, sorted by name.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let functions = self.functions.read().unwrap_or_else(PoisonError::into_inner);
        let mut tools: Vec<ToolDefinition> = functions
            .values()
            .map(|r| r.signature.to_tool_definition())
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Check `arguments` against `signature`. All issues are reported together.
    pub fn validate(signature: &FunctionSignature, arguments: &ArgMap) -> std::result::Result<ArgMap, Vec<String>> {
        let mut issues = Vec::new();
        let mut validated = ArgMap::new();

        for spec in &signature.params {
            match arguments.get(&spec.name) {
                Some(value) => match check(spec, value) {
                    Ok(v) => {
                        validated.insert(spec.name.clone(), v);
                    }
                    Err(reason) => issues.push(format!("{}: {}", spec.name, reason)),
                },
                None => match &spec.default {
                    Some(default) => {
                        validated.insert(spec.name.clone(), default.clone());
                    }
                    None if spec.required => issues.push(format!("{}: missing required argument", spec.name)),
                    None => {}
                },
            }
        }
        for name in arguments.keys() {
            if signature.get(name).is_none() {
                issues.push(format!("{}: unexpected argument", name));
            }
        }

        if issues.is_empty() {
            Ok(validated)
        } else {
            Err(issues)
        }
    }

    /// Validate, dispatch and wrap one proposal.
    pub async fn execute(&self, call: &FunctionCall) -> ExecutionResult {
        let found = {
            let functions = self.functions.read().unwrap_or_else(PoisonError::into_inner);
            functions
                .get(&call.name)
                .map(|r| (r.signature.clone(), r.handler.clone()))
        };
        let Some((signature, handler)) = found else {
            warn!(function = call.name.as_str(), "unknown function proposed");
            return ExecutionResult::failed(
                &call.name,
                Outcome::UnknownFunction,
                format!("unknown function '{}'", call.name),
            );
        };

        let arguments = match Self::validate(&signature, &call.arguments) {
            Ok(arguments) => arguments,
            Err(issues) => {
                warn!(function = call.name.as_str(), issues = issues.len(), "invalid function arguments");
                let message = format!("invalid arguments for '{}': {}", call.name, issues.join("; "));
                return ExecutionResult::failed(&call.name, Outcome::InvalidArguments { issues }, message);
            }
        };

        match AssertUnwindSafe(handler.call(arguments)).catch_unwind().await {
            Ok(Ok(data)) => {
                info!(function = call.name.as_str(), "function executed");
                ExecutionResult::completed(&call.name, data)
            }
            Ok(Err(e)) => {
                warn!(function = call.name.as_str(), error = %e, "function handler failed");
                ExecutionResult::failed(&call.name, Outcome::HandlerFailed, format!("{:#}", e))
            }
            Err(_) => {
                warn!(function = call.name.as_str(), "function handler panicked");
                ExecutionResult::failed(
                    &call.name,
                    Outcome::HandlerFailed,
                    format!("handler for '{}' panicked", call.name),
                )
            }
        }
    }
}
