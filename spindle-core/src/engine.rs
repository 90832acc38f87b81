// Parameter resolution engine

use crate::error::BoxError;
use crate::registry::{ControllerMetadata, Instance, MethodInvoker};
use crate::resolver::{FactoryContext, ResolveData, ResolverFn};
use crate::{Args, Error, ParamValue};
use futures_util::FutureExt;
use futures_util::future::try_join_all;
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use thiserror::Error;
use tracing::trace;

/// A panic caught inside a resolver or a controller method.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PanicError(String);

impl PanicError {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "panic".to_string()
        };
        PanicError(message)
    }
}

struct Step {
    name: Cow<'static, str>,
    resolver: ResolverFn,
}

/// Resolver chains of one controller method, normalized and ready to run.
pub struct CompiledChain {
    controller: &'static str,
    method: String,
    invoker: MethodInvoker,
    chains: Vec<Vec<Step>>,
}

/// Normalize the declarations of `method` into a compiled chain.
///
/// Fails when the method is not in the manifest or a factory fails.
pub fn compile(meta: &ControllerMetadata, method: &str) -> Result<CompiledChain, Error> {
    let invoker = meta.method(method).ok_or_else(|| {
        Error::configuration(format!(
            "Cannot prepare controller method \"{}\" for {} controller",
            method,
            meta.type_name()
        ))
    })?;

    let mut chains = Vec::new();
    for (index, declarations) in meta.declarations(method).into_iter().enumerate() {
        let context = FactoryContext {
            controller: meta.type_name(),
            method: method.to_string(),
            index,
        };

        let mut steps = Vec::with_capacity(declarations.len());
        for declaration in declarations {
            let resolver = declaration.normalize(&context).map_err(|e| {
                Error::configuration(format!(
                    "Cannot prepare parameter {} \"{}\" of {}.{}: {}",
                    index,
                    declaration.name(),
                    meta.type_name(),
                    method,
                    e
                ))
            })?;
            steps.push(Step {
                name: Cow::Owned(declaration.name().to_string()),
                resolver,
            });
        }
        chains.push(steps);
    }

    tracing::debug!(
        controller = meta.type_name(),
        method,
        params = chains.len(),
        "Compiled controller method"
    );

    Ok(CompiledChain {
        controller: meta.type_name(),
        method: method.to_string(),
        invoker,
        chains,
    })
}

impl CompiledChain {
    pub fn controller(&self) -> &'static str {
        self.controller
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Number of parameter indices with a declaration stack.
    pub fn param_count(&self) -> usize {
        self.chains.len()
    }

    /// Resolve every argument.
    ///
    /// Index `i` starts from `fallbacks[i]` (or `Undefined`) and runs its
    /// resolvers one after the other. Indices run concurrently; the first
    /// failure wins and the remaining chains are dropped.
    pub async fn resolve_args(&self, data: &ResolveData, fallbacks: Vec<ParamValue>) -> Result<Args, BoxError> {
        let count = self.chains.len().max(fallbacks.len());
        let mut seeds = fallbacks.into_iter();

        let chains = (0..count).map(|index| {
            let seed = seeds.next().unwrap_or_default();
            let steps = self.chains.get(index).map(Vec::as_slice).unwrap_or_default();
            catch_panic(self.run_chain(index, steps, data, seed))
        });

        Ok(Args::new(try_join_all(chains).await?))
    }

    /// Resolve the arguments and invoke the method on `instance`.
    pub async fn execute(
        &self,
        instance: Instance,
        data: &ResolveData,
        fallbacks: Vec<ParamValue>,
    ) -> Result<ParamValue, BoxError> {
        let args = self.resolve_args(data, fallbacks).await?;
        trace!(controller = self.controller, method = %self.method, args = args.len(), "Invoking controller method");
        let invoker = self.invoker.clone();
        catch_panic(async move { invoker(instance, args).await }).await
    }

    async fn run_chain(
        &self,
        index: usize,
        steps: &[Step],
        data: &ResolveData,
        seed: ParamValue,
    ) -> Result<ParamValue, BoxError> {
        let mut value = seed;
        for step in steps {
            trace!(
                controller = self.controller,
                method = %self.method,
                index,
                param = %step.name,
                "Resolving parameter"
            );
            value = (step.resolver)(data, value).resolve().await?;
        }
        Ok(value)
    }
}

impl fmt::Debug for CompiledChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<Vec<&str>> = self
            .chains
            .iter()
            .map(|steps| steps.iter().map(|s| s.name.as_ref()).collect())
            .collect();
        f.debug_struct("CompiledChain")
            .field("controller", &self.controller)
            .field("method", &self.method)
            .field("chains", &names)
            .finish()
    }
}

async fn catch_panic<F>(future: F) -> Result<ParamValue, BoxError>
where
    F: Future<Output = Result<ParamValue, BoxError>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(Box::new(PanicError::from_payload(payload))),
    }
}
