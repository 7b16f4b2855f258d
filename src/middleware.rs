//! The middleware pipeline (C5): a symmetric before/after/onError wrapper
//! around a strategy's `execute` and `stream` paths.
//!
//! `before` runs in registration order and may replace the context;
//! `after` and `onError` run in **reverse** registration order — the
//! standard "onion" composition, chosen so the outermost middleware sees
//! errors last and can act as the final recovery barrier.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::strategy::{AgentResult, ExecutionContext};

/// One layer of the middleware pipeline. Every method has a no-op default;
/// implementations override only the stages they need.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Runs before the strategy, in registration order. Returning a new
    /// context replaces the one passed to later middleware and the
    /// strategy itself; the default passes `ctx` through unchanged.
    async fn before(&self, ctx: ExecutionContext) -> Result<ExecutionContext> {
        Ok(ctx)
    }

    /// Runs after the strategy succeeds, in reverse registration order.
    /// May transform the result; the default passes it through unchanged.
    async fn after(&self, _ctx: &ExecutionContext, result: AgentResult) -> Result<AgentResult> {
        Ok(result)
    }

    /// Runs when the strategy (or an earlier `onError`) produced an error,
    /// in reverse registration order. The first middleware to return
    /// `Some` recovers the execution with that result; remaining
    /// middleware are skipped. The default declines to recover.
    async fn on_error(&self, _ctx: &ExecutionContext, _error: &AgentError) -> Option<AgentResult> {
        None
    }
}

/// An ordered stack of [`Middleware`], applied around a strategy execution.
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    layers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewarePipeline {
    /// An empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer, outermost-registered-first.
    #[must_use]
    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Run every layer's `before` in registration order.
    pub(crate) async fn run_before(&self, mut ctx: ExecutionContext) -> Result<ExecutionContext> {
        for layer in &self.layers {
            ctx = layer.before(ctx).await?;
        }
        Ok(ctx)
    }

    /// Run every layer's `after` in reverse registration order.
    pub(crate) async fn run_after(&self, ctx: &ExecutionContext, mut result: AgentResult) -> Result<AgentResult> {
        for layer in self.layers.iter().rev() {
            result = layer.after(ctx, result).await?;
        }
        Ok(result)
    }

    /// Run `onError` layers in reverse order until one recovers, or return
    /// the original error if none do.
    pub(crate) async fn run_on_error(&self, ctx: &ExecutionContext, error: AgentError) -> Result<AgentResult> {
        for layer in self.layers.iter().rev() {
            if let Some(recovered) = layer.on_error(ctx, &error).await {
                return Ok(recovered);
            }
        }
        Err(error)
    }
}
