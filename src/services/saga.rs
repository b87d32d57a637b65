//! Ordered steps with reverse-order compensation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::errors::{BookingError, BookingResult};

/// Results of the steps that have run so far, keyed by step name.
#[derive(Debug, Default, Clone)]
pub struct SagaContext {
    results: HashMap<&'static str, Value>,
}

impl SagaContext {
    pub fn raw(&self, step: &str) -> Option<&Value> {
        self.results.get(step)
    }

    pub fn get<T: DeserializeOwned>(&self, step: &str) -> Option<T> {
        self.results
            .get(step)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Like [`get`](Self::get), but a missing or malformed result is an error.
    pub fn require<T: DeserializeOwned>(&self, step: &str) -> BookingResult<T> {
        let value = self.results.get(step).ok_or_else(|| {
            BookingError::Internal(anyhow::anyhow!("saga step '{step}' has no result"))
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            BookingError::Internal(anyhow::anyhow!("saga step '{step}' result malformed: {e}"))
        })
    }

    fn insert(&mut self, step: &'static str, value: Value) {
        self.results.insert(step, value);
    }
}

/// Serialize a step result for the context.
pub fn encode<T: Serialize>(value: &T) -> BookingResult<Value> {
    serde_json::to_value(value).map_err(|e| BookingError::Internal(e.into()))
}

#[async_trait]
pub trait SagaStep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Attempts before a transient failure is treated as final.
    fn max_attempts(&self) -> u32 {
        1
    }

    async fn execute(&self, ctx: &SagaContext) -> BookingResult<Value>;

    /// Undo this step. `result` is what `execute` returned.
    async fn compensate(&self, _ctx: &SagaContext, _result: &Value) -> BookingResult<()> {
        Ok(())
    }
}

pub struct Saga {
    name: &'static str,
    steps: Vec<Box<dyn SagaStep>>,
    retry_backoff: Duration,
}

impl Saga {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: vec![],
            retry_backoff: Duration::from_millis(100),
        }
    }

    pub fn step(mut self, step: impl SagaStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Run every step in order. On the first failure, completed steps are
    /// compensated newest first and the failing step's error is returned.
    pub async fn run(self) -> BookingResult<SagaContext> {
        let mut ctx = SagaContext::default();
        let mut completed: Vec<usize> = vec![];

        for (index, step) in self.steps.iter().enumerate() {
            tracing::debug!(saga = self.name, step = step.name(), "saga step starting");
            match self.run_step(step.as_ref(), &ctx).await {
                Ok(value) => {
                    tracing::debug!(saga = self.name, step = step.name(), "saga step succeeded");
                    ctx.insert(step.name(), value);
                    completed.push(index);
                }
                Err(e) => {
                    tracing::warn!(
                        saga = self.name,
                        step = step.name(),
                        error = %e,
                        "saga step failed, compensating"
                    );
                    self.compensate(&completed, &ctx).await;
                    return Err(e);
                }
            }
        }

        Ok(ctx)
    }

    async fn run_step(&self, step: &dyn SagaStep, ctx: &SagaContext) -> BookingResult<Value> {
        let max_attempts = step.max_attempts().max(1);
        let mut attempt = 1;
        loop {
            match step.execute(ctx).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    tracing::warn!(
                        saga = self.name,
                        step = step.name(),
                        attempt,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn compensate(&self, completed: &[usize], ctx: &SagaContext) {
        for &index in completed.iter().rev() {
            let step = &self.steps[index];
            let Some(result) = ctx.raw(step.name()) else {
                continue;
            };
            match step.compensate(ctx, result).await {
                Ok(()) => {
                    tracing::info!(saga = self.name, step = step.name(), "compensation succeeded");
                }
                Err(e) => {
                    tracing::error!(
                        saga = self.name,
                        step = step.name(),
                        error = %e,
                        critical = true,
                        "compensation failed, manual intervention required"
                    );
                }
            }
        }
    }
}
