//! Optional, injected tracing of pipeline stages.
//!
//! Every component receives an `Arc<dyn Tracer>` at construction and calls
//! it before and after its stage. [`NoopTracer`] is the default; the
//! pipeline behaves identically with it. Run-level labels live in an
//! explicit [`TraceContext`] rather than in process-wide state.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// Pipeline stages reported to a [`Tracer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Split,
    Embed,
    Index,
    Retrieve,
    FormatContext,
    AssemblePrompt,
    Generate,
    Chain,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Split => "split",
            Stage::Embed => "embed",
            Stage::Index => "index",
            Stage::Retrieve => "retrieve",
            Stage::FormatContext => "format_context",
            Stage::AssemblePrompt => "assemble_prompt",
            Stage::Generate => "generate",
            Stage::Chain => "chain",
        }
    }
}

/// Labels attached to every event of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceContext {
    #[serde(default)]
    pub run_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl TraceContext {
    pub fn named(run_name: impl Into<String>) -> Self {
        Self {
            run_name: run_name.into(),
            ..Self::default()
        }
    }
}

/// How a stage ended.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub elapsed: Duration,
    /// Number of items the stage produced (pages, chunks, vectors, results, bytes of text).
    pub items: usize,
    /// Error kind when the stage failed.
    pub error: Option<&'static str>,
}

impl StageOutcome {
    pub fn ok(elapsed: Duration, items: usize) -> Self {
        Self {
            elapsed,
            items,
            error: None,
        }
    }

    pub fn failed(elapsed: Duration, err: &RagError) -> Self {
        Self {
            elapsed,
            items: 0,
            error: Some(err.kind()),
        }
    }
}

/// Cross-cutting observer of pipeline stages.
pub trait Tracer: Send + Sync {
    fn stage_started(&self, stage: Stage, ctx: &TraceContext);
    fn stage_finished(&self, stage: Stage, ctx: &TraceContext, outcome: &StageOutcome);
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn stage_started(&self, _stage: Stage, _ctx: &TraceContext) {}
    fn stage_finished(&self, _stage: Stage, _ctx: &TraceContext, _outcome: &StageOutcome) {}
}

/// Shared no-op tracer handle.
pub fn noop() -> Arc<dyn Tracer> {
    Arc::new(NoopTracer)
}

/// Emits one `tracing` event per stage boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn stage_started(&self, stage: Stage, ctx: &TraceContext) {
        tracing::debug!(
            run = %ctx.run_name,
            tags = ?ctx.tags,
            stage = stage.as_str(),
            "stage started"
        );
    }

    fn stage_finished(&self, stage: Stage, ctx: &TraceContext, outcome: &StageOutcome) {
        let elapsed_ms = outcome.elapsed.as_millis() as u64;
        match outcome.error {
            None => tracing::info!(
                run = %ctx.run_name,
                stage = stage.as_str(),
                elapsed_ms,
                items = outcome.items,
                "stage finished"
            ),
            Some(kind) => tracing::warn!(
                run = %ctx.run_name,
                stage = stage.as_str(),
                elapsed_ms,
                error = kind,
                "stage failed"
            ),
        }
    }
}

/// A recorded stage boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    pub at: DateTime<Utc>,
    pub run_name: String,
    pub stage: Stage,
    /// `None` for a start event.
    pub outcome: Option<StageOutcome>,
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct MemoryTracer {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemoryTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Stages that finished successfully, in completion order.
    pub fn completed_stages(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter(|e| matches!(&e.outcome, Some(o) if o.error.is_none()))
            .map(|e| e.stage)
            .collect()
    }

    fn record(&self, stage: Stage, ctx: &TraceContext, outcome: Option<StageOutcome>) {
        if let Ok(mut events) = self.events.lock() {
            events.push(TraceEvent {
                at: Utc::now(),
                run_name: ctx.run_name.clone(),
                stage,
                outcome,
            });
        }
    }
}

impl Tracer for MemoryTracer {
    fn stage_started(&self, stage: Stage, ctx: &TraceContext) {
        self.record(stage, ctx, None);
    }

    fn stage_finished(&self, stage: Stage, ctx: &TraceContext, outcome: &StageOutcome) {
        self.record(stage, ctx, Some(outcome.clone()));
    }
}

/// Run `f` as `stage`, reporting start and finish to `tracer`.
///
/// `count` maps a successful output to the number of items it holds.
pub fn traced<T>(
    tracer: &dyn Tracer,
    ctx: &TraceContext,
    stage: Stage,
    count: impl FnOnce(&T) -> usize,
    f: impl FnOnce() -> Result<T, RagError>,
) -> Result<T, RagError> {
    tracer.stage_started(stage, ctx);
    let started = std::time::Instant::now();
    let result = f();
    finish(tracer, ctx, stage, started, &result, count);
    result
}

/// Async counterpart of [`traced`].
pub async fn traced_async<T, F>(
    tracer: &dyn Tracer,
    ctx: &TraceContext,
    stage: Stage,
    count: impl FnOnce(&T) -> usize,
    fut: F,
) -> Result<T, RagError>
where
    F: std::future::Future<Output = Result<T, RagError>>,
{
    tracer.stage_started(stage, ctx);
    let started = std::time::Instant::now();
    let result = fut.await;
    finish(tracer, ctx, stage, started, &result, count);
    result
}

fn finish<T>(
    tracer: &dyn Tracer,
    ctx: &TraceContext,
    stage: Stage,
    started: std::time::Instant,
    result: &Result<T, RagError>,
    count: impl FnOnce(&T) -> usize,
) {
    let outcome = match result {
        Ok(value) => StageOutcome::ok(started.elapsed(), count(value)),
        Err(e) => StageOutcome::failed(started.elapsed(), e),
    };
    tracer.stage_finished(stage, ctx, &outcome);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_tracer_records_start_and_finish() {
        let tracer = MemoryTracer::new();
        let ctx = TraceContext::named("unit");
        let out = traced(&tracer, &ctx, Stage::Split, |v: &Vec<u8>| v.len(), || {
            Ok(vec![1, 2, 3])
        })
        .unwrap();
        assert_eq!(out.len(), 3);

        let events = tracer.events();
        assert_eq!(events.len(), 2);
        assert!(events[0].outcome.is_none());
        assert_eq!(events[1].outcome.as_ref().unwrap().items, 3);
        assert_eq!(events[1].run_name, "unit");
        assert_eq!(tracer.completed_stages(), vec![Stage::Split]);
    }

    #[test]
    fn failures_are_recorded_with_kind() {
        let tracer = MemoryTracer::new();
        let ctx = TraceContext::default();
        let result: Result<(), RagError> =
            traced(&tracer, &ctx, Stage::Load, |_| 0, || Err(RagError::EmptyIndex));
        assert!(result.is_err());
        let events = tracer.events();
        assert_eq!(
            events[1].outcome.as_ref().unwrap().error,
            Some("empty_index")
        );
        assert!(tracer.completed_stages().is_empty());
    }

    #[test]
    fn noop_tracer_passes_results_through() {
        let ctx = TraceContext::default();
        let v = traced(&NoopTracer, &ctx, Stage::Index, |_| 1, || Ok(42)).unwrap();
        assert_eq!(v, 42);
    }
}
