// SPDX-License-Identifier: MIT

//! Workflow executor
//!
//! Drives runs through a compiled graph one step at a time. A run moves
//! `Running -> (Paused <-> Running)* -> Terminated`; a configuration error
//! moves it to `Aborted` instead. Every `start`/`resume`/`retry` call drives
//! the run until it pauses, terminates or a step fails, then returns.
//!
//! Each run has its own lock. A second call on a run that is already being
//! driven is rejected with `RunBusy`; distinct runs never share state.
//! `get_status` never takes that lock: it reads the snapshot the driving
//! loop publishes at every step boundary.
//!
//! The executor does not detect endless loops. A graph that loops back on
//! itself must be bounded by its own step and router logic.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::checkpoint::{Checkpoint, CheckpointError, CheckpointStore, MemoryCheckpointStore};
use super::graph::CompiledGraph;
use super::state::FlowState;
use super::step::{Interrupt, StepContext, StepSignal};
use crate::adk::error::WorkflowError;

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Being driven, or stopped at a failed step waiting for `retry`
    Running,
    /// Suspended in a step, waiting for `resume`
    Paused,
    /// Reached a step with no successor
    Terminated,
    /// Killed by a configuration error
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Terminated => "terminated",
            RunStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Read-only view of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot<S> {
    pub run_id: String,
    pub status: RunStatus,
    pub state: S,
    /// Step the run is suspended in, when paused
    pub paused_at: Option<String>,
    /// What the suspended step asked for, when paused
    pub interrupt: Option<Interrupt>,
    /// Step that runs next (the paused or failed step, if any)
    pub next_step: Option<String>,
    /// Completed step invocations, for diagnostics
    pub step_count: u64,
}

impl<S> RunSnapshot<S> {
    pub fn is_paused(&self) -> bool {
        self.status == RunStatus::Paused
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, RunStatus::Terminated | RunStatus::Aborted)
    }
}

/// Live bookkeeping for one run
struct RunRecord<S> {
    state: S,
    status: RunStatus,
    next_step: Option<String>,
    interrupt: Option<Interrupt>,
    resume_values: Vec<String>,
    step_count: u64,
}

impl<S: FlowState> RunRecord<S> {
    fn new(state: S, entry: &str) -> Self {
        Self {
            state,
            status: RunStatus::Running,
            next_step: Some(entry.to_string()),
            interrupt: None,
            resume_values: Vec::new(),
            step_count: 0,
        }
    }

    fn snapshot(&self, run_id: &str) -> RunSnapshot<S> {
        RunSnapshot {
            run_id: run_id.to_string(),
            status: self.status,
            state: self.state.clone(),
            paused_at: self.interrupt.as_ref().map(|i| i.step.clone()),
            interrupt: self.interrupt.clone(),
            next_step: self.next_step.clone(),
            step_count: self.step_count,
        }
    }
}

/// A run's record plus the last snapshot published from it
struct RunSlot<S> {
    record: Arc<Mutex<RunRecord<S>>>,
    latest: RwLock<RunSnapshot<S>>,
}

impl<S: FlowState> RunSlot<S> {
    fn new(run_id: &str, record: RunRecord<S>) -> Self {
        let latest = RwLock::new(record.snapshot(run_id));
        Self {
            record: Arc::new(Mutex::new(record)),
            latest,
        }
    }

    async fn publish(&self, snapshot: RunSnapshot<S>) {
        *self.latest.write().await = snapshot;
    }
}

/// Runs workflows defined by a compiled graph
pub struct Executor<S: FlowState> {
    graph: Arc<CompiledGraph<S>>,
    store: Arc<dyn CheckpointStore>,
    runs: RwLock<HashMap<String, Arc<RunSlot<S>>>>,
}

impl<S: FlowState> Executor<S> {
    pub fn new(graph: CompiledGraph<S>, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            graph: Arc::new(graph),
            store,
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Executor backed by a process-lifetime in-memory checkpoint store
    pub fn in_memory(graph: CompiledGraph<S>) -> Self {
        Self::new(graph, Arc::new(MemoryCheckpointStore::new()))
    }

    pub fn graph(&self) -> &CompiledGraph<S> {
        &self.graph
    }

    /// Create a run and drive it until it pauses or terminates
    pub async fn start(&self, run_id: &str, initial: S) -> Result<RunSnapshot<S>, WorkflowError> {
        let (slot, mut run) = {
            let mut runs = self.runs.write().await;
            if runs.contains_key(run_id) {
                return Err(WorkflowError::RunExists(run_id.to_string()));
            }
            let slot = Arc::new(RunSlot::new(
                run_id,
                RunRecord::new(initial, self.graph.entry()),
            ));
            let guard = slot
                .record
                .clone()
                .try_lock_owned()
                .map_err(|_| WorkflowError::RunBusy(run_id.to_string()))?;
            runs.insert(run_id.to_string(), slot.clone());
            (slot, guard)
        };

        log::info!("Run {} started at step '{}'", run_id, self.graph.entry());
        self.drive(run_id, &slot, &mut run).await
    }

    /// Feed `value` to the suspended step of a paused run and keep driving
    pub async fn resume(
        &self,
        run_id: &str,
        value: impl Into<String>,
    ) -> Result<RunSnapshot<S>, WorkflowError> {
        let (slot, mut run) = self.acquire(run_id).await?;
        if run.status != RunStatus::Paused {
            return Err(WorkflowError::NotPaused {
                run_id: run_id.to_string(),
                status: run.status,
            });
        }

        let checkpoint = self
            .store
            .load(run_id)
            .await?
            .ok_or_else(|| CheckpointError::NotFound(run_id.to_string()))?;
        let state: S = serde_json::from_value(checkpoint.state)
            .map_err(|e| WorkflowError::StateCodec(e.to_string()))?;

        let mut resume_values = checkpoint.resume_values;
        resume_values.push(value.into());

        run.state = state;
        run.next_step = Some(checkpoint.paused_at.clone());
        run.resume_values = resume_values;
        run.interrupt = None;
        run.step_count = checkpoint.step_count;

        log::info!(
            "Run {} resumed at step '{}' (resume value #{})",
            run_id,
            checkpoint.paused_at,
            run.resume_values.len()
        );
        self.drive(run_id, &slot, &mut run).await
    }

    /// Re-invoke the step that failed last time
    pub async fn retry(&self, run_id: &str) -> Result<RunSnapshot<S>, WorkflowError> {
        let (slot, mut run) = self.acquire(run_id).await?;
        if run.status != RunStatus::Running {
            return Err(WorkflowError::NotRetryable {
                run_id: run_id.to_string(),
                status: run.status,
            });
        }

        log::info!(
            "Run {} retrying step '{}'",
            run_id,
            run.next_step.as_deref().unwrap_or_default()
        );
        self.drive(run_id, &slot, &mut run).await
    }

    /// Latest published snapshot of a run; never changes it
    ///
    /// While a step is executing this is the state as of the step boundary
    /// before it, with status `running`.
    pub async fn get_status(&self, run_id: &str) -> Result<RunSnapshot<S>, WorkflowError> {
        let slot = self.lookup(run_id).await?;
        let snapshot = slot.latest.read().await.clone();
        Ok(snapshot)
    }

    /// Delete a run's checkpoint, then forget the run
    ///
    /// The run stays registered until the checkpoint is gone, so a `start`
    /// with the same id cannot slip in and lose its checkpoint.
    pub async fn abandon(&self, run_id: &str) -> Result<(), WorkflowError> {
        let _run = self.acquire(run_id).await?;
        self.store.delete(run_id).await?;
        self.runs.write().await.remove(run_id);
        log::info!("Run {} abandoned", run_id);
        Ok(())
    }

    /// Known run ids, sorted
    pub async fn run_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn lookup(&self, run_id: &str) -> Result<Arc<RunSlot<S>>, WorkflowError> {
        self.runs
            .read()
            .await
            .get(run_id)
            .cloned()
            .ok_or_else(|| WorkflowError::NoSuchRun(run_id.to_string()))
    }

    /// Exclusive access to a run, without waiting
    async fn acquire(
        &self,
        run_id: &str,
    ) -> Result<(Arc<RunSlot<S>>, OwnedMutexGuard<RunRecord<S>>), WorkflowError> {
        let slot = self.lookup(run_id).await?;
        let guard = slot
            .record
            .clone()
            .try_lock_owned()
            .map_err(|_| WorkflowError::RunBusy(run_id.to_string()))?;
        Ok((slot, guard))
    }

    /// Drive the run and publish its snapshot however the drive ends
    async fn drive(
        &self,
        run_id: &str,
        slot: &RunSlot<S>,
        run: &mut RunRecord<S>,
    ) -> Result<RunSnapshot<S>, WorkflowError> {
        run.status = RunStatus::Running;
        slot.publish(run.snapshot(run_id)).await;

        let result = self.drive_steps(run_id, slot, run).await;
        slot.publish(run.snapshot(run_id)).await;
        result
    }

    /// The driving loop: one step per iteration until pause, end or failure
    async fn drive_steps(
        &self,
        run_id: &str,
        slot: &RunSlot<S>,
        run: &mut RunRecord<S>,
    ) -> Result<RunSnapshot<S>, WorkflowError> {
        loop {
            let Some(step_name) = run.next_step.clone() else {
                run.status = RunStatus::Terminated;
                return Ok(run.snapshot(run_id));
            };

            let Some(step) = self.graph.step(&step_name) else {
                let err = WorkflowError::configuration(format!(
                    "step '{}' is not declared",
                    step_name
                ));
                return Err(self.abort(run_id, run, err).await);
            };

            log::info!("Run {} entering step '{}'", run_id, step_name);
            let resume_values = std::mem::take(&mut run.resume_values);
            let mut ctx = StepContext::new(run_id, &step_name, resume_values);

            let outcome = step.run(&run.state, &mut ctx).await;
            match outcome {
                Ok(update) => {
                    if ctx.unconsumed() > 0 {
                        log::warn!(
                            "Run {} step '{}' completed with {} unused resume value(s)",
                            run_id,
                            step_name,
                            ctx.unconsumed()
                        );
                    }
                    log::debug!("Run {} step '{}' update: {:?}", run_id, step_name, update);

                    run.state = run.state.merge(update);
                    run.step_count += 1;

                    match self.graph.successor(&step_name, &run.state) {
                        Ok(Some(next)) => {
                            log::info!("Run {} step '{}' -> '{}'", run_id, step_name, next);
                            run.next_step = Some(next);
                            slot.publish(run.snapshot(run_id)).await;
                        }
                        Ok(None) => {
                            run.next_step = None;
                            run.status = RunStatus::Terminated;
                            self.store.delete(run_id).await?;
                            log::info!(
                                "Run {} terminated after step '{}' ({} steps)",
                                run_id,
                                step_name,
                                run.step_count
                            );
                            return Ok(run.snapshot(run_id));
                        }
                        Err(err) => return Err(self.abort(run_id, run, err).await),
                    }
                }
                Err(StepSignal::Interrupt(interrupt)) => {
                    run.resume_values = ctx.into_resume_values();

                    let state = serde_json::to_value(&run.state)
                        .map_err(|e| WorkflowError::StateCodec(e.to_string()))?;
                    let checkpoint = Checkpoint::new(
                        run_id,
                        state,
                        interrupt.clone(),
                        run.resume_values.clone(),
                        run.step_count,
                    );
                    self.store.save(&checkpoint).await?;

                    run.interrupt = Some(interrupt);
                    run.status = RunStatus::Paused;
                    log::info!("Run {} paused at step '{}'", run_id, step_name);
                    return Ok(run.snapshot(run_id));
                }
                Err(StepSignal::Failed(source)) => {
                    // Keep the resume values so a retry replays the step as it was
                    run.resume_values = ctx.into_resume_values();
                    log::error!("Run {} step '{}' failed: {}", run_id, step_name, source);
                    return Err(WorkflowError::StepFailed {
                        run_id: run_id.to_string(),
                        step: step_name,
                        source: Box::new(source),
                    });
                }
            }
        }
    }

    async fn abort(
        &self,
        run_id: &str,
        run: &mut RunRecord<S>,
        err: WorkflowError,
    ) -> WorkflowError {
        log::error!("Run {} aborted: {}", run_id, err);
        run.status = RunStatus::Aborted;
        run.next_step = None;
        run.interrupt = None;
        run.resume_values.clear();
        if let Err(e) = self.store.delete(run_id).await {
            log::warn!("Run {}: failed to delete checkpoint: {}", run_id, e);
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::ReqflowError;
    use crate::reqflow::workflow::graph::{StateGraph, END};
    use crate::reqflow::workflow::state::{MapState, MapUpdate};
    use crate::reqflow::workflow::step::{FnStep, Step, StepResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Writes a draft that mentions the last feedback, counts invocations
    struct DraftStep {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Step<MapState> for DraftStep {
        async fn run(&self, state: &MapState, _ctx: &mut StepContext) -> StepResult<MapUpdate> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let feedback = state.get_str("feedback").unwrap_or("none");
            Ok(MapUpdate::new().set("draft", format!("draft {} (feedback: {})", n, feedback)))
        }
    }

    /// Asks for a decision; counts how often its pre-interrupt code runs
    struct ReviewStep {
        previews: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Step<MapState> for ReviewStep {
        async fn run(&self, state: &MapState, ctx: &mut StepContext) -> StepResult<MapUpdate> {
            self.previews.fetch_add(1, Ordering::SeqCst);
            let decision = ctx.interrupt(json!({ "draft": state.get("draft") }))?;
            Ok(MapUpdate::new().set("feedback", decision))
        }
    }

    fn route(state: &MapState) -> String {
        match state.get_str("feedback") {
            Some(f) if f.eq_ignore_ascii_case("approve") => "publish".to_string(),
            _ => "draft".to_string(),
        }
    }

    fn publish(_: &MapState, _: &mut StepContext) -> StepResult<MapUpdate> {
        Ok(MapUpdate::new().set("published", true))
    }

    struct Harness {
        executor: Executor<MapState>,
        store: Arc<MemoryCheckpointStore>,
        drafts: Arc<AtomicUsize>,
        previews: Arc<AtomicUsize>,
    }

    fn review_graph(
        drafts: &Arc<AtomicUsize>,
        previews: &Arc<AtomicUsize>,
    ) -> CompiledGraph<MapState> {
        StateGraph::<MapState>::new()
            .add_step("draft", DraftStep { calls: drafts.clone() })
            .add_step("review", ReviewStep { previews: previews.clone() })
            .add_step("publish", FnStep(publish))
            .add_edge("draft", "review")
            .add_conditional_edges("review", route, ["draft", "publish"])
            .add_edge("publish", END)
            .set_entry("draft")
            .compile()
            .unwrap()
    }

    fn review_loop() -> Harness {
        let drafts = Arc::new(AtomicUsize::new(0));
        let previews = Arc::new(AtomicUsize::new(0));
        let graph = review_graph(&drafts, &previews);
        let store = Arc::new(MemoryCheckpointStore::new());
        Harness {
            executor: Executor::new(graph, store.clone()),
            store,
            drafts,
            previews,
        }
    }

    fn input(text: &str) -> MapState {
        MapState::from_fields([("input_text", json!(text))])
    }

    #[tokio::test]
    async fn test_start_pauses_at_review() {
        let h = review_loop();
        let snap = h.executor.start("run-1", input("X")).await.unwrap();

        assert_eq!(snap.status, RunStatus::Paused);
        assert!(snap.is_paused());
        assert_eq!(snap.paused_at.as_deref(), Some("review"));
        assert_eq!(snap.next_step.as_deref(), Some("review"));
        assert_eq!(snap.step_count, 1);
        assert_eq!(snap.state.get_str("input_text"), Some("X"));
        assert_eq!(
            snap.state.get_str("draft"),
            Some("draft 1 (feedback: none)")
        );

        let interrupt = snap.interrupt.unwrap();
        assert_eq!(interrupt.value["draft"], "draft 1 (feedback: none)");

        let cp = h.store.load("run-1").await.unwrap().unwrap();
        assert_eq!(cp.paused_at, "review");
        assert_eq!(cp.state["draft"], "draft 1 (feedback: none)");
    }

    #[tokio::test]
    async fn test_paused_run_stays_paused() {
        let h = review_loop();
        let started = h.executor.start("run-1", input("X")).await.unwrap();

        for _ in 0..3 {
            let snap = h.executor.get_status("run-1").await.unwrap();
            assert_eq!(snap.status, RunStatus::Paused);
            assert_eq!(snap.state, started.state);
        }
        assert_eq!(h.drafts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resume_approve_terminates() {
        let h = review_loop();
        h.executor.start("run-1", input("X")).await.unwrap();

        let snap = h.executor.resume("run-1", "Approve").await.unwrap();
        assert_eq!(snap.status, RunStatus::Terminated);
        assert!(snap.is_finished());
        assert_eq!(snap.state.get("published"), Some(&json!(true)));
        assert_eq!(snap.next_step, None);
        assert_eq!(snap.step_count, 3);

        // Checkpoint is gone, the run record is archived
        assert!(h.store.load("run-1").await.unwrap().is_none());
        let status = h.executor.get_status("run-1").await.unwrap();
        assert_eq!(status.status, RunStatus::Terminated);
    }

    #[tokio::test]
    async fn test_resume_feedback_loops_back() {
        let h = review_loop();
        h.executor.start("run-1", input("X")).await.unwrap();

        let snap = h.executor.resume("run-1", "make it shorter").await.unwrap();
        assert_eq!(snap.status, RunStatus::Paused);
        assert_eq!(
            snap.state.get_str("draft"),
            Some("draft 2 (feedback: make it shorter)")
        );
        assert_eq!(h.drafts.load(Ordering::SeqCst), 2);

        // Resume again: suspends once per rejected draft
        let snap = h.executor.resume("run-1", "more detail").await.unwrap();
        assert_eq!(snap.status, RunStatus::Paused);
        assert_eq!(
            snap.state.get_str("draft"),
            Some("draft 3 (feedback: more detail)")
        );

        let snap = h.executor.resume("run-1", "approve").await.unwrap();
        assert_eq!(snap.status, RunStatus::Terminated);
        assert_eq!(h.drafts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_review_is_reentered_fresh_after_loop() {
        let h = review_loop();
        h.executor.start("run-1", input("X")).await.unwrap();
        h.executor.resume("run-1", "again").await.unwrap();

        // Initial suspend, replay on resume, fresh suspend after looping back
        assert_eq!(h.previews.load(Ordering::SeqCst), 3);
        let cp = h.store.load("run-1").await.unwrap().unwrap();
        assert!(cp.resume_values.is_empty());
    }

    #[tokio::test]
    async fn test_caller_errors() {
        let h = review_loop();

        let err = h.executor.resume("ghost", "approve").await.unwrap_err();
        assert!(matches!(err, WorkflowError::NoSuchRun(ref id) if id == "ghost"));
        assert!(matches!(
            h.executor.get_status("ghost").await.unwrap_err(),
            WorkflowError::NoSuchRun(_)
        ));

        h.executor.start("run-1", input("X")).await.unwrap();
        let err = h.executor.start("run-1", input("Y")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::RunExists(_)));

        h.executor.resume("run-1", "approve").await.unwrap();
        let err = h.executor.resume("run-1", "approve").await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::NotPaused {
                status: RunStatus::Terminated,
                ..
            }
        ));

        let err = h.executor.retry("run-1").await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotRetryable { .. }));
    }

    #[tokio::test]
    async fn test_runs_are_independent() {
        let h = review_loop();
        h.executor.start("a", input("first")).await.unwrap();
        h.executor.start("b", input("second")).await.unwrap();

        let a = h.executor.resume("a", "approve").await.unwrap();
        assert_eq!(a.status, RunStatus::Terminated);

        let b = h.executor.get_status("b").await.unwrap();
        assert_eq!(b.status, RunStatus::Paused);
        assert_eq!(b.state.get_str("input_text"), Some("second"));
        assert!(h.store.load("b").await.unwrap().is_some());

        assert_eq!(h.executor.run_ids().await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_undeclared_router_answer_aborts_run() {
        let graph = StateGraph::<MapState>::new()
            .add_step("a", FnStep(publish))
            .add_conditional_edges("a", |_: &MapState| "nowhere".to_string(), ["a", END])
            .set_entry("a")
            .compile()
            .unwrap();
        let executor = Executor::in_memory(graph);

        let err = executor.start("run-1", MapState::empty()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Configuration(ref m) if m.contains("nowhere")));

        let snap = executor.get_status("run-1").await.unwrap();
        assert_eq!(snap.status, RunStatus::Aborted);
        assert!(snap.is_finished());

        assert!(matches!(
            executor.resume("run-1", "x").await.unwrap_err(),
            WorkflowError::NotPaused {
                status: RunStatus::Aborted,
                ..
            }
        ));
        assert!(matches!(
            executor.retry("run-1").await.unwrap_err(),
            WorkflowError::NotRetryable { .. }
        ));
    }

    /// Fails until `healthy` is set
    struct FlakyStep {
        healthy: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Step<MapState> for FlakyStep {
        async fn run(&self, _state: &MapState, _ctx: &mut StepContext) -> StepResult<MapUpdate> {
            if !self.healthy.load(Ordering::SeqCst) {
                return Err(ReqflowError::api("Gemini", "quota exceeded").into());
            }
            Ok(MapUpdate::new().set("analysis", "gaps found"))
        }
    }

    #[tokio::test]
    async fn test_step_failure_leaves_run_retryable() {
        let healthy = Arc::new(AtomicBool::new(false));
        let graph = StateGraph::<MapState>::new()
            .add_step("analyze", FlakyStep { healthy: healthy.clone() })
            .add_edge("analyze", END)
            .set_entry("analyze")
            .compile()
            .unwrap();
        let executor = Executor::in_memory(graph);

        let err = executor.start("run-1", input("X")).await.unwrap_err();
        match &err {
            WorkflowError::StepFailed { run_id, step, .. } => {
                assert_eq!(run_id, "run-1");
                assert_eq!(step, "analyze");
            }
            other => panic!("Expected StepFailed, got {}", other),
        }
        assert!(err.is_retryable());

        let snap = executor.get_status("run-1").await.unwrap();
        assert_eq!(snap.status, RunStatus::Running);
        assert_eq!(snap.next_step.as_deref(), Some("analyze"));
        assert_eq!(snap.state, input("X"));
        assert_eq!(snap.step_count, 0);

        // Not paused, so resume is a caller error
        assert!(matches!(
            executor.resume("run-1", "approve").await.unwrap_err(),
            WorkflowError::NotPaused {
                status: RunStatus::Running,
                ..
            }
        ));

        // Still failing
        assert!(executor.retry("run-1").await.is_err());

        healthy.store(true, Ordering::SeqCst);
        let snap = executor.retry("run-1").await.unwrap();
        assert_eq!(snap.status, RunStatus::Terminated);
        assert_eq!(snap.state.get_str("analysis"), Some("gaps found"));
    }

    /// Suspends, then fails once after receiving a value
    struct ReviewThenFail {
        fail_once: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Step<MapState> for ReviewThenFail {
        async fn run(&self, _state: &MapState, ctx: &mut StepContext) -> StepResult<MapUpdate> {
            let decision = ctx.interrupt("decide")?;
            if self.fail_once.swap(false, Ordering::SeqCst) {
                return Err(ReqflowError::other("sink unavailable").into());
            }
            Ok(MapUpdate::new().set("decision", decision))
        }
    }

    #[tokio::test]
    async fn test_retry_after_resume_keeps_resume_value() {
        let graph = StateGraph::<MapState>::new()
            .add_step(
                "review",
                ReviewThenFail {
                    fail_once: Arc::new(AtomicBool::new(true)),
                },
            )
            .set_entry("review")
            .compile()
            .unwrap();
        let executor = Executor::in_memory(graph);

        executor.start("run-1", MapState::empty()).await.unwrap();
        assert!(executor.resume("run-1", "ship it").await.is_err());

        let snap = executor.retry("run-1").await.unwrap();
        assert_eq!(snap.status, RunStatus::Terminated);
        assert_eq!(snap.state.get_str("decision"), Some("ship it"));
    }

    /// Two questions in one step; counts replays of its opening code
    struct TwoQuestions {
        entries: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Step<MapState> for TwoQuestions {
        async fn run(&self, _state: &MapState, ctx: &mut StepContext) -> StepResult<MapUpdate> {
            self.entries.fetch_add(1, Ordering::SeqCst);
            let name = ctx.interrupt("name?")?;
            let color = ctx.interrupt("color?")?;
            Ok(MapUpdate::new().set("answer", format!("{} likes {}", name, color)))
        }
    }

    #[tokio::test]
    async fn test_multiple_interrupts_in_one_step() {
        let entries = Arc::new(AtomicUsize::new(0));
        let graph = StateGraph::<MapState>::new()
            .add_step("ask", TwoQuestions { entries: entries.clone() })
            .set_entry("ask")
            .compile()
            .unwrap();
        let executor = Executor::in_memory(graph);

        let snap = executor.start("run-1", MapState::empty()).await.unwrap();
        assert_eq!(snap.interrupt.as_ref().unwrap().value, json!("name?"));
        assert_eq!(snap.interrupt.as_ref().unwrap().index, 0);

        let snap = executor.resume("run-1", "ada").await.unwrap();
        assert_eq!(snap.status, RunStatus::Paused);
        assert_eq!(snap.interrupt.as_ref().unwrap().value, json!("color?"));
        assert_eq!(snap.interrupt.as_ref().unwrap().index, 1);

        let snap = executor.resume("run-1", "green").await.unwrap();
        assert_eq!(snap.status, RunStatus::Terminated);
        assert_eq!(snap.state.get_str("answer"), Some("ada likes green"));

        // Opening code replayed on each resume
        assert_eq!(entries.load(Ordering::SeqCst), 3);
    }

    /// Blocks until released, so a run can be observed mid-step
    struct GateStep {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl Step<MapState> for GateStep {
        async fn run(&self, _state: &MapState, _ctx: &mut StepContext) -> StepResult<MapUpdate> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(MapUpdate::new().set("done", true))
        }
    }

    #[tokio::test]
    async fn test_concurrent_calls_on_busy_run_rejected() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let graph = StateGraph::<MapState>::new()
            .add_step(
                "slow",
                GateStep {
                    entered: entered.clone(),
                    release: release.clone(),
                },
            )
            .set_entry("slow")
            .compile()
            .unwrap();
        let executor = Arc::new(Executor::in_memory(graph));

        let driver = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.start("run-1", MapState::empty()).await })
        };
        entered.notified().await;

        let snap = tokio::time::timeout(Duration::from_secs(5), executor.get_status("run-1"))
            .await
            .expect("get_status waited for the running step")
            .unwrap();
        assert_eq!(snap.status, RunStatus::Running);
        assert_eq!(snap.next_step.as_deref(), Some("slow"));
        assert_eq!(snap.step_count, 0);

        assert!(matches!(
            executor.resume("run-1", "x").await.unwrap_err(),
            WorkflowError::RunBusy(_)
        ));
        assert!(matches!(
            executor.retry("run-1").await.unwrap_err(),
            WorkflowError::RunBusy(_)
        ));
        assert!(matches!(
            executor.abandon("run-1").await.unwrap_err(),
            WorkflowError::RunBusy(_)
        ));

        release.notify_one();
        let snap = driver.await.unwrap().unwrap();
        assert_eq!(snap.status, RunStatus::Terminated);
    }

    #[tokio::test]
    async fn test_abandon_removes_run_and_checkpoint() {
        let h = review_loop();
        h.executor.start("run-1", input("X")).await.unwrap();
        assert!(h.store.load("run-1").await.unwrap().is_some());

        h.executor.abandon("run-1").await.unwrap();

        assert!(h.store.load("run-1").await.unwrap().is_none());
        assert!(matches!(
            h.executor.get_status("run-1").await.unwrap_err(),
            WorkflowError::NoSuchRun(_)
        ));
        assert!(h.executor.run_ids().await.is_empty());

        // The id can be reused
        h.executor.start("run-1", input("again")).await.unwrap();
    }

    /// Holds the first delete until released
    struct GatedDeleteStore {
        inner: MemoryCheckpointStore,
        armed: AtomicBool,
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl CheckpointStore for GatedDeleteStore {
        async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
            self.inner.save(checkpoint).await
        }

        async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
            self.inner.load(run_id).await
        }

        async fn delete(&self, run_id: &str) -> Result<(), CheckpointError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.delete(run_id).await
        }

        async fn list(&self) -> Result<Vec<String>, CheckpointError> {
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn test_restart_during_abandon_keeps_new_checkpoint() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let store = Arc::new(GatedDeleteStore {
            inner: MemoryCheckpointStore::new(),
            armed: AtomicBool::new(true),
            entered: entered.clone(),
            release: release.clone(),
        });
        let drafts = Arc::new(AtomicUsize::new(0));
        let previews = Arc::new(AtomicUsize::new(0));
        let executor = Arc::new(Executor::new(
            review_graph(&drafts, &previews),
            store.clone(),
        ));

        executor.start("r", input("first")).await.unwrap();

        let abandoning = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.abandon("r").await })
        };
        entered.notified().await;

        // Still registered while its checkpoint is being deleted
        assert!(matches!(
            executor.start("r", input("second")).await.unwrap_err(),
            WorkflowError::RunExists(_)
        ));

        release.notify_one();
        abandoning.await.unwrap().unwrap();
        assert!(store.load("r").await.unwrap().is_none());

        let snap = executor.start("r", input("second")).await.unwrap();
        assert_eq!(snap.status, RunStatus::Paused);
        let cp = store.load("r").await.unwrap().unwrap();
        assert_eq!(cp.state["input_text"], "second");

        let snap = executor.resume("r", "approve").await.unwrap();
        assert_eq!(snap.status, RunStatus::Terminated);
        assert_eq!(snap.state.get_str("input_text"), Some("second"));
    }

    #[tokio::test]
    async fn test_status_follows_step_boundaries() {
        let h = review_loop();
        h.executor.start("run-1", input("X")).await.unwrap();
        h.executor.resume("run-1", "tighten it").await.unwrap();

        let snap = h.executor.get_status("run-1").await.unwrap();
        assert_eq!(snap.status, RunStatus::Paused);
        assert_eq!(snap.step_count, 3);
        assert_eq!(
            snap.state.get_str("draft"),
            Some("draft 2 (feedback: tighten it)")
        );
    }

    #[test]
    fn test_run_status_display() {
        assert_eq!(RunStatus::Paused.to_string(), "paused");
        assert_eq!(
            serde_json::to_value(RunStatus::Terminated).unwrap(),
            json!("terminated")
        );
    }
}
