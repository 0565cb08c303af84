// SPDX-License-Identifier: MIT

//! Steps and the suspend/resume primitive
//!
//! A step is a function of the current state to a partial update. A step may
//! instead suspend the whole run by calling [`StepContext::interrupt`] and
//! propagating the returned signal with `?`. The executor checkpoints the run
//! and hands the interrupt payload back to the caller.
//!
//! # Replay
//!
//! Resuming re-runs the suspended step from its first line. The context then
//! holds the resume values supplied so far for this invocation, so the i-th
//! `interrupt` call returns the i-th value instead of suspending. To the step
//! this looks like an ordinary call that returned a string.
//!
//! Everything a step does *before* an `interrupt` call therefore runs again on
//! every resume. That code must be idempotent: printing a preview is fine,
//! bumping a counter or calling a paid API is not. The engine does not detect
//! violations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::state::FlowState;
use crate::adk::error::ReqflowError;

/// Payload handed to the caller when a step suspends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    /// Step that suspended
    pub step: String,
    /// Position of the `interrupt` call within the step invocation
    pub index: usize,
    /// Opaque prompt for whoever supplies the resume value
    pub value: Value,
}

/// Why a step did not produce an update
#[derive(Debug)]
pub enum StepSignal {
    /// The step asked to suspend the run
    Interrupt(Interrupt),
    /// The step failed; the run stays at this step
    Failed(ReqflowError),
}

impl From<ReqflowError> for StepSignal {
    fn from(err: ReqflowError) -> Self {
        Self::Failed(err)
    }
}

pub type StepResult<U> = Result<U, StepSignal>;

/// Per-invocation context passed to a step
#[derive(Debug)]
pub struct StepContext {
    run_id: String,
    step: String,
    resume_values: Vec<String>,
    cursor: usize,
}

impl StepContext {
    pub fn new(
        run_id: impl Into<String>,
        step: impl Into<String>,
        resume_values: Vec<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            step: step.into(),
            resume_values,
            cursor: 0,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn step_name(&self) -> &str {
        &self.step
    }

    /// True if this invocation is a replay after at least one resume
    pub fn is_resumed(&self) -> bool {
        !self.resume_values.is_empty()
    }

    /// Suspend the run until the caller supplies a value
    ///
    /// Returns the resume value for this call site if one was supplied,
    /// otherwise a [`StepSignal::Interrupt`] carrying `prompt` that the step
    /// must propagate with `?`. Each value answers exactly one call; see the
    /// module docs for the replay contract.
    pub fn interrupt(&mut self, prompt: impl Into<Value>) -> Result<String, StepSignal> {
        let index = self.cursor;
        self.cursor += 1;

        match self.resume_values.get(index) {
            Some(value) => {
                log::debug!(
                    "Run {} step {} interrupt #{} answered on replay",
                    self.run_id,
                    self.step,
                    index
                );
                Ok(value.clone())
            }
            None => Err(StepSignal::Interrupt(Interrupt {
                step: self.step.clone(),
                index,
                value: prompt.into(),
            })),
        }
    }

    /// Resume values no `interrupt` call asked for
    pub fn unconsumed(&self) -> usize {
        self.resume_values.len().saturating_sub(self.cursor)
    }

    /// Give back the resume values so a suspended or failed step can be replayed
    pub fn into_resume_values(self) -> Vec<String> {
        self.resume_values
    }
}

/// A named unit of work in a workflow graph
///
/// Steps hold no state between invocations; all continuity lives in the run
/// state and its checkpoint. Code before an `interrupt` call must be safe to
/// run more than once.
#[async_trait]
pub trait Step<S: FlowState>: Send + Sync {
    async fn run(&self, state: &S, ctx: &mut StepContext) -> StepResult<S::Update>;
}

/// Adapter turning a synchronous closure into a step
pub struct FnStep<F>(pub F);

#[async_trait]
impl<S, F> Step<S> for FnStep<F>
where
    S: FlowState,
    F: Fn(&S, &mut StepContext) -> StepResult<S::Update> + Send + Sync,
{
    async fn run(&self, state: &S, ctx: &mut StepContext) -> StepResult<S::Update> {
        (self.0)(state, ctx)
    }
}
