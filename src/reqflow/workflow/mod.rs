// SPDX-License-Identifier: MIT

pub mod checkpoint;
pub mod executor;
pub mod graph;
pub mod state;
pub mod step;

pub use checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
pub use executor::{Executor, RunSnapshot, RunStatus};
pub use graph::{CompiledGraph, StateGraph, END};
pub use state::{FlowState, MapState, MapUpdate};
pub use step::{FnStep, Interrupt, Step, StepContext, StepResult, StepSignal};
