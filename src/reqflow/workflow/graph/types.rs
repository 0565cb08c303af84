// SPDX-License-Identifier: MIT

//! Graph type definitions
//!
//! Edges map a step to its successor: either a fixed step name or a router
//! that picks one of a declared set of names from the current state.

use std::fmt;
use std::sync::Arc;

/// Pseudo-step name marking the end of a run
pub const END: &str = "__end__";

/// Picks the successor of a step from the state it produced
pub trait Router<S>: Send + Sync {
    fn route(&self, state: &S) -> String;
}

impl<S, F> Router<S> for F
where
    F: Fn(&S) -> String + Send + Sync,
{
    fn route(&self, state: &S) -> String {
        self(state)
    }
}

/// Outgoing edge of a step
pub enum Edge<S> {
    /// Always continue with this step (or [`END`])
    Fixed(String),
    /// Ask the router; its answer must be one of `targets`
    Conditional {
        router: Arc<dyn Router<S>>,
        targets: Vec<String>,
    },
}

impl<S> Edge<S> {
    /// Every successor this edge may lead to
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Fixed(to) => vec![to.as_str()],
            Edge::Conditional { targets, .. } => targets.iter().map(|t| t.as_str()).collect(),
        }
    }
}

impl<S> fmt::Debug for Edge<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Fixed(to) => f.debug_tuple("Fixed").field(to).finish(),
            Edge::Conditional { targets, .. } => f
                .debug_struct("Conditional")
                .field("targets", targets)
                .finish_non_exhaustive(),
        }
    }
}
