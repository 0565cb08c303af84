// SPDX-License-Identifier: MIT

//! Graph builder and compiled graph
//!
//! `StateGraph` collects steps and edges; `compile` validates the structure
//! once so that the executor only has to check router answers at run time.

use std::collections::HashMap;
use std::sync::Arc;

use super::types::{Edge, Router, END};
use crate::adk::error::WorkflowError;
use crate::reqflow::workflow::state::FlowState;
use crate::reqflow::workflow::step::Step;

/// Builder for a workflow graph
pub struct StateGraph<S: FlowState> {
    steps: HashMap<String, Arc<dyn Step<S>>>,
    order: Vec<String>,
    edges: HashMap<String, Edge<S>>,
    entry: Option<String>,
    problems: Vec<String>,
}

impl<S: FlowState> StateGraph<S> {
    pub fn new() -> Self {
        Self {
            steps: HashMap::new(),
            order: Vec::new(),
            edges: HashMap::new(),
            entry: None,
            problems: Vec::new(),
        }
    }

    /// Register a step under a unique name
    pub fn add_step(mut self, name: impl Into<String>, step: impl Step<S> + 'static) -> Self {
        let name = name.into();
        if name == END {
            self.problems
                .push(format!("'{}' is reserved and cannot name a step", END));
        } else if self.steps.contains_key(&name) {
            self.problems
                .push(format!("step '{}' is declared more than once", name));
        } else {
            self.order.push(name.clone());
            self.steps.insert(name, Arc::new(step));
        }
        self
    }

    /// Always continue from `from` to `to` (`to` may be [`END`])
    pub fn add_edge(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.insert_edge(from.into(), Edge::Fixed(to.into()))
    }

    /// Continue from `from` to whatever `router` answers, restricted to `targets`
    pub fn add_conditional_edges<I, T>(
        self,
        from: impl Into<String>,
        router: impl Router<S> + 'static,
        targets: I,
    ) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let edge = Edge::Conditional {
            router: Arc::new(router),
            targets: targets.into_iter().map(Into::into).collect(),
        };
        self.insert_edge(from.into(), edge)
    }

    /// Set the first step of every run
    pub fn set_entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    fn insert_edge(mut self, from: String, edge: Edge<S>) -> Self {
        if self.edges.contains_key(&from) {
            self.problems
                .push(format!("step '{}' has more than one outgoing edge", from));
        } else {
            self.edges.insert(from, edge);
        }
        self
    }

    /// Validate the graph and freeze it
    pub fn compile(self) -> Result<CompiledGraph<S>, WorkflowError> {
        let mut problems = self.problems;

        let entry = match self.entry {
            Some(entry) if self.steps.contains_key(&entry) => Some(entry),
            Some(entry) => {
                problems.push(format!("entry step '{}' is not declared", entry));
                None
            }
            None => {
                problems.push("no entry step set".to_string());
                None
            }
        };

        // Deterministic order keeps error messages stable
        let mut sources: Vec<&String> = self.edges.keys().collect();
        sources.sort();
        for from in sources {
            if !self.steps.contains_key(from) {
                problems.push(format!("edge from undeclared step '{}'", from));
            }
            let edge = &self.edges[from];
            if let Edge::Conditional { targets, .. } = edge {
                if targets.is_empty() {
                    problems.push(format!("conditional edge from '{}' has no targets", from));
                }
            }
            for target in edge.targets() {
                if target != END && !self.steps.contains_key(target) {
                    problems.push(format!(
                        "edge from '{}' targets undeclared step '{}'",
                        from, target
                    ));
                }
            }
        }

        match entry {
            Some(entry) if problems.is_empty() => {
                log::debug!(
                    "Compiled graph with {} steps, entry '{}'",
                    self.order.len(),
                    entry
                );
                Ok(CompiledGraph {
                    steps: self.steps,
                    order: self.order,
                    edges: self.edges,
                    entry,
                })
            }
            _ => Err(WorkflowError::configuration(problems.join("; "))),
        }
    }
}

impl<S: FlowState> Default for StateGraph<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Validated, immutable workflow graph
pub struct CompiledGraph<S: FlowState> {
    steps: HashMap<String, Arc<dyn Step<S>>>,
    order: Vec<String>,
    edges: HashMap<String, Edge<S>>,
    entry: String,
}

impl<S: FlowState> CompiledGraph<S> {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn step(&self, name: &str) -> Option<Arc<dyn Step<S>>> {
        self.steps.get(name).cloned()
    }

    /// Step names in declaration order
    pub fn step_names(&self) -> &[String] {
        &self.order
    }

    /// Successor of `from` given the state it just produced
    ///
    /// `Ok(None)` means the run is finished. A router answer outside its
    /// declared targets is a configuration error.
    pub fn successor(&self, from: &str, state: &S) -> Result<Option<String>, WorkflowError> {
        let next = match self.edges.get(from) {
            None => return Ok(None),
            Some(Edge::Fixed(to)) => to.clone(),
            Some(Edge::Conditional { router, targets }) => {
                let choice = router.route(state);
                if !targets.iter().any(|t| *t == choice) {
                    return Err(WorkflowError::configuration(format!(
                        "router after '{}' returned undeclared successor '{}' (allowed: {})",
                        from,
                        choice,
                        targets.join(", ")
                    )));
                }
                choice
            }
        };

        if next == END {
            Ok(None)
        } else {
            Ok(Some(next))
        }
    }
}
