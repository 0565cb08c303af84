// SPDX-License-Identifier: MIT

//! Requirement-to-work-items workflow
//!
//! ```text
//! analyze_spec -> create_tickets -> human_review --approve--> save_tickets -> END
//!      ^                                  |
//!      +-------------feedback-------------+
//! ```

pub mod export;
pub mod router;
pub mod state;
pub mod steps;

pub use export::{ExportOutcome, FileExporter, TicketExporter, WorkItem};
pub use state::{TicketState, TicketUpdate};

use std::sync::Arc;

use crate::adk::error::WorkflowError;
use crate::adk::generator::TextGenerator;
use crate::reqflow::workflow::graph::{CompiledGraph, StateGraph, END};
use router::route_after_review;
use steps::{AnalyzeStep, DraftStep, ReviewStep, SaveStep};

pub const ANALYZE_SPEC: &str = "analyze_spec";
pub const CREATE_TICKETS: &str = "create_tickets";
pub const HUMAN_REVIEW: &str = "human_review";
pub const SAVE_TICKETS: &str = "save_tickets";

/// Wire the ticket workflow around its three collaborators
pub fn build_ticket_graph(
    analyst: Arc<dyn TextGenerator>,
    drafter: Arc<dyn TextGenerator>,
    exporter: Arc<dyn TicketExporter>,
) -> Result<CompiledGraph<TicketState>, WorkflowError> {
    StateGraph::<TicketState>::new()
        .add_step(ANALYZE_SPEC, AnalyzeStep::new(analyst))
        .add_step(CREATE_TICKETS, DraftStep::new(drafter))
        .add_step(HUMAN_REVIEW, ReviewStep)
        .add_step(SAVE_TICKETS, SaveStep::new(exporter))
        .add_edge(ANALYZE_SPEC, CREATE_TICKETS)
        .add_edge(CREATE_TICKETS, HUMAN_REVIEW)
        .add_conditional_edges(HUMAN_REVIEW, route_after_review, [ANALYZE_SPEC, SAVE_TICKETS])
        .add_edge(SAVE_TICKETS, END)
        .set_entry(ANALYZE_SPEC)
        .compile()
}
