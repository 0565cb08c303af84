// SPDX-License-Identifier: MIT

//! State of a ticket-drafting run

use serde::{Deserialize, Serialize};

use super::export::ExportOutcome;
use crate::reqflow::workflow::state::FlowState;

/// Everything a ticket run knows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketState {
    /// The requirement as given at start; never changed afterwards
    pub input_text: String,
    /// Gap analysis of the requirement
    pub analysis: Option<String>,
    /// Draft work items, as returned by the drafter (ideally a JSON array)
    pub tickets: Option<String>,
    /// Last answer of the reviewer: `approve` or feedback
    pub review_input: Option<String>,
    /// What the export produced once the draft was approved
    pub export: Option<ExportOutcome>,
}

impl TicketState {
    pub fn new(input_text: impl Into<String>) -> Self {
        Self {
            input_text: input_text.into(),
            ..Default::default()
        }
    }

    /// Reviewer feedback worth passing back to the analyst
    pub fn feedback(&self) -> Option<&str> {
        self.review_input.as_deref().filter(|s| !s.is_empty())
    }
}

/// Partial update returned by ticket steps
///
/// There is no `input_text` field: the requirement cannot change mid-run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketUpdate {
    pub analysis: Option<String>,
    pub tickets: Option<String>,
    pub review_input: Option<String>,
    pub export: Option<ExportOutcome>,
}

impl FlowState for TicketState {
    type Update = TicketUpdate;

    fn merge(&self, update: TicketUpdate) -> Self {
        Self {
            input_text: self.input_text.clone(),
            analysis: update.analysis.or_else(|| self.analysis.clone()),
            tickets: update.tickets.or_else(|| self.tickets.clone()),
            review_input: update.review_input.or_else(|| self.review_input.clone()),
            export: update.export.or_else(|| self.export.clone()),
        }
    }
}
