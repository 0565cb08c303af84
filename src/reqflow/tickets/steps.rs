// SPDX-License-Identifier: MIT

//! Steps of the ticket workflow
//!
//! Collaborators are injected at construction; the steps themselves only
//! build prompts and shape updates.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::export::TicketExporter;
use super::state::{TicketState, TicketUpdate};
use crate::adk::generator::TextGenerator;
use crate::reqflow::workflow::step::{Step, StepContext, StepResult};

/// Question shown to the reviewer
pub const REVIEW_MESSAGE: &str =
    "Please review the tickets. Type 'approve' to save, or type your feedback to fix them.";

/// Gap analysis of the requirement, revised with reviewer feedback
pub struct AnalyzeStep {
    analyst: Arc<dyn TextGenerator>,
}

impl AnalyzeStep {
    pub fn new(analyst: Arc<dyn TextGenerator>) -> Self {
        Self { analyst }
    }

    pub fn build_prompt(state: &TicketState) -> String {
        let feedback_context = match state.feedback() {
            Some(feedback) => format!(
                "\n\nIMPORTANT: The user rejected the previous draft. Fix it based on this feedback: {}",
                feedback
            ),
            None => String::new(),
        };

        format!(
            "You are a Senior Solutions Architect. Analyze this requirement text.\n\
             Identify gaps and missing criteria.{}\n\n\
             REQUIREMENT TEXT:\n{}",
            feedback_context, state.input_text
        )
    }
}

#[async_trait]
impl Step<TicketState> for AnalyzeStep {
    async fn run(&self, state: &TicketState, _ctx: &mut StepContext) -> StepResult<TicketUpdate> {
        println!("\n--- STEP 1: {} is analyzing the requirement ---", self.analyst.name());
        if let Some(feedback) = state.feedback() {
            println!("   (Incorporating feedback: {})", feedback);
        }

        let analysis = self.analyst.generate(&Self::build_prompt(state)).await?;
        Ok(TicketUpdate {
            analysis: Some(analysis),
            ..Default::default()
        })
    }
}

/// Structured Azure DevOps work items from the requirement and its analysis
pub struct DraftStep {
    drafter: Arc<dyn TextGenerator>,
}

impl DraftStep {
    pub fn new(drafter: Arc<dyn TextGenerator>) -> Self {
        Self { drafter }
    }

    pub fn build_prompt(state: &TicketState) -> String {
        format!(
            r#"You are a Technical Product Owner.
Based on the original request and the Architect's gap analysis below,
write 3-5 structured Azure DevOps Work Items.

Return ONLY a valid JSON array. Each work item must have these exact fields:
- "Work Item Type": Must be one of: "User Story", "Task", "Bug", "Feature"
- "Title": A clear, concise title (max 100 characters)
- "Description": Detailed description of the work item
- "Acceptance Criteria": Bulleted list of criteria (use "- " for bullets)
- "Priority": Must be one of: "1", "2", "3", "4"

ORIGINAL REQUEST:
{}

ARCHITECT'S ANALYSIS:
{}

Return ONLY the JSON array, no additional text or markdown code blocks."#,
            state.input_text,
            state.analysis.as_deref().unwrap_or_default()
        )
    }
}

#[async_trait]
impl Step<TicketState> for DraftStep {
    async fn run(&self, state: &TicketState, _ctx: &mut StepContext) -> StepResult<TicketUpdate> {
        println!("\n--- STEP 2: {} is drafting work items ---", self.drafter.name());

        let tickets = self.drafter.generate(&Self::build_prompt(state)).await?;
        Ok(TicketUpdate {
            tickets: Some(tickets),
            ..Default::default()
        })
    }
}

/// Suspends the run until a human approves the draft or sends feedback
///
/// Everything before the `interrupt` call is printing, so replaying it on
/// resume only repeats the preview.
pub struct ReviewStep;

#[async_trait]
impl Step<TicketState> for ReviewStep {
    async fn run(&self, state: &TicketState, ctx: &mut StepContext) -> StepResult<TicketUpdate> {
        let draft = state.tickets.clone().unwrap_or_default();
        if !ctx.is_resumed() {
            println!("\n--- STEP 3: HUMAN REVIEW REQUIRED ---");
            println!("Current draft tickets:\n\n{}", draft);
        }

        let decision = ctx.interrupt(json!({
            "message": REVIEW_MESSAGE,
            "draft": draft,
        }))?;

        Ok(TicketUpdate {
            review_input: Some(decision),
            ..Default::default()
        })
    }
}

/// Hands the approved draft to the exporter, exactly once
pub struct SaveStep {
    exporter: Arc<dyn TicketExporter>,
}

impl SaveStep {
    pub fn new(exporter: Arc<dyn TicketExporter>) -> Self {
        Self { exporter }
    }
}

#[async_trait]
impl Step<TicketState> for SaveStep {
    async fn run(&self, state: &TicketState, _ctx: &mut StepContext) -> StepResult<TicketUpdate> {
        println!("\n--- STEP 4: Saving approved work items ---");

        let draft = state.tickets.as_deref().unwrap_or_default();
        let outcome = self.exporter.export(draft)?;
        Ok(TicketUpdate {
            export: Some(outcome),
            ..Default::default()
        })
    }
}
