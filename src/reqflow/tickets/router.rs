// SPDX-License-Identifier: MIT

//! Routing after human review

use super::state::TicketState;
use super::{ANALYZE_SPEC, SAVE_TICKETS};

/// Reply that accepts the draft
pub const APPROVE: &str = "approve";

/// `approve` (any ASCII case) saves the draft; anything else, including an
/// empty reply, sends it back to the analyst as feedback
pub fn route_after_review(state: &TicketState) -> String {
    let approved = state
        .review_input
        .as_deref()
        .is_some_and(|reply| reply.eq_ignore_ascii_case(APPROVE));

    if approved {
        SAVE_TICKETS.to_string()
    } else {
        log::info!("Review rejected the draft, looping back to '{}'", ANALYZE_SPEC);
        ANALYZE_SPEC.to_string()
    }
}
