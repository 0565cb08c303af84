// SPDX-License-Identifier: MIT

//! reqflow: turn a free-form requirement into reviewed Azure DevOps work items
//!
//! `adk` holds the model and generator kit, `reqflow::workflow` the resumable
//! graph engine and `reqflow::tickets` the requirement-to-work-items workflow
//! built on top of it.

pub mod adk;
pub mod reqflow;
