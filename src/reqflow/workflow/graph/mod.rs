// SPDX-License-Identifier: MIT

//! Graph definition for workflows
//!
//! This module provides the step graph: named steps, fixed edges and
//! router-driven conditional edges, validated once at compile time.

mod builder;
pub mod types;

pub use builder::{CompiledGraph, StateGraph};
pub use types::{Edge, Router, END};
