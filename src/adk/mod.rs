// SPDX-License-Identifier: MIT

pub mod error;
pub mod generator;
pub mod model;
