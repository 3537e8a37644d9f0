//! stackforge: compose container-service infrastructure stacks as typed
//! declaration graphs, check their invariants, and synthesize them into
//! provisioning templates.

pub mod cli;
pub mod compose;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod provision;
pub mod synth;
