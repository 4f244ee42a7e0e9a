//! # Runtime Module
//!
//! Process start-up and the top-level run of the `cm-deployer` binary.

pub mod initialization;

pub use initialization::*;
