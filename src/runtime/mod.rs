//! Runtime system
//!
//! The cooperative scheduler and the hosts it runs on.

pub mod host;
pub mod scheduler;
