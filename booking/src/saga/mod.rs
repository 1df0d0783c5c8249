//! Saga orchestration for the booking lifecycle.

pub mod log;
pub mod orchestrator;
