//! Application layer containing the core business logic orchestration.
//!
//! This module defines the `PaymentOrchestrator`, the single entry point
//! through which transactions are created, initiated, confirmed by webhook,
//! and refunded. Lifecycle notifications are published over a broadcast
//! channel instead of callback lists.

pub mod events;
pub mod orchestrator;
