//! Payment-transaction engine: stacked offers, a strict payment lifecycle,
//! and signed gateway webhook authentication.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
