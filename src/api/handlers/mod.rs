//! API handlers for the verification flow gateway.

pub mod flow;
pub mod health;
pub mod root;
