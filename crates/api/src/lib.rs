//! HTTP API: a thin JSON surface over the inventory ledger.

pub mod app;
pub mod context;
pub mod middleware;
