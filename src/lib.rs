//! STAKEWISE: Automated Sports-Wager Decision Engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod normalize;
pub mod model;
pub mod brokers;
pub mod budget;
pub mod strategy;
pub mod ledger;
pub mod engine;
pub mod scheduler;
pub mod storage;
pub mod api;
