//! End-to-end integration tests.

mod mock_broker;
mod simulation;
