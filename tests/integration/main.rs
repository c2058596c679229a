//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that drives a booted node through one
//! protocol flow against the mock bus. All tests run on the host (x86_64)
//! with no real hardware required.

mod allocation_flow_tests;
mod mock_bus;
mod param_rpc_tests;
mod scenario_tests;
