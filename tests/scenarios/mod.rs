//! Scenario-based tests for voxchain

mod archive_conflicts;
mod chain_routing;
mod failure_handling;
mod fan_out;
mod reentrancy;
