//! Integration tests for inter-subsystem communication
//!
//! This module provides tests that verify proper interaction between
//! different kernel subsystems.

#![cfg(test)]

use crate::{ipc, perf, println, process, process::ProcessId};

/// Test IPC endpoint creation and lookup
#[test_case]
fn test_ipc_message_passing() {
    process::init();
    ipc::init();

    let owner = ProcessId(1);
    let (endpoint, _capability) = ipc::create_endpoint(owner).expect("Failed to create endpoint");

    assert!(ipc::lookup_endpoint(endpoint).is_ok());
}

/// Test performance counter collection
#[test_case]
fn test_performance_monitoring() {
    perf::init().expect("Perf init failed");

    let stats = perf::get_stats();
    let _ = stats.syscalls;
    let _ = stats.context_switches;
}

#[cfg(test)]
mod module_tests {
    use super::*;

    /// Run all integration tests
    pub fn run_all() {
        test_ipc_message_passing();
        test_performance_monitoring();

        println!("[INTEGRATION] All integration tests passed!");
    }
}
