//! Runtime-checkable invariants over the environment table
//!
//! Used by the test suites after every interesting transition, and
//! available to the runtime for development-time assertion sweeps.
//!
//! # Invariants
//!
//! 1. **Free-list partition**: every FREE slot is on the free list
//!    exactly once, and no live slot is on it
//! 2. **Identifier agreement**: a live slot's identifier is positive and
//!    its index bits name the slot it occupies
//! 3. **Single RUNNING**: at most one environment is RUNNING, and it is
//!    the one the table considers current
//! 4. **Receiver parked**: an environment registered as receiving is
//!    NOT_RUNNABLE

use alloc::string::String;
use alloc::vec::Vec;

use crate::env::EnvTable;
use crate::types::{Status, NENV};

/// An invariant violation with details
#[derive(Clone, Debug)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: &'static str,
    /// Description of what went wrong
    pub description: String,
}

/// Check all table invariants.
///
/// Returns a list of violations (empty if all invariants hold).
pub fn check_all_invariants(table: &EnvTable) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    violations.extend(check_free_list_partition(table));
    violations.extend(check_identifier_agreement(table));
    violations.extend(check_single_running(table));
    violations.extend(check_receiver_parked(table));

    violations
}

/// Invariant 1: FREE slots and the free list are the same set
fn check_free_list_partition(table: &EnvTable) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    let mut on_list = [false; NENV];
    let mut cursor = table.free_head();
    let mut hops = 0;
    while let Some(idx) = cursor {
        if hops > NENV {
            violations.push(InvariantViolation {
                invariant: "free_list_partition",
                description: String::from("free list contains a cycle"),
            });
            return violations;
        }
        if on_list[idx] {
            violations.push(InvariantViolation {
                invariant: "free_list_partition",
                description: alloc::format!("slot {} appears on the free list twice", idx),
            });
            return violations;
        }
        on_list[idx] = true;
        cursor = table.get(idx).free_link;
        hops += 1;
    }

    for idx in 0..NENV {
        let free = table.get(idx).status == Status::Free;
        if free && !on_list[idx] {
            violations.push(InvariantViolation {
                invariant: "free_list_partition",
                description: alloc::format!("slot {} is FREE but not on the free list", idx),
            });
        }
        if !free && on_list[idx] {
            violations.push(InvariantViolation {
                invariant: "free_list_partition",
                description: alloc::format!("slot {} is live but on the free list", idx),
            });
        }
    }

    violations
}

/// Invariant 2: live identifiers are positive and index their own slot
fn check_identifier_agreement(table: &EnvTable) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (idx, env) in table.iter().enumerate() {
        if env.status == Status::Free {
            continue;
        }
        if env.id.0 <= 0 {
            violations.push(InvariantViolation {
                invariant: "identifier_agreement",
                description: alloc::format!(
                    "slot {} is live with non-positive id {}",
                    idx,
                    env.id.0
                ),
            });
        }
        if env.id.index() != idx {
            violations.push(InvariantViolation {
                invariant: "identifier_agreement",
                description: alloc::format!(
                    "slot {} holds id {:08x} whose index bits say {}",
                    idx,
                    env.id.0,
                    env.id.index()
                ),
            });
        }
    }

    violations
}

/// Invariant 3: at most one RUNNING environment, and it is the current one
fn check_single_running(table: &EnvTable) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    let running: Vec<usize> = table
        .iter()
        .enumerate()
        .filter(|(_, e)| e.status == Status::Running)
        .map(|(i, _)| i)
        .collect();

    if running.len() > 1 {
        violations.push(InvariantViolation {
            invariant: "single_running",
            description: alloc::format!("{} environments are RUNNING at once", running.len()),
        });
    }
    if let [idx] = running[..] {
        if table.cur_index() != Some(idx) {
            violations.push(InvariantViolation {
                invariant: "single_running",
                description: alloc::format!(
                    "slot {} is RUNNING but the table's current slot is {:?}",
                    idx,
                    table.cur_index()
                ),
            });
        }
    }

    violations
}

/// Invariant 4: a receiving environment is blocked
fn check_receiver_parked(table: &EnvTable) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (idx, env) in table.iter().enumerate() {
        if env.status == Status::Free {
            continue;
        }
        if env.ipc.receiving && env.status != Status::NotRunnable {
            violations.push(InvariantViolation {
                invariant: "receiver_parked",
                description: alloc::format!(
                    "slot {} is receiving but has status {}",
                    idx,
                    env.status.name()
                ),
            });
        }
    }

    violations
}

// ============================================================================
// Tests
// ============================================================================
