//! Cooperative round-robin scheduling
//!
//! The policy is a pure decision function over the environment table so
//! it can be tested directly; the runtime drives the divergent dispatch
//! loop around it.

use crate::env::EnvTable;
use crate::space::AddressSpaces;
use crate::types::{Status, NENV};

/// What the runtime should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedDecision {
    /// Dispatch the environment in this slot
    Run(usize),
    /// Something is alive but nothing is dispatchable right now; halt
    /// until an interrupt and scan again
    Idle,
    /// Nothing RUNNABLE or RUNNING anywhere; drop into the monitor
    Monitor,
}

/// Pick the next environment to run.
///
/// Scans the table circularly starting just past the running
/// environment (from slot 0 when there is none). The first RUNNABLE
/// slot wins; DYING slots are reclaimed in passing. Finding another
/// RUNNING slot mid-scan means the single-RUNNING invariant broke and
/// the kernel panics. If the scan comes up empty and the incumbent is
/// still RUNNING it is re-dispatched; a DYING incumbent is reclaimed
/// before the halt decision.
pub fn schedule<M: AddressSpaces>(table: &mut EnvTable, mem: &mut M) -> SchedDecision {
    let start = match table.cur_index() {
        Some(c) => c + 1,
        None => 0,
    };

    for off in 0..NENV {
        let idx = (start + off) % NENV;
        if Some(idx) == table.cur_index() {
            break;
        }
        match table.get(idx).status {
            Status::Free | Status::NotRunnable => {}
            Status::Runnable => return SchedDecision::Run(idx),
            Status::Dying => table.free(mem, idx),
            Status::Running => {
                panic!("schedule: two environments with status RUNNING")
            }
        }
    }

    if let Some(c) = table.cur_index() {
        match table.get(c).status {
            Status::Running => return SchedDecision::Run(c),
            Status::Dying => table.free(mem, c),
            _ => {}
        }
    }

    table.clear_cur();
    let alive = table
        .iter()
        .any(|e| matches!(e.status, Status::Runnable | Status::Running));
    if alive {
        SchedDecision::Idle
    } else {
        SchedDecision::Monitor
    }
}

// ============================================================================
// Tests
// ============================================================================
