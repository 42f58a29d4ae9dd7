//! Exokernel core - pure environment state machine
//!
//! This crate contains the **pure, platform-free** process core of the
//! kernel: the environment table, identifier codec, lifecycle manager,
//! scheduler decision function, IPC rendezvous engine, boot-image loader
//! and invariant checks.
//!
//! # Design principles
//!
//! 1. **No platform dependency**: console, traps and page tables live
//!    behind traits; everything here is state transformation
//! 2. **Deterministic**: same inputs always produce the same table
//! 3. **Decisions, not divergence**: operations that end in a context
//!    switch return a decision value; only the runtime wrapper in
//!    `exo-kernel` actually never returns
//!
//! # Module organization
//!
//! - `types` - environment types and configuration constants
//! - `error` - the kernel error taxonomy and wire codes
//! - `abi` - syscall numbers shared with the user-side library
//! - `space` - the `AddressSpaces` boundary trait and protection flags
//! - `env` - the environment table and lifecycle transitions
//! - `fault` - page-fault record encoding and upcall delivery
//! - `sched` - the round-robin scheduling decision function
//! - `ipc` - the synchronous rendezvous engine
//! - `load` - the ELF64 boot-image loader
//! - `invariants` - runtime-checkable table invariants

#![no_std]
extern crate alloc;

pub mod abi;
pub mod env;
pub mod error;
pub mod fault;
pub mod invariants;
pub mod ipc;
pub mod load;
pub mod sched;
pub mod space;
pub mod types;

// Re-export the public surface for convenient access
pub use env::EnvTable;
pub use error::KernelError;
pub use fault::{FaultRecord, FAULT_RECORD_SIZE};
pub use invariants::{check_all_invariants, InvariantViolation};
pub use load::load_image;
pub use sched::{schedule, SchedDecision};
pub use space::{AddressSpaces, SpaceId};
pub use types::{
    Env, EnvId, EnvKind, IpcState, Status, TrapFrame, ENVGENSHIFT, MAX_LOAD_SEGMENTS,
    MAX_USER_ADDRESS, NENV, PAGE_SIZE, USER_EXC_STACK_TOP, USER_STACK_TOP,
};

#[cfg(any(test, feature = "std"))]
pub use space::MockSpaces;
