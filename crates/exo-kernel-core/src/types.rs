//! Core environment types
//!
//! This module contains the fundamental types used throughout the kernel core.
//! All types here are pure data - no behavior that depends on the platform.

use serde::{Deserialize, Serialize};

use crate::space::SpaceId;

// ============================================================================
// Configuration constants
// ============================================================================

/// log2 of the environment table size
pub const LOG2NENV: u32 = 10;

/// Number of slots in the environment table
pub const NENV: usize = 1 << LOG2NENV;

/// Shift applied to the generation counter when an identifier is stamped.
/// Must be at least LOG2NENV so the generation bits never collide with
/// the slot-index bits.
pub const ENVGENSHIFT: u32 = 12;

/// Size of one page of memory
pub const PAGE_SIZE: u64 = 4096;

/// First address above the user-accessible part of every address space.
/// Also doubles as the "no page transfer" sentinel in the IPC protocol.
pub const MAX_USER_ADDRESS: u64 = 0x8000_0000_0000;

/// Initial user stack pointer; one stack page is mapped just below it.
pub const USER_STACK_TOP: u64 = MAX_USER_ADDRESS;

/// Top of the user exception stack, where page-fault records are
/// delivered. Sits below the regular stack page with one unmapped
/// guard page between, so a runaway regular stack faults instead of
/// silently overwriting fault records.
pub const USER_EXC_STACK_TOP: u64 = USER_STACK_TOP - 2 * PAGE_SIZE;

/// Upper bound on loadable segments a boot image may carry
pub const MAX_LOAD_SEGMENTS: usize = 8;

/// User text segment selector
pub const GD_UT: u16 = 0x18;

/// User data segment selector
pub const GD_UD: u16 = 0x20;

// ============================================================================
// Identifiers
// ============================================================================

/// Environment identifier.
///
/// The low LOG2NENV bits are the table slot index, the bits above
/// ENVGENSHIFT are a generation counter stamped at allocation time so a
/// stale identifier never aliases the slot's next tenant. Identifiers of
/// live environments are always positive; `0` means "the calling
/// environment" wherever an identifier is accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnvId(pub i32);

impl EnvId {
    /// Alias for the calling environment
    pub const CURRENT: EnvId = EnvId(0);

    /// Table slot index encoded in this identifier
    pub const fn index(self) -> usize {
        (self.0 & (NENV as i32 - 1)) as usize
    }
}

/// Environment lifecycle status.
///
/// The numeric values are part of the syscall ABI (`env_set_status`
/// accepts raw values in the `Free..=NotRunnable` range).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Slot is unused and sits on the free list
    Free = 0,
    /// Marked for destruction; the scheduler reclaims it in passing
    Dying = 1,
    /// Ready to be dispatched
    Runnable = 2,
    /// Currently executing (at most one environment at a time)
    Running = 3,
    /// Alive but not schedulable (blocked in IPC, or a fresh exofork child)
    NotRunnable = 4,
}

impl Status {
    /// Decode a raw ABI value
    pub fn from_raw(raw: u64) -> Option<Status> {
        match raw {
            0 => Some(Status::Free),
            1 => Some(Status::Dying),
            2 => Some(Status::Runnable),
            3 => Some(Status::Running),
            4 => Some(Status::NotRunnable),
            _ => None,
        }
    }

    /// Display name, as printed by the monitor
    pub fn name(self) -> &'static str {
        match self {
            Status::Free => "FREE",
            Status::Dying => "DYING",
            Status::Runnable => "RUNNABLE",
            Status::Running => "RUNNING",
            Status::NotRunnable => "NOT_RUNNABLE",
        }
    }
}

/// Environment kind. Only `User` matters to the core; the server kinds
/// exist so system environments can be found by well-known role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvKind {
    /// Ordinary user environment
    User = 0,
    /// File server environment
    FileServer = 1,
    /// Network server environment
    NetServer = 2,
}

// ============================================================================
// Trap frame
// ============================================================================

/// Saved user register state, x86-64 shaped.
///
/// `rax` carries the syscall number on entry and the return value on
/// resume. Syscall arguments travel in `rdx`, `rcx`, `rbx`, `rdi`,
/// `rsi`, `r8`, in that order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    pub ds: u16,
    pub es: u16,
    pub trap_no: u64,
    pub err_code: u64,
    pub rip: u64,
    pub cs: u16,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u16,
}

// ============================================================================
// Environment descriptor
// ============================================================================

/// Per-environment IPC rendezvous state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IpcState {
    /// True while blocked in `ipc_recv` waiting for a sender
    pub receiving: bool,
    /// Scalar delivered by the last completed send
    pub value: u64,
    /// Identifier of the last sender
    pub from: EnvId,
    /// Where a transferred page should land; >= MAX_USER_ADDRESS means
    /// the receiver wants no page
    pub dst_addr: u64,
    /// Receiver's transfer-size cap; overwritten with the size actually
    /// mapped when a send completes
    pub max_size: u64,
    /// Permission bits of the transferred mapping, 0 if none
    pub perm: u32,
}

impl Default for EnvId {
    fn default() -> Self {
        EnvId(0)
    }
}

/// One environment table slot
#[derive(Clone, Debug)]
pub struct Env {
    /// Unique identifier, 0 while the slot is free
    pub id: EnvId,
    /// Identifier of the creating environment (0 for boot environments)
    pub parent: EnvId,
    /// Environment kind
    pub kind: EnvKind,
    /// Lifecycle status
    pub status: Status,
    /// Number of times this environment has been dispatched
    pub runs: u64,
    /// Handle of this environment's address space
    pub space: SpaceId,
    /// Saved user registers
    pub trap_frame: TrapFrame,
    /// Entry point of the user page-fault handler, 0 if not installed
    pub pgfault_upcall: u64,
    /// IPC rendezvous state
    pub ipc: IpcState,
    /// Next slot on the free list, when this slot is free
    pub(crate) free_link: Option<usize>,
}

impl Env {
    /// A free slot, as the table is initialized with
    pub(crate) fn free_slot(free_link: Option<usize>) -> Env {
        Env {
            id: EnvId(0),
            parent: EnvId(0),
            kind: EnvKind::User,
            status: Status::Free,
            runs: 0,
            space: SpaceId(0),
            trap_frame: TrapFrame::default(),
            pgfault_upcall: 0,
            ipc: IpcState::default(),
            free_link,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
