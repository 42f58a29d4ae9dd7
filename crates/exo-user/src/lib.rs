//! User-level runtime
//!
//! The kernel keeps its mechanisms minimal; policy lives here, in user
//! space. This crate carries the protocols every user program builds
//! on: copy-on-write [`fork`] and the blocking [`ipc`] wrappers, both
//! written against the [`Syscalls`] trait so the tests can drive them
//! without a kernel underneath.
//!
//! On a real build the trait is implemented by the syscall trampoline;
//! each method loads the number and arguments into registers and traps.

#![no_std]

pub mod fork;
pub mod ipc;

pub use exo_kernel_core::abi;
pub use fork::{fork, install_pgfault_upcall};

use exo_kernel_core::{EnvId, KernelError, Status};

/// One received IPC message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IpcMessage {
    /// The 64-bit payload
    pub value: u64,
    /// Identifier of the sender
    pub from: EnvId,
    /// Bytes actually transferred when a page came along, 0 otherwise
    pub size: u64,
    /// Protection of the transferred page, 0 when none came
    pub perm: u32,
}

/// The raw syscall surface, one method per kernel entry.
///
/// `EnvId(0)` names the calling environment, as it does at the kernel
/// boundary.
pub trait Syscalls {
    fn sys_getenvid(&mut self) -> EnvId;

    fn sys_env_destroy(&mut self, env: EnvId) -> Result<(), KernelError>;

    fn sys_exofork(&mut self) -> Result<EnvId, KernelError>;

    fn sys_env_set_status(&mut self, env: EnvId, status: Status) -> Result<(), KernelError>;

    fn sys_env_set_pgfault_upcall(&mut self, env: EnvId, entry: u64) -> Result<(), KernelError>;

    fn sys_yield(&mut self);

    fn sys_alloc_region(
        &mut self,
        env: EnvId,
        addr: u64,
        size: u64,
        perm: u32,
    ) -> Result<(), KernelError>;

    fn sys_map_region(
        &mut self,
        src: EnvId,
        src_addr: u64,
        dst: EnvId,
        dst_addr: u64,
        size: u64,
        perm: u32,
    ) -> Result<(), KernelError>;

    fn sys_unmap_region(&mut self, env: EnvId, addr: u64, size: u64) -> Result<(), KernelError>;

    fn sys_region_refs(&mut self, addr: u64, size: u64, addr2: u64, size2: u64) -> i64;

    fn sys_ipc_try_send(
        &mut self,
        to: EnvId,
        value: u64,
        src_addr: u64,
        size: u64,
        perm: u32,
    ) -> Result<(), KernelError>;

    /// Block until a message arrives.
    fn sys_ipc_recv(&mut self, dst_addr: u64, max_size: u64) -> Result<IpcMessage, KernelError>;

    /// Re-read this environment's identity from the kernel.
    ///
    /// Cached identity goes stale across `sys_exofork`: the child wakes
    /// up with the parent's copy.
    fn refresh_identity(&mut self);

    /// Entry point of this program's page-fault handler trampoline
    fn pgfault_upcall(&self) -> u64;
}
