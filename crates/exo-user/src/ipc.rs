//! Blocking IPC wrappers
//!
//! `sys_ipc_try_send` fails fast when the target is not waiting; the
//! send wrapper turns that into a polite retry loop, yielding the CPU
//! between attempts so the target gets a chance to reach its receive.

use exo_kernel_core::{EnvId, KernelError, MAX_USER_ADDRESS};

use crate::{IpcMessage, Syscalls};

/// Send a message, retrying until the target is ready to receive.
///
/// Any error other than the target not being parked in receive is
/// returned as-is.
pub fn send<S: Syscalls>(
    sys: &mut S,
    to: EnvId,
    value: u64,
    src_addr: u64,
    size: u64,
    perm: u32,
) -> Result<(), KernelError> {
    loop {
        match sys.sys_ipc_try_send(to, value, src_addr, size, perm) {
            Ok(()) => return Ok(()),
            Err(KernelError::NotReceiving) => sys.sys_yield(),
            Err(e) => return Err(e),
        }
    }
}

/// Send a bare value, no page attached.
pub fn send_value<S: Syscalls>(sys: &mut S, to: EnvId, value: u64) -> Result<(), KernelError> {
    send(sys, to, value, MAX_USER_ADDRESS, 0, 0)
}

/// Block until a message arrives, accepting a page into `dst_addr`.
pub fn recv<S: Syscalls>(
    sys: &mut S,
    dst_addr: u64,
    max_size: u64,
) -> Result<IpcMessage, KernelError> {
    sys.sys_ipc_recv(dst_addr, max_size)
}

/// Block until a message arrives, declining any offered page.
pub fn recv_value<S: Syscalls>(sys: &mut S) -> Result<IpcMessage, KernelError> {
    sys.sys_ipc_recv(MAX_USER_ADDRESS, 0)
}

// ============================================================================
// Tests
// ============================================================================
