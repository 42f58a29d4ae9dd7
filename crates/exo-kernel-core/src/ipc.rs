//! Synchronous IPC rendezvous
//!
//! A receiver parks itself with [`recv`] and blocks; a sender completes
//! the rendezvous with [`try_send`], which never blocks. Addresses at or
//! above `MAX_USER_ADDRESS` mean "no page transfer" on either side.

use crate::env::EnvTable;
use crate::error::KernelError;
use crate::space::{AddressSpaces, PROT_USER};
use crate::types::{EnvId, Status, MAX_USER_ADDRESS, PAGE_SIZE};

/// Park the calling environment to wait for a message.
///
/// On success the caller is NOT_RUNNABLE with `rax` already staged to 0,
/// so the syscall completes from the receiver's point of view only when
/// a sender wakes it. Errors are returned to the caller immediately and
/// nothing is recorded.
pub fn recv(table: &mut EnvTable, dst_addr: u64, max_size: u64) -> Result<(), KernelError> {
    if dst_addr < MAX_USER_ADDRESS && dst_addr % PAGE_SIZE != 0 {
        return Err(KernelError::InvalidArgument);
    }
    if dst_addr < MAX_USER_ADDRESS && (max_size == 0 || max_size % PAGE_SIZE != 0) {
        return Err(KernelError::InvalidArgument);
    }

    let cur = table.cur_index().ok_or(KernelError::BadHandle)?;
    let env = table.get_mut(cur);
    env.ipc.receiving = true;
    env.ipc.dst_addr = dst_addr;
    env.ipc.max_size = max_size;
    env.status = Status::NotRunnable;
    env.trap_frame.rax = 0;
    Ok(())
}

/// Attempt to deliver `value` (and optionally a page) to `target`.
///
/// Fails with `NotReceiving` unless the target is parked in [`recv`].
/// A page moves only when both sides asked for one; the transfer is
/// capped at the smaller of the two sizes and the cap is written back
/// into the receiver's `max_size` field so it can see how much arrived.
/// No permission check is applied to the target identifier, so any
/// environment can be sent to. The rendezvous commits only after every
/// fallible step has succeeded.
pub fn try_send<M: AddressSpaces>(
    table: &mut EnvTable,
    mem: &mut M,
    target: EnvId,
    value: u64,
    src_addr: u64,
    size: u64,
    perm: u32,
) -> Result<(), KernelError> {
    let dst = table.resolve(target, false)?;
    let cur = table.cur_index().ok_or(KernelError::BadHandle)?;

    if !table.get(dst).ipc.receiving {
        return Err(KernelError::NotReceiving);
    }

    let dst_va = table.get(dst).ipc.dst_addr;
    if src_addr < MAX_USER_ADDRESS && dst_va < MAX_USER_ADDRESS {
        let min_size = table.get(dst).ipc.max_size.min(size);
        let src_space = table.get(cur).space;
        let dst_space = table.get(dst).space;
        mem.map(
            dst_space,
            dst_va,
            Some((src_space, src_addr)),
            min_size,
            perm | PROT_USER,
        )?;
        let receiver = table.get_mut(dst);
        receiver.ipc.max_size = min_size;
        receiver.ipc.perm = perm;
    } else {
        table.get_mut(dst).ipc.perm = 0;
    }

    let from = table.get(cur).id;
    let receiver = table.get_mut(dst);
    receiver.ipc.receiving = false;
    receiver.ipc.value = value;
    receiver.ipc.from = from;
    receiver.status = Status::Runnable;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
