//! Page-fault upcall delivery
//!
//! When an environment with a registered upcall faults, the kernel
//! writes a complete snapshot of the interrupted state onto the
//! environment's exception stack and redirects only `rip` and `rsp`.
//! Every trap-time register is recoverable from the record, so the
//! handler can repair the fault and resume the interrupted instruction
//! transparently. The handler body itself is user code; resuming from
//! the record is the upcall trampoline's job.

use crate::env::EnvTable;
use crate::space::{AddressSpaces, PROT_R, PROT_W};
use crate::types::{TrapFrame, PAGE_SIZE, USER_EXC_STACK_TOP};

/// Encoded size of a fault record: fault address, error code, the
/// fifteen general-purpose registers, `rip`, `rflags` and `rsp`, one
/// little-endian u64 each.
pub const FAULT_RECORD_SIZE: u64 = 20 * 8;

/// Snapshot of the interrupted state, as delivered to the upcall.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FaultRecord {
    /// Address whose access faulted
    pub fault_addr: u64,
    /// Hardware error code of the fault
    pub err_code: u64,
    /// Trap-time register state. Segment selectors are not part of the
    /// record; they do not change across a fault and the resume path
    /// restores only general-purpose state, `rip`, `rflags` and `rsp`.
    pub tf: TrapFrame,
}

impl FaultRecord {
    /// Encode for delivery onto the exception stack.
    pub fn to_bytes(&self) -> [u8; FAULT_RECORD_SIZE as usize] {
        let words = [
            self.fault_addr,
            self.err_code,
            self.tf.r15,
            self.tf.r14,
            self.tf.r13,
            self.tf.r12,
            self.tf.r11,
            self.tf.r10,
            self.tf.r9,
            self.tf.r8,
            self.tf.rbp,
            self.tf.rdi,
            self.tf.rsi,
            self.tf.rdx,
            self.tf.rcx,
            self.tf.rbx,
            self.tf.rax,
            self.tf.rip,
            self.tf.rflags,
            self.tf.rsp,
        ];
        let mut out = [0u8; FAULT_RECORD_SIZE as usize];
        for (i, word) in words.iter().enumerate() {
            out[i * 8..i * 8 + 8].copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Decode a record, as the user-side handler does. Returns `None`
    /// when the slice is too short.
    pub fn parse(bytes: &[u8]) -> Option<FaultRecord> {
        if bytes.len() < FAULT_RECORD_SIZE as usize {
            return None;
        }
        let mut words = [0u64; 20];
        for (i, word) in words.iter_mut().enumerate() {
            let chunk: [u8; 8] = bytes[i * 8..i * 8 + 8].try_into().ok()?;
            *word = u64::from_le_bytes(chunk);
        }

        let mut tf = TrapFrame::default();
        tf.r15 = words[2];
        tf.r14 = words[3];
        tf.r13 = words[4];
        tf.r12 = words[5];
        tf.r11 = words[6];
        tf.r10 = words[7];
        tf.r9 = words[8];
        tf.r8 = words[9];
        tf.rbp = words[10];
        tf.rdi = words[11];
        tf.rsi = words[12];
        tf.rdx = words[13];
        tf.rcx = words[14];
        tf.rbx = words[15];
        tf.rax = words[16];
        tf.rip = words[17];
        tf.rflags = words[18];
        tf.rsp = words[19];

        Some(FaultRecord {
            fault_addr: words[0],
            err_code: words[1],
            tf,
        })
    }
}

/// Deliver a page fault to the environment in slot `idx`.
///
/// Returns false when the environment cannot handle the fault: no
/// upcall registered, or its exception stack is not mapped writable.
/// On success the record sits at the environment's new `rsp`, `rip`
/// points at the upcall, and no other live register is touched.
pub fn deliver<M: AddressSpaces>(
    table: &mut EnvTable,
    mem: &mut M,
    idx: usize,
    fault_addr: u64,
) -> bool {
    let env = table.get(idx);
    if env.pgfault_upcall == 0 {
        return false;
    }

    // A fault taken while already running on the exception stack nests
    // below the live record, with one scratch word between.
    let tf = env.trap_frame;
    let exc_base = USER_EXC_STACK_TOP - PAGE_SIZE;
    let top = if tf.rsp >= exc_base && tf.rsp < USER_EXC_STACK_TOP {
        tf.rsp - 8
    } else {
        USER_EXC_STACK_TOP
    };
    let Some(sp) = top.checked_sub(FAULT_RECORD_SIZE) else {
        return false;
    };

    let space = env.space;
    if !mem.user_mem_check(space, sp, FAULT_RECORD_SIZE, PROT_R | PROT_W) {
        return false;
    }
    let record = FaultRecord {
        fault_addr,
        err_code: tf.err_code,
        tf,
    };
    if mem.write(space, sp, &record.to_bytes()).is_err() {
        return false;
    }

    let env = table.get_mut(idx);
    env.trap_frame.rsp = sp;
    env.trap_frame.rip = env.pgfault_upcall;
    true
}

// ============================================================================
// Tests
// ============================================================================
