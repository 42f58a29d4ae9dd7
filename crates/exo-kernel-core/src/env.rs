//! Environment table and lifecycle
//!
//! The table owns all environment slots, the free list threaded through
//! them, and the index of the currently running environment. Lifecycle
//! transitions (allocate, free, destroy, dispatch) live here; scheduling
//! policy is in [`crate::sched`].

use alloc::vec::Vec;

use crate::error::KernelError;
use crate::space::AddressSpaces;
use crate::types::{
    Env, EnvId, EnvKind, IpcState, Status, TrapFrame, ENVGENSHIFT, GD_UD, GD_UT, NENV,
    USER_STACK_TOP,
};

/// The environment table.
pub struct EnvTable {
    slots: Vec<Env>,
    free_head: Option<usize>,
    cur: Option<usize>,
}

impl EnvTable {
    /// A table of NENV free slots, free list in ascending slot order so
    /// the first allocation lands in slot 0.
    pub fn new() -> EnvTable {
        let slots = (0..NENV)
            .map(|i| Env::free_slot(if i + 1 < NENV { Some(i + 1) } else { None }))
            .collect();
        EnvTable {
            slots,
            free_head: Some(0),
            cur: None,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn get(&self, idx: usize) -> &Env {
        &self.slots[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Env {
        &mut self.slots[idx]
    }

    /// Slot index of the running environment, if any
    pub fn cur_index(&self) -> Option<usize> {
        self.cur
    }

    /// The running environment, if any
    pub fn cur(&self) -> Option<&Env> {
        self.cur.map(|i| &self.slots[i])
    }

    /// Forget the running environment (halt path)
    pub fn clear_cur(&mut self) {
        self.cur = None;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Env> {
        self.slots.iter()
    }

    /// Number of slots currently in a given status
    pub fn count_status(&self, status: Status) -> usize {
        self.slots.iter().filter(|e| e.status == status).count()
    }

    pub(crate) fn free_head(&self) -> Option<usize> {
        self.free_head
    }

    /// First live environment of the given kind, if any.
    ///
    /// System servers are created with a well-known kind so peers can
    /// locate them without prearranged identifiers.
    pub fn find_by_kind(&self, kind: EnvKind) -> Option<EnvId> {
        self.slots
            .iter()
            .find(|e| e.status != Status::Free && e.kind == kind)
            .map(|e| e.id)
    }

    // ------------------------------------------------------------------
    // Identifier resolution
    // ------------------------------------------------------------------

    /// Translate an identifier to a slot index.
    ///
    /// `EnvId(0)` names the calling environment. With `check_perm` set
    /// the target must be the caller itself or one of its immediate
    /// children.
    pub fn resolve(&self, id: EnvId, check_perm: bool) -> Result<usize, KernelError> {
        if id.0 == 0 {
            return self.cur.ok_or(KernelError::BadHandle);
        }

        let idx = id.index();
        let env = &self.slots[idx];
        if env.status == Status::Free || env.id != id {
            return Err(KernelError::BadHandle);
        }

        if check_perm {
            let cur = self.cur.ok_or(KernelError::BadHandle)?;
            if idx != cur && env.parent != self.slots[cur].id {
                return Err(KernelError::BadHandle);
            }
        }

        Ok(idx)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Allocate a fresh environment.
    ///
    /// Pops the free-list head, creates its address space, stamps a new
    /// generation into the identifier and resets the trap frame to the
    /// user-mode segment defaults with the stack pointer at the top of
    /// user memory. The slot stays on the free list if address-space
    /// creation fails, so a failed allocation changes nothing.
    pub fn alloc<M: AddressSpaces>(
        &mut self,
        mem: &mut M,
        parent: EnvId,
        kind: EnvKind,
    ) -> Result<EnvId, KernelError> {
        let idx = self.free_head.ok_or(KernelError::OutOfProcesses)?;
        let space = mem.create()?;

        let env = &mut self.slots[idx];
        self.free_head = env.free_link.take();

        // Stamp the next generation; never hand out a non-positive id.
        let mut generation = env.id.0.wrapping_add(1 << ENVGENSHIFT) & !(NENV as i32 - 1);
        if generation <= 0 {
            generation = 1 << ENVGENSHIFT;
        }
        env.id = EnvId(generation | idx as i32);

        env.parent = parent;
        env.kind = kind;
        env.status = Status::Runnable;
        env.runs = 0;
        env.space = space;
        env.pgfault_upcall = 0;
        env.ipc = IpcState::default();

        // Clear all saved register state so nothing leaks from the
        // slot's previous tenant.
        env.trap_frame = TrapFrame::default();
        env.trap_frame.ds = GD_UD | 3;
        env.trap_frame.es = GD_UD | 3;
        env.trap_frame.ss = GD_UD | 3;
        env.trap_frame.cs = GD_UT | 3;
        env.trap_frame.rsp = USER_STACK_TOP;

        Ok(env.id)
    }

    /// Release an environment's resources and return its slot to the
    /// head of the free list. Switches translation back to the kernel
    /// space first when the dying space is the active one.
    pub fn free<M: AddressSpaces>(&mut self, mem: &mut M, idx: usize) {
        let space = self.slots[idx].space;
        if mem.active() == space {
            mem.switch_active(mem.kernel_space());
        }
        mem.destroy(space);

        let env = &mut self.slots[idx];
        env.status = Status::Free;
        env.free_link = self.free_head;
        self.free_head = Some(idx);
    }

    /// Destroy an environment.
    ///
    /// Returns true when the destroyed environment was the running one,
    /// in which case the caller must reschedule instead of returning to
    /// it.
    pub fn destroy<M: AddressSpaces>(&mut self, mem: &mut M, idx: usize) -> bool {
        self.free(mem, idx);
        self.cur == Some(idx)
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Context-switch bookkeeping for running slot `idx`.
    ///
    /// On an actual switch the incumbent is demoted back to RUNNABLE if
    /// it was RUNNING, the target becomes the running environment, its
    /// run counter ticks and its address space becomes active.
    /// Returns a copy of the trap frame to resume from.
    pub fn dispatch<M: AddressSpaces>(&mut self, mem: &mut M, idx: usize) -> TrapFrame {
        if self.cur != Some(idx) {
            if let Some(c) = self.cur {
                if self.slots[c].status == Status::Running {
                    self.slots[c].status = Status::Runnable;
                }
            }
            self.cur = Some(idx);
            let env = &mut self.slots[idx];
            env.status = Status::Running;
            env.runs += 1;
            let space = env.space;
            mem.switch_active(space);
        }
        self.slots[idx].trap_frame
    }
}

impl Default for EnvTable {
    fn default() -> Self {
        EnvTable::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
