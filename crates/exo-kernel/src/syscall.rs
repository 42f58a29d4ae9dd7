//! Syscall gateway
//!
//! Single entry point for every request crossing the user/kernel
//! boundary: decode the number, validate every argument against the
//! caller's authority, and hand off to the core. Nothing here trusts a
//! user-supplied pointer, size, flag set or identifier.

use exo_hal::Hal;
use exo_kernel_core::abi::syscall::*;
use exo_kernel_core::space::{ALLOC_ONE, ALLOC_ZERO, PROT_ALL, PROT_LAZY, PROT_R, PROT_USER};
use exo_kernel_core::{
    ipc, AddressSpaces, EnvId, EnvKind, KernelError, Status, MAX_USER_ADDRESS, PAGE_SIZE,
};

use crate::Kernel;
use alloc::format;

/// What the trap entry should do after a syscall.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Resume the caller with this value in `rax`
    Return(i64),
    /// Caller gave up the CPU; run the scheduler
    Yield,
    /// The caller no longer runs here (destroyed, or parked in
    /// `ipc_recv` with its return already staged); run the scheduler
    NoReturn,
}

fn ret(result: Result<i64, KernelError>) -> Disposition {
    Disposition::Return(result.unwrap_or_else(|e| e.code()))
}

impl<H: Hal, M: AddressSpaces> Kernel<H, M> {
    /// Dispatch one syscall on behalf of the current environment.
    pub fn syscall(&mut self, no: u64, args: [u64; 6]) -> Disposition {
        match no {
            SYS_CPUTS => self.sys_cputs(args[0], args[1]),
            SYS_CGETC => Disposition::Return(self.hal.console_getc().map_or(0, |b| b as i64)),
            SYS_GETENVID => ret(self.sys_getenvid()),
            SYS_ENV_DESTROY => self.sys_env_destroy(args[0]),
            SYS_ALLOC_REGION => ret(self.sys_alloc_region(args[0], args[1], args[2], args[3])),
            SYS_MAP_REGION => ret(self.sys_map_region(args)),
            SYS_UNMAP_REGION => ret(self.sys_unmap_region(args[0], args[1], args[2])),
            SYS_REGION_REFS => ret(self.sys_region_refs(args[0], args[1], args[2], args[3])),
            SYS_EXOFORK => self.sys_exofork(),
            SYS_ENV_SET_STATUS => ret(self.sys_env_set_status(args[0], args[1])),
            SYS_ENV_SET_PGFAULT_UPCALL => ret(self.sys_env_set_pgfault_upcall(args[0], args[1])),
            SYS_YIELD => Disposition::Yield,
            SYS_IPC_TRY_SEND => ret(self.sys_ipc_try_send(args)),
            SYS_IPC_RECV => self.sys_ipc_recv(args[0], args[1]),
            _ => Disposition::Return(KernelError::NoSuchCall.code()),
        }
    }

    fn cur_or_bad(&self) -> Result<usize, KernelError> {
        self.envs.cur_index().ok_or(KernelError::BadHandle)
    }

    // ------------------------------------------------------------------
    // Console
    // ------------------------------------------------------------------

    /// Print `len` bytes at `addr` from the caller's space.
    ///
    /// A pointer the caller may not read destroys the caller, it does
    /// not error.
    fn sys_cputs(&mut self, addr: u64, len: u64) -> Disposition {
        let cur = match self.cur_or_bad() {
            Ok(c) => c,
            Err(e) => return Disposition::Return(e.code()),
        };
        let space = self.envs.get(cur).space;

        if !self.mem.user_mem_check(space, addr, len, PROT_R) {
            let id = self.envs.get(cur).id;
            self.hal.debug_write(&format!(
                "[{:08x}] user memory check failed: va {:016x} len {}",
                id.0, addr, len
            ));
            self.envs.destroy(&mut self.mem, cur);
            return Disposition::NoReturn;
        }

        match self.mem.read(space, addr, len) {
            Ok(bytes) => {
                self.hal.console_write(&bytes);
                Disposition::Return(0)
            }
            Err(e) => Disposition::Return(e.code()),
        }
    }

    // ------------------------------------------------------------------
    // Identity and lifecycle
    // ------------------------------------------------------------------

    fn sys_getenvid(&mut self) -> Result<i64, KernelError> {
        let cur = self.cur_or_bad()?;
        Ok(self.envs.get(cur).id.0 as i64)
    }

    fn sys_env_destroy(&mut self, envid: u64) -> Disposition {
        let idx = match self.envs.resolve(EnvId(envid as i32), true) {
            Ok(idx) => idx,
            Err(e) => return Disposition::Return(e.code()),
        };

        let cur = self.envs.cur_index();
        let cur_id = cur.map_or(0, |c| self.envs.get(c).id.0);
        let target_id = self.envs.get(idx).id.0;
        if cur == Some(idx) {
            self.hal
                .debug_write(&format!("[{:08x}] exiting gracefully", cur_id));
        } else {
            self.hal
                .debug_write(&format!("[{:08x}] destroying {:08x}", cur_id, target_id));
        }
        self.hal
            .debug_write(&format!("[{:08x}] free env {:08x}", cur_id, target_id));

        if self.envs.destroy(&mut self.mem, idx) {
            Disposition::NoReturn
        } else {
            Disposition::Return(0)
        }
    }

    /// Blank child: caller's registers, return value 0, not yet
    /// runnable. The parent finishes construction through the other
    /// env syscalls before setting it RUNNABLE.
    fn sys_exofork(&mut self) -> Disposition {
        let cur = match self.cur_or_bad() {
            Ok(c) => c,
            Err(e) => return Disposition::Return(e.code()),
        };
        let parent = self.envs.get(cur).id;

        match self.envs.alloc(&mut self.mem, parent, EnvKind::User) {
            Err(e) => Disposition::Return(e.code()),
            Ok(child) => {
                let parent_tf = self.envs.get(cur).trap_frame;
                let env = self.envs.get_mut(child.index());
                env.status = Status::NotRunnable;
                env.trap_frame = parent_tf;
                env.trap_frame.rax = 0;
                self.trace_new_env(child);
                Disposition::Return(child.0 as i64)
            }
        }
    }

    fn sys_env_set_status(&mut self, envid: u64, status: u64) -> Result<i64, KernelError> {
        let status = Status::from_raw(status).ok_or(KernelError::InvalidArgument)?;
        let idx = self.envs.resolve(EnvId(envid as i32), true)?;
        self.envs.get_mut(idx).status = status;
        Ok(0)
    }

    fn sys_env_set_pgfault_upcall(&mut self, envid: u64, entry: u64) -> Result<i64, KernelError> {
        let idx = self.envs.resolve(EnvId(envid as i32), true)?;
        self.envs.get_mut(idx).pgfault_upcall = entry;
        Ok(0)
    }

    // ------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------

    fn sys_alloc_region(
        &mut self,
        envid: u64,
        addr: u64,
        size: u64,
        perm: u64,
    ) -> Result<i64, KernelError> {
        let idx = self.envs.resolve(EnvId(envid as i32), true)?;
        if addr >= MAX_USER_ADDRESS || addr % PAGE_SIZE != 0 {
            return Err(KernelError::InvalidArgument);
        }

        let mut perm = perm as u32;
        if perm & (ALLOC_ZERO | ALLOC_ONE) == 0 {
            perm |= ALLOC_ZERO;
        }

        let space = self.envs.get(idx).space;
        self.mem
            .map(space, addr, None, size, perm | PROT_USER | PROT_LAZY | ALLOC_ZERO)?;
        Ok(0)
    }

    fn sys_map_region(&mut self, args: [u64; 6]) -> Result<i64, KernelError> {
        let [src_envid, src_addr, dst_envid, dst_addr, size, perm] = args;

        let src_idx = self.envs.resolve(EnvId(src_envid as i32), true)?;
        let dst_idx = self.envs.resolve(EnvId(dst_envid as i32), true)?;

        if src_addr >= MAX_USER_ADDRESS
            || src_addr % PAGE_SIZE != 0
            || dst_addr >= MAX_USER_ADDRESS
            || dst_addr % PAGE_SIZE != 0
        {
            return Err(KernelError::InvalidArgument);
        }
        let perm = perm as u32;
        if perm & !PROT_ALL != 0 {
            return Err(KernelError::InvalidArgument);
        }

        let src_space = self.envs.get(src_idx).space;
        let dst_space = self.envs.get(dst_idx).space;
        self.mem.map(
            dst_space,
            dst_addr,
            Some((src_space, src_addr)),
            size,
            perm | PROT_USER,
        )?;
        Ok(0)
    }

    fn sys_unmap_region(&mut self, envid: u64, addr: u64, size: u64) -> Result<i64, KernelError> {
        let idx = self.envs.resolve(EnvId(envid as i32), true)?;
        if addr >= MAX_USER_ADDRESS || addr % PAGE_SIZE != 0 {
            return Err(KernelError::InvalidArgument);
        }
        let space = self.envs.get(idx).space;
        self.mem.unmap(space, addr, size);
        Ok(0)
    }

    /// Reference-count probe over the caller's own space.
    ///
    /// With `addr2` at or above the user limit the result is the
    /// highest reference count across the first range. An `addr2`
    /// inside the user range selects difference mode: the first
    /// range's count minus the second's. The boundary sentinel means
    /// "no second range" here exactly as it means "no page" in the
    /// IPC calls; both modes are observable ABI.
    fn sys_region_refs(
        &mut self,
        addr: u64,
        size: u64,
        addr2: u64,
        size2: u64,
    ) -> Result<i64, KernelError> {
        let cur = self.cur_or_bad()?;
        let space = self.envs.get(cur).space;
        let refs = self.mem.max_ref(space, addr, size) as i64;
        if addr2 < MAX_USER_ADDRESS {
            Ok(refs - self.mem.max_ref(space, addr2, size2) as i64)
        } else {
            Ok(refs)
        }
    }

    // ------------------------------------------------------------------
    // IPC
    // ------------------------------------------------------------------

    fn sys_ipc_try_send(&mut self, args: [u64; 6]) -> Result<i64, KernelError> {
        let [envid, value, src_addr, size, perm, _] = args;
        ipc::try_send(
            &mut self.envs,
            &mut self.mem,
            EnvId(envid as i32),
            value,
            src_addr,
            size,
            perm as u32,
        )?;
        Ok(0)
    }

    fn sys_ipc_recv(&mut self, dst_addr: u64, max_size: u64) -> Disposition {
        match ipc::recv(&mut self.envs, dst_addr, max_size) {
            // Parked; rax is staged to 0 and a sender will wake us.
            Ok(()) => Disposition::NoReturn,
            Err(e) => Disposition::Return(e.code()),
        }
    }
}
