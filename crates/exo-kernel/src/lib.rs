//! Exokernel runtime
//!
//! Wraps the pure state machine in `exo-kernel-core` with everything
//! that touches the platform: the syscall trap entry, the divergent
//! scheduler loop, boot environment creation, page-fault upcall
//! delivery, trace logging through the HAL debug sink, and the
//! interactive monitor.
//!
//! The split mirrors the core's design: the core decides, this crate
//! diverges. Every `-> !` in the kernel bottoms out here, in
//! [`Hal::resume`] or the monitor loop.

#![no_std]
extern crate alloc;

pub mod monitor;
pub mod syscall;

pub use syscall::Disposition;

use alloc::format;

use exo_hal::Hal;
use exo_kernel_core::{
    fault, load_image, schedule, AddressSpaces, EnvId, EnvKind, EnvTable, KernelError,
    SchedDecision, TrapFrame,
};

/// The kernel: HAL, memory subsystem and environment table.
pub struct Kernel<H: Hal, M: AddressSpaces> {
    pub(crate) hal: H,
    pub(crate) mem: M,
    pub(crate) envs: EnvTable,
}

impl<H: Hal, M: AddressSpaces> Kernel<H, M> {
    pub fn new(hal: H, mem: M) -> Kernel<H, M> {
        Kernel {
            hal,
            mem,
            envs: EnvTable::new(),
        }
    }

    pub fn envs(&self) -> &EnvTable {
        &self.envs
    }

    pub fn envs_mut(&mut self) -> &mut EnvTable {
        &mut self.envs
    }

    pub fn mem(&self) -> &M {
        &self.mem
    }

    pub fn mem_mut(&mut self) -> &mut M {
        &mut self.mem
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    // ------------------------------------------------------------------
    // Boot
    // ------------------------------------------------------------------

    /// Create an environment from an ELF image, parent 0.
    ///
    /// The boot path; a rejected image leaves the table unchanged.
    pub fn create_env(&mut self, image: &[u8], kind: EnvKind) -> Result<EnvId, KernelError> {
        let id = self.envs.alloc(&mut self.mem, EnvId(0), kind)?;
        if let Err(err) = load_image(&mut self.envs, &mut self.mem, id.index(), image) {
            self.envs.free(&mut self.mem, id.index());
            return Err(err);
        }
        self.trace_new_env(id);
        Ok(id)
    }

    pub(crate) fn trace_new_env(&mut self, id: EnvId) {
        let cur = self.envs.cur().map_or(0, |e| e.id.0);
        self.hal
            .debug_write(&format!("[{:08x}] new env {:08x}", cur, id.0));
    }

    // ------------------------------------------------------------------
    // Dispatch loop
    // ------------------------------------------------------------------

    /// One scheduling decision, without acting on it. Dying
    /// environments encountered by the scan are reclaimed as a side
    /// effect.
    pub fn schedule_step(&mut self) -> SchedDecision {
        schedule(&mut self.envs, &mut self.mem)
    }

    /// Context-switch bookkeeping for slot `idx`; the trap glue resumes
    /// from the returned frame.
    pub fn dispatch(&mut self, idx: usize) -> TrapFrame {
        self.envs.dispatch(&mut self.mem, idx)
    }

    /// Give up the CPU and run whatever the scheduler picks next.
    pub fn sched_yield(&mut self) -> ! {
        loop {
            match self.schedule_step() {
                SchedDecision::Run(idx) => {
                    let frame = self.dispatch(idx);
                    self.hal.resume(&frame)
                }
                SchedDecision::Idle => self.hal.wait_for_interrupt(),
                SchedDecision::Monitor => {
                    self.hal
                        .console_write(b"No runnable environments in the system!\n");
                    monitor::run(self)
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Trap entries
    // ------------------------------------------------------------------

    /// Syscall trap entry.
    ///
    /// `rax` carries the syscall number, `rdx`/`rcx`/`rbx`/`rdi`/`rsi`/
    /// `r8` the arguments. The caller's registers are saved, the gateway
    /// runs, and either the caller resumes with the result in `rax` or
    /// the scheduler takes over.
    pub fn handle_syscall_trap(&mut self, frame: &TrapFrame) -> ! {
        let Some(cur) = self.envs.cur_index() else {
            panic!("syscall trap with no current environment");
        };
        self.envs.get_mut(cur).trap_frame = *frame;

        let no = frame.rax;
        let args = [
            frame.rdx, frame.rcx, frame.rbx, frame.rdi, frame.rsi, frame.r8,
        ];
        match self.syscall(no, args) {
            Disposition::Return(value) => {
                self.envs.get_mut(cur).trap_frame.rax = value as u64;
                let tf = self.dispatch(cur);
                self.hal.resume(&tf)
            }
            Disposition::Yield | Disposition::NoReturn => self.sched_yield(),
        }
    }

    /// Arrange for the current environment to handle a page fault.
    ///
    /// With an upcall installed, the complete interrupted state is
    /// written onto the environment's exception stack as a fault
    /// record and execution redirects to the upcall with `rsp` at the
    /// record; the handler body itself is user code. Without an
    /// upcall, or with the exception stack unreachable, the fault is
    /// fatal and the environment is destroyed. Returns false in the
    /// fatal case.
    pub fn deliver_page_fault(&mut self, fault_addr: u64) -> bool {
        let Some(cur) = self.envs.cur_index() else {
            panic!("page fault with no current environment");
        };

        if fault::deliver(&mut self.envs, &mut self.mem, cur, fault_addr) {
            return true;
        }

        let id = self.envs.get(cur).id;
        let rip = self.envs.get(cur).trap_frame.rip;
        self.hal.debug_write(&format!(
            "[{:08x}] user fault va {:016x} ip {:016x}",
            id.0, fault_addr, rip
        ));
        self.envs.destroy(&mut self.mem, cur);
        false
    }

    /// Page-fault trap entry.
    pub fn handle_page_fault_trap(&mut self, frame: &TrapFrame, fault_addr: u64) -> ! {
        if let Some(cur) = self.envs.cur_index() {
            self.envs.get_mut(cur).trap_frame = *frame;
        }
        if self.deliver_page_fault(fault_addr) {
            let Some(cur) = self.envs.cur_index() else {
                panic!("page fault delivery lost the current environment");
            };
            let tf = self.dispatch(cur);
            self.hal.resume(&tf)
        } else {
            self.sched_yield()
        }
    }
}
