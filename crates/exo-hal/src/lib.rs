//! Hardware abstraction trait for the exokernel
//!
//! This crate defines the trait that lets the kernel runtime drive
//! different platforms (QEMU, bare metal, a hosted test harness) by
//! abstracting the console, the idle loop and the return-to-user-mode
//! transfer.
//!
//! Page-table and address-space operations are deliberately *not* here;
//! they live behind `exo_kernel_core::AddressSpaces` so the pure core
//! can exercise them without a platform.

#![no_std]

use exo_kernel_core::TrapFrame;

/// Platform operations the kernel runtime needs.
///
/// Implementations provide:
/// - Console output and non-blocking input
/// - A debug log sink, kept separate from the user-visible console
/// - The idle primitive (halt until the next interrupt)
/// - The one-way transfer back into user mode
pub trait Hal {
    /// Write bytes to the system console
    fn console_write(&mut self, bytes: &[u8]);

    /// Read one pending console character without blocking.
    ///
    /// Returns `None` when no input is waiting.
    fn console_getc(&mut self) -> Option<u8>;

    /// Emit one line of kernel trace output.
    ///
    /// On serial platforms this typically shares the console UART; the
    /// test harness records it instead.
    fn debug_write(&mut self, msg: &str);

    /// Halt the CPU until the next interrupt fires
    fn wait_for_interrupt(&mut self);

    /// Restore user register state and resume execution there.
    ///
    /// This is the `iretq` path; it never returns to the kernel caller.
    fn resume(&mut self, frame: &TrapFrame) -> !;
}
