//! Interactive diagnostic monitor
//!
//! Entered when the scheduler finds nothing runnable anywhere. Commands
//! are read line by line from the HAL console and dispatched against a
//! small command table.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use exo_hal::Hal;
use exo_kernel_core::{AddressSpaces, Status, NENV, PAGE_SIZE};

use crate::Kernel;

/// Maximum whitespace-separated tokens per command line
pub const MAX_ARGS: usize = 16;

struct Command {
    name: &'static str,
    desc: &'static str,
}

static COMMANDS: &[Command] = &[
    Command {
        name: "help",
        desc: "Display this list of commands",
    },
    Command {
        name: "kerninfo",
        desc: "Display information about the kernel",
    },
    Command {
        name: "ps",
        desc: "Dump the environment table",
    },
];

/// Enter the monitor loop. Never returns; the only way out is a reset.
pub fn run<H: Hal, M: AddressSpaces>(kernel: &mut Kernel<H, M>) -> ! {
    put(kernel, "Welcome to the kernel monitor!\n");
    put(kernel, "Type 'help' for a list of commands.\n");
    loop {
        let line = read_line(kernel);
        run_command(kernel, &line);
    }
}

/// Tokenize and dispatch one command line.
pub fn run_command<H: Hal, M: AddressSpaces>(kernel: &mut Kernel<H, M>, line: &str) {
    let args: Vec<&str> = line.split_whitespace().collect();
    if args.is_empty() {
        return;
    }
    if args.len() > MAX_ARGS - 1 {
        put(
            kernel,
            &format!("Too many arguments (max {})\n", MAX_ARGS),
        );
        return;
    }

    match args[0] {
        "help" => mon_help(kernel),
        "kerninfo" => mon_kerninfo(kernel),
        "ps" => mon_ps(kernel),
        unknown => put(kernel, &format!("Unknown command '{}'\n", unknown)),
    }
}

fn mon_help<H: Hal, M: AddressSpaces>(kernel: &mut Kernel<H, M>) {
    for cmd in COMMANDS {
        put(kernel, &format!("{} - {}\n", cmd.name, cmd.desc));
    }
}

fn mon_kerninfo<H: Hal, M: AddressSpaces>(kernel: &mut Kernel<H, M>) {
    let free = kernel.envs.count_status(Status::Free);
    let runnable = kernel.envs.count_status(Status::Runnable);
    let running = kernel.envs.count_status(Status::Running);
    let blocked = kernel.envs.count_status(Status::NotRunnable);

    put(kernel, "Kernel configuration:\n");
    put(kernel, &format!("  environment slots {:>6}\n", NENV));
    put(kernel, &format!("  page size         {:>6}\n", PAGE_SIZE));
    put(
        kernel,
        &format!(
            "Environments: {} live, {} runnable, {} running, {} blocked\n",
            NENV - free,
            runnable,
            running,
            blocked
        ),
    );
}

fn mon_ps<H: Hal, M: AddressSpaces>(kernel: &mut Kernel<H, M>) {
    put(kernel, "   ENVID    PARENT  STATUS        RUNS\n");
    let mut rows = Vec::new();
    for env in kernel.envs.iter() {
        if env.status == Status::Free {
            continue;
        }
        rows.push(format!(
            "[{:08x}] {:08x}  {:<12} {:>5}\n",
            env.id.0,
            env.parent.0,
            env.status.name(),
            env.runs
        ));
    }
    if rows.is_empty() {
        put(kernel, "(no environments)\n");
        return;
    }
    for row in rows {
        put(kernel, &row);
    }
}

/// Read one line from the console, echoing as we go. Blocks on
/// `wait_for_interrupt` while no input is pending.
fn read_line<H: Hal, M: AddressSpaces>(kernel: &mut Kernel<H, M>) -> String {
    kernel.hal.console_write(b"K> ");
    let mut buf = String::new();
    loop {
        match kernel.hal.console_getc() {
            None => kernel.hal.wait_for_interrupt(),
            Some(b'\r') | Some(b'\n') => {
                kernel.hal.console_write(b"\n");
                return buf;
            }
            Some(0x08) | Some(0x7F) => {
                if buf.pop().is_some() {
                    kernel.hal.console_write(b"\x08 \x08");
                }
            }
            Some(byte) => {
                buf.push(byte as char);
                kernel.hal.console_write(&[byte]);
            }
        }
    }
}

fn put<H: Hal, M: AddressSpaces>(kernel: &mut Kernel<H, M>, s: &str) {
    kernel.hal.console_write(s.as_bytes());
}
