//! End-to-end tests for the kernel runtime: boot, the syscall gateway,
//! IPC through the gateway, page-fault delivery and the monitor, all
//! driven over a mock HAL and the mock memory subsystem.

use std::collections::VecDeque;

use exo_hal::Hal;
use exo_kernel::{monitor, Disposition, Kernel};
use exo_kernel_core::abi::syscall::*;
use exo_kernel_core::space::{ALLOC_ZERO, PROT_LAZY, PROT_R, PROT_USER, PROT_W};
use exo_kernel_core::{
    check_all_invariants, AddressSpaces, EnvId, EnvKind, FaultRecord, KernelError, MockSpaces,
    SchedDecision, Status, FAULT_RECORD_SIZE, MAX_USER_ADDRESS, NENV, PAGE_SIZE,
    USER_EXC_STACK_TOP, USER_STACK_TOP,
};

// ============================================================================
// Mock HAL
// ============================================================================

#[derive(Default)]
struct MockHal {
    console: Vec<u8>,
    input: VecDeque<u8>,
    debug_log: Vec<String>,
}

impl Hal for MockHal {
    fn console_write(&mut self, bytes: &[u8]) {
        self.console.extend_from_slice(bytes);
    }

    fn console_getc(&mut self) -> Option<u8> {
        self.input.pop_front()
    }

    fn debug_write(&mut self, msg: &str) {
        self.debug_log.push(msg.to_string());
    }

    fn wait_for_interrupt(&mut self) {
        panic!("idle with nothing to wake us");
    }

    fn resume(&mut self, _frame: &exo_kernel_core::TrapFrame) -> ! {
        panic!("resume reached the mock HAL");
    }
}

// ============================================================================
// Boot-image builder and helpers
// ============================================================================

const ELF_MAGIC: u32 = 0x464C_457F;
const PT_LOAD: u32 = 1;
const PF_X: u32 = 0x1;
const PF_R: u32 = 0x4;

const ENTRY: u64 = 0x20_1000;

/// A minimal ELF64 image: one readable, executable text segment at the
/// entry address.
fn boot_image(entry: u64) -> Vec<u8> {
    let text: &[u8] = b"\x90\xc3";
    let phoff = 64u64;
    let data_off = phoff + 56;

    let mut img = vec![0u8; 64];
    img[0..4].copy_from_slice(&ELF_MAGIC.to_le_bytes());
    img[24..32].copy_from_slice(&entry.to_le_bytes());
    img[32..40].copy_from_slice(&phoff.to_le_bytes());
    img[54..56].copy_from_slice(&56u16.to_le_bytes()); // e_phentsize
    img[56..58].copy_from_slice(&1u16.to_le_bytes()); // e_phnum
    img[58..60].copy_from_slice(&64u16.to_le_bytes()); // e_shentsize
    img[60..62].copy_from_slice(&1u16.to_le_bytes()); // e_shnum
    img[62..64].copy_from_slice(&0u16.to_le_bytes()); // e_shstrndx

    let mut phdr = vec![0u8; 56];
    phdr[0..4].copy_from_slice(&PT_LOAD.to_le_bytes());
    phdr[4..8].copy_from_slice(&(PF_R | PF_X).to_le_bytes());
    phdr[8..16].copy_from_slice(&data_off.to_le_bytes());
    phdr[16..24].copy_from_slice(&entry.to_le_bytes());
    phdr[32..40].copy_from_slice(&(text.len() as u64).to_le_bytes());
    phdr[40..48].copy_from_slice(&PAGE_SIZE.to_le_bytes());
    img.extend_from_slice(&phdr);
    img.extend_from_slice(text);
    img
}

fn kernel() -> Kernel<MockHal, MockSpaces> {
    Kernel::new(MockHal::default(), MockSpaces::new())
}

fn boot_one(k: &mut Kernel<MockHal, MockSpaces>) -> EnvId {
    k.create_env(&boot_image(ENTRY), EnvKind::User).unwrap()
}

/// Boot one environment and make it the running one.
fn boot_current(k: &mut Kernel<MockHal, MockSpaces>) -> EnvId {
    let id = boot_one(k);
    k.dispatch(id.index());
    id
}

/// Map one user-visible read/write page and fill its head with `bytes`.
fn map_user_page(k: &mut Kernel<MockHal, MockSpaces>, id: EnvId, addr: u64, bytes: &[u8]) {
    let space = k.envs().get(id.index()).space;
    k.mem_mut()
        .map(space, addr, None, PAGE_SIZE, PROT_R | PROT_W | PROT_USER | ALLOC_ZERO)
        .unwrap();
    k.mem_mut().write(space, addr, bytes).unwrap();
}

fn console(k: &Kernel<MockHal, MockSpaces>) -> String {
    String::from_utf8_lossy(&k.hal().console).into_owned()
}

fn debug_contains(k: &Kernel<MockHal, MockSpaces>, needle: &str) -> bool {
    k.hal().debug_log.iter().any(|line| line.contains(needle))
}

// ============================================================================
// Boot
// ============================================================================

#[test]
fn create_env_boots_runnable_env() {
    let mut k = kernel();
    let id = boot_one(&mut k);

    assert_eq!(id.index(), 0);
    assert!(id.0 > 0);
    let env = k.envs().get(0);
    assert_eq!(env.status, Status::Runnable);
    assert_eq!(env.parent, EnvId(0));
    assert_eq!(env.trap_frame.rip, ENTRY);
    assert!(debug_contains(&k, "new env"));
}

#[test]
fn create_env_rejects_bad_image_without_side_effects() {
    let mut k = kernel();
    let mut img = boot_image(ENTRY);
    img[0] = 0x7E;

    assert_eq!(
        k.create_env(&img, EnvKind::User),
        Err(KernelError::InvalidImage)
    );
    assert_eq!(k.envs().count_status(Status::Free), NENV);
    // the half-built address space is gone too
    assert_eq!(k.mem().live_spaces(), 1);
}

// ============================================================================
// Gateway basics
// ============================================================================

#[test]
fn getenvid_returns_current_id() {
    let mut k = kernel();
    let id = boot_current(&mut k);
    assert_eq!(
        k.syscall(SYS_GETENVID, [0; 6]),
        Disposition::Return(id.0 as i64)
    );
}

#[test]
fn unknown_syscall_number_is_rejected() {
    let mut k = kernel();
    boot_current(&mut k);
    assert_eq!(
        k.syscall(99, [0; 6]),
        Disposition::Return(KernelError::NoSuchCall.code())
    );
}

#[test]
fn yield_hands_back_the_cpu() {
    let mut k = kernel();
    boot_current(&mut k);
    assert_eq!(k.syscall(SYS_YIELD, [0; 6]), Disposition::Yield);
}

// ============================================================================
// Console
// ============================================================================

#[test]
fn cputs_writes_to_console() {
    let mut k = kernel();
    let id = boot_current(&mut k);
    map_user_page(&mut k, id, 0x40_0000, b"hello, kernel\n");

    let d = k.syscall(SYS_CPUTS, [0x40_0000, 14, 0, 0, 0, 0]);
    assert_eq!(d, Disposition::Return(0));
    assert_eq!(console(&k), "hello, kernel\n");
}

#[test]
fn cputs_bad_pointer_destroys_caller() {
    let mut k = kernel();
    let id = boot_current(&mut k);

    let d = k.syscall(SYS_CPUTS, [0x70_0000, 8, 0, 0, 0, 0]);
    assert_eq!(d, Disposition::NoReturn);
    assert_eq!(k.envs().get(id.index()).status, Status::Free);
    assert!(debug_contains(&k, "user memory check failed"));
}

#[test]
fn cgetc_drains_input_then_reports_none() {
    let mut k = kernel();
    boot_current(&mut k);
    k.hal_mut().input.push_back(b'x');

    assert_eq!(k.syscall(SYS_CGETC, [0; 6]), Disposition::Return(b'x' as i64));
    // no input pending reads as 0, not an error
    assert_eq!(k.syscall(SYS_CGETC, [0; 6]), Disposition::Return(0));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn destroy_self_never_returns() {
    let mut k = kernel();
    let id = boot_current(&mut k);

    let d = k.syscall(SYS_ENV_DESTROY, [0, 0, 0, 0, 0, 0]);
    assert_eq!(d, Disposition::NoReturn);
    assert_eq!(k.envs().get(id.index()).status, Status::Free);
    assert!(debug_contains(&k, "exiting gracefully"));
    assert!(debug_contains(&k, "free env"));
}

#[test]
fn destroy_child_returns_to_parent() {
    let mut k = kernel();
    boot_current(&mut k);
    let Disposition::Return(child) = k.syscall(SYS_EXOFORK, [0; 6]) else {
        panic!("exofork did not return");
    };

    let d = k.syscall(SYS_ENV_DESTROY, [child as u64, 0, 0, 0, 0, 0]);
    assert_eq!(d, Disposition::Return(0));
    assert_eq!(k.envs().get(EnvId(child as i32).index()).status, Status::Free);
    assert!(debug_contains(&k, "destroying"));
}

#[test]
fn destroy_unrelated_env_is_denied() {
    let mut k = kernel();
    let a = boot_one(&mut k);
    let b = boot_one(&mut k);
    k.dispatch(a.index());

    // b's parent is the kernel, not a
    let d = k.syscall(SYS_ENV_DESTROY, [b.0 as u64, 0, 0, 0, 0, 0]);
    assert_eq!(d, Disposition::Return(KernelError::BadHandle.code()));
    assert_eq!(k.envs().get(b.index()).status, Status::Runnable);
}

#[test]
fn exofork_makes_a_blank_copy_of_the_caller() {
    let mut k = kernel();
    let parent = boot_current(&mut k);
    k.envs_mut().get_mut(parent.index()).trap_frame.rip = 0x1234;

    let Disposition::Return(child) = k.syscall(SYS_EXOFORK, [0; 6]) else {
        panic!("exofork did not return");
    };
    assert!(child > 0);

    let env = k.envs().get(EnvId(child as i32).index());
    assert_eq!(env.status, Status::NotRunnable);
    assert_eq!(env.parent, parent);
    // the child resumes from the parent's saved state, seeing 0
    assert_eq!(env.trap_frame.rip, 0x1234);
    assert_eq!(env.trap_frame.rax, 0);
}

#[test]
fn set_status_checks_the_range_before_the_id() {
    let mut k = kernel();
    boot_current(&mut k);

    // garbage status loses to garbage envid
    let d = k.syscall(SYS_ENV_SET_STATUS, [0xFFFF, 9, 0, 0, 0, 0]);
    assert_eq!(d, Disposition::Return(KernelError::InvalidArgument.code()));

    let Disposition::Return(child) = k.syscall(SYS_EXOFORK, [0; 6]) else {
        panic!("exofork did not return");
    };
    let d = k.syscall(
        SYS_ENV_SET_STATUS,
        [child as u64, Status::Runnable as u64, 0, 0, 0, 0],
    );
    assert_eq!(d, Disposition::Return(0));
    assert_eq!(
        k.envs().get(EnvId(child as i32).index()).status,
        Status::Runnable
    );
}

#[test]
fn set_pgfault_upcall_records_the_entry_point() {
    let mut k = kernel();
    let id = boot_current(&mut k);
    let d = k.syscall(SYS_ENV_SET_PGFAULT_UPCALL, [0, 0x5000, 0, 0, 0, 0]);
    assert_eq!(d, Disposition::Return(0));
    assert_eq!(k.envs().get(id.index()).pgfault_upcall, 0x5000);
}

// ============================================================================
// Memory syscalls
// ============================================================================

#[test]
fn alloc_region_rejects_bad_addresses() {
    let mut k = kernel();
    boot_current(&mut k);
    let bad = KernelError::InvalidArgument.code();

    let d = k.syscall(SYS_ALLOC_REGION, [0, 0x40_0001, PAGE_SIZE, 0, 0, 0]);
    assert_eq!(d, Disposition::Return(bad));
    let d = k.syscall(SYS_ALLOC_REGION, [0, MAX_USER_ADDRESS, PAGE_SIZE, 0, 0, 0]);
    assert_eq!(d, Disposition::Return(bad));
}

#[test]
fn alloc_region_maps_lazy_zeroed_user_memory() {
    let mut k = kernel();
    let id = boot_current(&mut k);

    let d = k.syscall(
        SYS_ALLOC_REGION,
        [0, 0x40_0000, PAGE_SIZE, (PROT_R | PROT_W) as u64, 0, 0],
    );
    assert_eq!(d, Disposition::Return(0));

    let space = k.envs().get(id.index()).space;
    let flags = k.mem().page_flags(space, 0x40_0000).unwrap();
    assert_ne!(flags & PROT_USER, 0);
    assert_ne!(flags & PROT_LAZY, 0);
    assert_eq!(k.mem().read(space, 0x40_0000, 8).unwrap(), [0u8; 8]);
}

#[test]
fn map_region_rejects_kernel_only_bits() {
    let mut k = kernel();
    boot_current(&mut k);
    k.syscall(SYS_ALLOC_REGION, [0, 0x40_0000, PAGE_SIZE, 0, 0, 0]);

    let d = k.syscall(
        SYS_MAP_REGION,
        [0, 0x40_0000, 0, 0x50_0000, PAGE_SIZE, PROT_USER as u64],
    );
    assert_eq!(d, Disposition::Return(KernelError::InvalidArgument.code()));
    let d = k.syscall(
        SYS_MAP_REGION,
        [0, 0x40_0000, 0, 0x50_0000, PAGE_SIZE, ALLOC_ZERO as u64],
    );
    assert_eq!(d, Disposition::Return(KernelError::InvalidArgument.code()));
}

#[test]
fn map_region_shares_pages_with_a_child() {
    let mut k = kernel();
    let parent = boot_current(&mut k);
    map_user_page(&mut k, parent, 0x40_0000, b"shared");

    let Disposition::Return(child) = k.syscall(SYS_EXOFORK, [0; 6]) else {
        panic!("exofork did not return");
    };
    let d = k.syscall(
        SYS_MAP_REGION,
        [
            0,
            0x40_0000,
            child as u64,
            0x40_0000,
            PAGE_SIZE,
            (PROT_R | PROT_W) as u64,
        ],
    );
    assert_eq!(d, Disposition::Return(0));

    let child_space = k.envs().get(EnvId(child as i32).index()).space;
    assert_eq!(k.mem().read(child_space, 0x40_0000, 6).unwrap(), b"shared");
    let parent_space = k.envs().get(parent.index()).space;
    assert_eq!(k.mem().max_ref(parent_space, 0x40_0000, PAGE_SIZE), 2);
}

#[test]
fn unmap_region_drops_the_mapping() {
    let mut k = kernel();
    let id = boot_current(&mut k);
    map_user_page(&mut k, id, 0x40_0000, b"x");

    // empty range is fine
    let d = k.syscall(SYS_UNMAP_REGION, [0, 0x50_0000, PAGE_SIZE, 0, 0, 0]);
    assert_eq!(d, Disposition::Return(0));

    let d = k.syscall(SYS_UNMAP_REGION, [0, 0x40_0000, PAGE_SIZE, 0, 0, 0]);
    assert_eq!(d, Disposition::Return(0));
    let space = k.envs().get(id.index()).space;
    assert_eq!(k.mem().page_flags(space, 0x40_0000), None);
}

#[test]
fn region_refs_counts_and_compares() {
    let mut k = kernel();
    let parent = boot_current(&mut k);
    map_user_page(&mut k, parent, 0x40_0000, b"a");
    map_user_page(&mut k, parent, 0x41_0000, b"b");

    let Disposition::Return(child) = k.syscall(SYS_EXOFORK, [0; 6]) else {
        panic!("exofork did not return");
    };
    k.syscall(
        SYS_MAP_REGION,
        [
            0,
            0x40_0000,
            child as u64,
            0x40_0000,
            PAGE_SIZE,
            PROT_R as u64,
        ],
    );

    // a second address beyond user space means "single count"
    let d = k.syscall(
        SYS_REGION_REFS,
        [0x40_0000, PAGE_SIZE, MAX_USER_ADDRESS, 0, 0, 0],
    );
    assert_eq!(d, Disposition::Return(2));

    let d = k.syscall(
        SYS_REGION_REFS,
        [0x40_0000, PAGE_SIZE, 0x41_0000, PAGE_SIZE, 0, 0],
    );
    assert_eq!(d, Disposition::Return(1));
}

// ============================================================================
// IPC through the gateway
// ============================================================================

#[test]
fn ipc_recv_parks_the_receiver() {
    let mut k = kernel();
    let id = boot_current(&mut k);

    let d = k.syscall(SYS_IPC_RECV, [MAX_USER_ADDRESS, 0, 0, 0, 0, 0]);
    assert_eq!(d, Disposition::NoReturn);

    let env = k.envs().get(id.index());
    assert_eq!(env.status, Status::NotRunnable);
    assert!(env.ipc.receiving);
    // the eventual wakeup returns 0
    assert_eq!(env.trap_frame.rax, 0);
}

#[test]
fn ipc_recv_rejects_unaligned_buffer() {
    let mut k = kernel();
    boot_current(&mut k);
    let d = k.syscall(SYS_IPC_RECV, [0x50_0001, PAGE_SIZE, 0, 0, 0, 0]);
    assert_eq!(d, Disposition::Return(KernelError::InvalidArgument.code()));
}

#[test]
fn ipc_send_to_non_receiver_fails() {
    let mut k = kernel();
    let a = boot_one(&mut k);
    let b = boot_one(&mut k);
    k.dispatch(a.index());

    let d = k.syscall(
        SYS_IPC_TRY_SEND,
        [b.0 as u64, 7, MAX_USER_ADDRESS, 0, 0, 0],
    );
    assert_eq!(d, Disposition::Return(KernelError::NotReceiving.code()));
}

#[test]
fn ipc_value_rendezvous() {
    let mut k = kernel();
    let a = boot_one(&mut k);
    let b = boot_one(&mut k);

    k.dispatch(b.index());
    assert_eq!(
        k.syscall(SYS_IPC_RECV, [MAX_USER_ADDRESS, 0, 0, 0, 0, 0]),
        Disposition::NoReturn
    );

    k.dispatch(a.index());
    let d = k.syscall(
        SYS_IPC_TRY_SEND,
        [b.0 as u64, 42, MAX_USER_ADDRESS, 0, 0, 0],
    );
    assert_eq!(d, Disposition::Return(0));

    let env = k.envs().get(b.index());
    assert_eq!(env.status, Status::Runnable);
    assert!(!env.ipc.receiving);
    assert_eq!(env.ipc.value, 42);
    assert_eq!(env.ipc.from, a);
    assert_eq!(env.ipc.perm, 0);
}

#[test]
fn ipc_page_transfer_through_the_gateway() {
    let mut k = kernel();
    let a = boot_one(&mut k);
    let b = boot_one(&mut k);

    k.dispatch(b.index());
    assert_eq!(
        k.syscall(SYS_IPC_RECV, [0x50_0000, PAGE_SIZE, 0, 0, 0, 0]),
        Disposition::NoReturn
    );

    k.dispatch(a.index());
    map_user_page(&mut k, a, 0x40_0000, b"ping");
    let d = k.syscall(
        SYS_IPC_TRY_SEND,
        [
            b.0 as u64,
            99,
            0x40_0000,
            PAGE_SIZE,
            (PROT_R | PROT_W) as u64,
            0,
        ],
    );
    assert_eq!(d, Disposition::Return(0));

    let env = k.envs().get(b.index());
    assert_eq!(env.status, Status::Runnable);
    assert_eq!(env.ipc.value, 99);
    assert_eq!(env.ipc.max_size, PAGE_SIZE);
    assert_ne!(env.ipc.perm & PROT_R, 0);
    let b_space = env.space;
    assert_eq!(k.mem().read(b_space, 0x50_0000, 4).unwrap(), b"ping");
}

#[test]
fn scheduler_resumes_a_woken_receiver_with_zero() {
    let mut k = kernel();
    let a = boot_one(&mut k);
    let b = boot_one(&mut k);

    k.dispatch(b.index());
    k.syscall(SYS_IPC_RECV, [MAX_USER_ADDRESS, 0, 0, 0, 0, 0]);
    k.dispatch(a.index());
    k.syscall(
        SYS_IPC_TRY_SEND,
        [b.0 as u64, 5, MAX_USER_ADDRESS, 0, 0, 0],
    );

    assert_eq!(k.schedule_step(), SchedDecision::Run(b.index()));
    let frame = k.dispatch(b.index());
    assert_eq!(frame.rax, 0);
}

// ============================================================================
// Page-fault delivery
// ============================================================================

#[test]
fn fault_without_upcall_is_fatal() {
    let mut k = kernel();
    let id = boot_current(&mut k);

    assert!(!k.deliver_page_fault(0xdead_0000));
    assert_eq!(k.envs().get(id.index()).status, Status::Free);
    assert!(debug_contains(&k, "user fault va"));
}

#[test]
fn fault_with_upcall_delivers_a_full_snapshot() {
    let mut k = kernel();
    let id = boot_current(&mut k);
    map_user_page(&mut k, id, USER_EXC_STACK_TOP - PAGE_SIZE, b"");
    k.syscall(SYS_ENV_SET_PGFAULT_UPCALL, [0, 0x5000, 0, 0, 0, 0]);
    {
        let tf = &mut k.envs_mut().get_mut(id.index()).trap_frame;
        tf.rip = 0x1234;
        tf.rdi = 0xAAAA;
        tf.rsi = 0xBBBB;
    }

    assert!(k.deliver_page_fault(0xdead_0000));

    let sp = USER_EXC_STACK_TOP - FAULT_RECORD_SIZE;
    let tf = &k.envs().get(id.index()).trap_frame;
    assert_eq!(tf.rip, 0x5000);
    assert_eq!(tf.rsp, sp);
    // every trap-time register except rip/rsp stays live
    assert_eq!(tf.rdi, 0xAAAA);
    assert_eq!(tf.rsi, 0xBBBB);

    let space = k.envs().get(id.index()).space;
    let bytes = k.mem().read(space, sp, FAULT_RECORD_SIZE).unwrap();
    let record = FaultRecord::parse(&bytes).unwrap();
    assert_eq!(record.fault_addr, 0xdead_0000);
    assert_eq!(record.tf.rip, 0x1234);
    assert_eq!(record.tf.rsp, USER_STACK_TOP);
    assert_eq!(record.tf.rdi, 0xAAAA);
    assert_eq!(record.tf.rsi, 0xBBBB);
}

#[test]
fn fault_with_unreachable_exception_stack_is_fatal() {
    let mut k = kernel();
    let id = boot_current(&mut k);
    k.syscall(SYS_ENV_SET_PGFAULT_UPCALL, [0, 0x5000, 0, 0, 0, 0]);

    // upcall installed, but no exception stack mapped
    assert!(!k.deliver_page_fault(0xdead_0000));
    assert_eq!(k.envs().get(id.index()).status, Status::Free);
    assert!(debug_contains(&k, "user fault va"));
}

// ============================================================================
// Scheduling
// ============================================================================

#[test]
fn scheduler_rotates_between_runnable_envs() {
    let mut k = kernel();
    let a = boot_one(&mut k);
    let b = boot_one(&mut k);

    k.dispatch(a.index());
    assert_eq!(k.schedule_step(), SchedDecision::Run(b.index()));
    k.dispatch(b.index());
    assert_eq!(k.schedule_step(), SchedDecision::Run(a.index()));
}

#[test]
fn empty_table_falls_through_to_the_monitor() {
    let mut k = kernel();
    assert_eq!(k.schedule_step(), SchedDecision::Monitor);
}

// ============================================================================
// Monitor
// ============================================================================

#[test]
fn monitor_help_lists_commands() {
    let mut k = kernel();
    monitor::run_command(&mut k, "help");
    let out = console(&k);
    assert!(out.contains("help"));
    assert!(out.contains("kerninfo"));
    assert!(out.contains("ps"));
}

#[test]
fn monitor_rejects_unknown_commands() {
    let mut k = kernel();
    monitor::run_command(&mut k, "frobnicate");
    assert!(console(&k).contains("Unknown command 'frobnicate'"));
}

#[test]
fn monitor_rejects_too_many_arguments() {
    let mut k = kernel();
    let line = "x ".repeat(monitor::MAX_ARGS);
    monitor::run_command(&mut k, &line);
    assert!(console(&k).contains("Too many arguments"));
}

#[test]
fn monitor_ps_dumps_live_envs() {
    let mut k = kernel();
    let id = boot_current(&mut k);
    monitor::run_command(&mut k, "ps");
    let out = console(&k);
    assert!(out.contains(&format!("{:08x}", id.0)));
    assert!(out.contains("RUNNING"));
}

#[test]
fn monitor_ps_reports_an_empty_table() {
    let mut k = kernel();
    monitor::run_command(&mut k, "ps");
    assert!(console(&k).contains("(no environments)"));
}

#[test]
fn monitor_kerninfo_reports_counts() {
    let mut k = kernel();
    boot_current(&mut k);
    boot_one(&mut k);
    monitor::run_command(&mut k, "kerninfo");
    let out = console(&k);
    assert!(out.contains("environment slots"));
    assert!(out.contains("2 live, 1 runnable, 1 running, 0 blocked"));
}

// ============================================================================
// Invariants
// ============================================================================

#[test]
fn invariants_hold_after_mixed_traffic() {
    let mut k = kernel();
    let a = boot_one(&mut k);
    let b = boot_one(&mut k);

    k.dispatch(b.index());
    k.syscall(SYS_IPC_RECV, [MAX_USER_ADDRESS, 0, 0, 0, 0, 0]);

    k.dispatch(a.index());
    let Disposition::Return(child) = k.syscall(SYS_EXOFORK, [0; 6]) else {
        panic!("exofork did not return");
    };
    k.syscall(SYS_ENV_DESTROY, [child as u64, 0, 0, 0, 0, 0]);

    assert!(check_all_invariants(k.envs()).is_empty());
}
