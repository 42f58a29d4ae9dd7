//! Copy-on-write fork
//!
//! The kernel only provides `sys_exofork`, which makes a blank,
//! not-runnable copy of the caller's register state. Everything else is
//! user policy: the parent shares its entire address space with the
//! child lazily, hands over its page-fault upcall so the child can
//! resolve its own copy-on-write faults, and only then marks the child
//! runnable.

use exo_kernel_core::space::{PROT_ALL, PROT_COMBINE, PROT_LAZY, PROT_R, PROT_W};
use exo_kernel_core::{EnvId, KernelError, Status, MAX_USER_ADDRESS, PAGE_SIZE, USER_EXC_STACK_TOP};

use crate::Syscalls;

/// Allocate this environment's exception stack and install its
/// page-fault upcall.
///
/// Fault records are delivered onto the exception stack, so this must
/// run before the first fault the handler is expected to service. The
/// kernel destroys an environment that faults with an upcall installed
/// but no reachable exception stack.
pub fn install_pgfault_upcall<S: Syscalls>(sys: &mut S) -> Result<(), KernelError> {
    sys.sys_alloc_region(
        EnvId::CURRENT,
        USER_EXC_STACK_TOP - PAGE_SIZE,
        PAGE_SIZE,
        PROT_R | PROT_W,
    )?;
    let upcall = sys.pgfault_upcall();
    sys.sys_env_set_pgfault_upcall(EnvId::CURRENT, upcall)
}

/// Fork the calling environment.
///
/// Returns the child's identifier in the parent and `EnvId(0)` in the
/// child. The child's first action is refreshing its cached identity;
/// it woke up holding the parent's.
pub fn fork<S: Syscalls>(sys: &mut S) -> Result<EnvId, KernelError> {
    let child = sys.sys_exofork()?;
    if child.0 == 0 {
        sys.refresh_identity();
        return Ok(EnvId(0));
    }

    // Share the whole user range lazily. COMBINE keeps mappings the
    // child already has (there are none yet, but the kernel side treats
    // the range uniformly) and LAZY defers the actual copies to the
    // first write fault on either side.
    sys.sys_map_region(
        EnvId::CURRENT,
        0,
        child,
        0,
        MAX_USER_ADDRESS,
        PROT_ALL | PROT_LAZY | PROT_COMBINE,
    )?;

    let upcall = sys.pgfault_upcall();
    sys.sys_env_set_pgfault_upcall(child, upcall)?;
    sys.sys_env_set_status(child, Status::Runnable)?;
    Ok(child)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::vec::Vec;

    use super::*;
    use crate::IpcMessage;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Call {
        Exofork,
        RefreshIdentity,
        AllocRegion {
            env: EnvId,
            addr: u64,
            size: u64,
            perm: u32,
        },
        MapRegion {
            src: EnvId,
            src_addr: u64,
            dst: EnvId,
            dst_addr: u64,
            size: u64,
            perm: u32,
        },
        SetPgfaultUpcall { env: EnvId, entry: u64 },
        SetStatus { env: EnvId, status: Status },
    }

    /// Records the calls fork makes; `child` scripts what exofork
    /// returns.
    struct MockSys {
        calls: Vec<Call>,
        child: Result<EnvId, KernelError>,
        upcall: u64,
    }

    impl MockSys {
        fn new(child: Result<EnvId, KernelError>) -> MockSys {
            MockSys {
                calls: Vec::new(),
                child,
                upcall: 0x5000,
            }
        }
    }

    impl Syscalls for MockSys {
        fn sys_getenvid(&mut self) -> EnvId {
            EnvId(0x1001)
        }

        fn sys_env_destroy(&mut self, _env: EnvId) -> Result<(), KernelError> {
            Ok(())
        }

        fn sys_exofork(&mut self) -> Result<EnvId, KernelError> {
            self.calls.push(Call::Exofork);
            self.child
        }

        fn sys_env_set_status(&mut self, env: EnvId, status: Status) -> Result<(), KernelError> {
            self.calls.push(Call::SetStatus { env, status });
            Ok(())
        }

        fn sys_env_set_pgfault_upcall(
            &mut self,
            env: EnvId,
            entry: u64,
        ) -> Result<(), KernelError> {
            self.calls.push(Call::SetPgfaultUpcall { env, entry });
            Ok(())
        }

        fn sys_yield(&mut self) {}

        fn sys_alloc_region(
            &mut self,
            env: EnvId,
            addr: u64,
            size: u64,
            perm: u32,
        ) -> Result<(), KernelError> {
            self.calls.push(Call::AllocRegion {
                env,
                addr,
                size,
                perm,
            });
            Ok(())
        }

        fn sys_map_region(
            &mut self,
            src: EnvId,
            src_addr: u64,
            dst: EnvId,
            dst_addr: u64,
            size: u64,
            perm: u32,
        ) -> Result<(), KernelError> {
            self.calls.push(Call::MapRegion {
                src,
                src_addr,
                dst,
                dst_addr,
                size,
                perm,
            });
            Ok(())
        }

        fn sys_unmap_region(
            &mut self,
            _env: EnvId,
            _addr: u64,
            _size: u64,
        ) -> Result<(), KernelError> {
            Ok(())
        }

        fn sys_region_refs(&mut self, _addr: u64, _size: u64, _addr2: u64, _size2: u64) -> i64 {
            0
        }

        fn sys_ipc_try_send(
            &mut self,
            _to: EnvId,
            _value: u64,
            _src_addr: u64,
            _size: u64,
            _perm: u32,
        ) -> Result<(), KernelError> {
            Ok(())
        }

        fn sys_ipc_recv(
            &mut self,
            _dst_addr: u64,
            _max_size: u64,
        ) -> Result<IpcMessage, KernelError> {
            Err(KernelError::NotReceiving)
        }

        fn refresh_identity(&mut self) {
            self.calls.push(Call::RefreshIdentity);
        }

        fn pgfault_upcall(&self) -> u64 {
            self.upcall
        }
    }

    #[test]
    fn parent_shares_upcall_then_releases_the_child() {
        let child = EnvId(0x2002);
        let mut sys = MockSys::new(Ok(child));

        assert_eq!(fork(&mut sys), Ok(child));
        assert_eq!(
            sys.calls,
            [
                Call::Exofork,
                Call::MapRegion {
                    src: EnvId::CURRENT,
                    src_addr: 0,
                    dst: child,
                    dst_addr: 0,
                    size: MAX_USER_ADDRESS,
                    perm: PROT_ALL | PROT_LAZY | PROT_COMBINE,
                },
                Call::SetPgfaultUpcall {
                    env: child,
                    entry: 0x5000
                },
                // runnable only after the space and upcall are in place
                Call::SetStatus {
                    env: child,
                    status: Status::Runnable
                },
            ]
        );
    }

    #[test]
    fn child_refreshes_identity_and_returns_zero() {
        let mut sys = MockSys::new(Ok(EnvId(0)));
        assert_eq!(fork(&mut sys), Ok(EnvId(0)));
        assert_eq!(sys.calls, [Call::Exofork, Call::RefreshIdentity]);
    }

    #[test]
    fn upcall_install_maps_the_exception_stack_first() {
        let mut sys = MockSys::new(Ok(EnvId(0x2002)));
        install_pgfault_upcall(&mut sys).unwrap();
        assert_eq!(
            sys.calls,
            [
                Call::AllocRegion {
                    env: EnvId::CURRENT,
                    addr: USER_EXC_STACK_TOP - PAGE_SIZE,
                    size: PAGE_SIZE,
                    perm: PROT_R | PROT_W,
                },
                Call::SetPgfaultUpcall {
                    env: EnvId::CURRENT,
                    entry: 0x5000
                },
            ]
        );
    }

    #[test]
    fn exofork_failure_propagates_untouched() {
        let mut sys = MockSys::new(Err(KernelError::OutOfProcesses));
        assert_eq!(fork(&mut sys), Err(KernelError::OutOfProcesses));
        assert_eq!(sys.calls, [Call::Exofork]);
    }
}
