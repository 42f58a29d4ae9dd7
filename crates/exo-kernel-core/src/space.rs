//! Address-space boundary
//!
//! Page-table mechanics live outside the core. The kernel manipulates
//! address spaces only through the [`AddressSpaces`] trait, with opaque
//! [`SpaceId`] handles. A map-based mock used by the test suites lives at
//! the bottom of this module.

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::error::KernelError;

// ============================================================================
// Protection and allocation flags
// ============================================================================

/// Mapping is executable
pub const PROT_X: u32 = 0x1;
/// Mapping is writable
pub const PROT_W: u32 = 0x2;
/// Mapping is readable
pub const PROT_R: u32 = 0x4;
/// Mapping is reachable from user mode (kernel-internal, never accepted
/// from user flag arguments)
pub const PROT_USER: u32 = 0x8;
/// Shared copy flag
pub const PROT_SHARE: u32 = 0x40;
/// Copy-on-write flag
pub const PROT_LAZY: u32 = 0x80;
/// Combine old and new privileges instead of replacing them
pub const PROT_COMBINE: u32 = 0x100;
/// Back fresh mappings with zero-filled memory
pub const ALLOC_ZERO: u32 = 0x10_0000;
/// Back fresh mappings with 0xFF-filled memory
pub const ALLOC_ONE: u32 = 0x20_0000;

/// Every flag a user environment may pass to the mapping syscalls
pub const PROT_ALL: u32 = PROT_X | PROT_W | PROT_R | PROT_SHARE | PROT_LAZY | PROT_COMBINE;

/// Opaque address-space handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpaceId(pub u32);

// ============================================================================
// The boundary trait
// ============================================================================

/// Operations the kernel needs from the memory subsystem.
///
/// Addresses and sizes are rounded to page granularity by the
/// implementation; callers that require alignment errors check before
/// calling.
pub trait AddressSpaces {
    /// Create an empty address space
    fn create(&mut self) -> Result<SpaceId, KernelError>;

    /// Release an address space and every mapping in it
    fn destroy(&mut self, space: SpaceId);

    /// The kernel's own address space
    fn kernel_space(&self) -> SpaceId;

    /// The space translation currently runs under
    fn active(&self) -> SpaceId;

    /// Switch the active translation
    fn switch_active(&mut self, space: SpaceId);

    /// Map `size` bytes at `dst_addr` in `dst`. With `src` given, the
    /// region is aliased from `(space, addr)` there; without it, fresh
    /// memory is allocated according to the ALLOC flags in `flags`.
    fn map(
        &mut self,
        dst: SpaceId,
        dst_addr: u64,
        src: Option<(SpaceId, u64)>,
        size: u64,
        flags: u32,
    ) -> Result<(), KernelError>;

    /// Drop any mappings covering the range; silently succeeds when
    /// nothing is mapped there
    fn unmap(&mut self, space: SpaceId, addr: u64, size: u64);

    /// Highest reference count among the pages backing the range
    fn max_ref(&self, space: SpaceId, addr: u64, size: u64) -> u64;

    /// Copy bytes into a mapped range (loader copy-in)
    fn write(&mut self, space: SpaceId, addr: u64, bytes: &[u8]) -> Result<(), KernelError>;

    /// Copy bytes out of a mapped range (console syscall)
    fn read(&self, space: SpaceId, addr: u64, len: u64) -> Result<Vec<u8>, KernelError>;

    /// Whether user code in `space` may access `[addr, addr + len)` with
    /// the access bits in `flags`
    fn user_mem_check(&self, space: SpaceId, addr: u64, len: u64, flags: u32) -> bool;
}

// ============================================================================
// Mock implementation for tests
// ============================================================================

#[cfg(any(test, feature = "std"))]
pub use mock::MockSpaces;

#[cfg(any(test, feature = "std"))]
mod mock {
    use alloc::collections::{BTreeMap, BTreeSet};
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;
    use crate::types::{MAX_USER_ADDRESS, PAGE_SIZE};

    #[derive(Clone, Debug)]
    struct MockPage {
        flags: u32,
        /// Shared by pages aliasing the same backing memory, so max_ref
        /// can count references
        backing: u64,
        data: Vec<u8>,
    }

    /// Page-granular in-memory model of the address-space boundary.
    ///
    /// Space 0 is the kernel space and starts active.
    #[derive(Debug, Default)]
    pub struct MockSpaces {
        next_space: u32,
        next_backing: u64,
        active: u32,
        alive: BTreeSet<u32>,
        pages: BTreeMap<(u32, u64), MockPage>,
        /// Force the next create() to fail
        pub fail_create: bool,
        /// Force the next map() to fail
        pub fail_map: bool,
    }

    impl MockSpaces {
        pub fn new() -> MockSpaces {
            let mut alive = BTreeSet::new();
            alive.insert(0);
            MockSpaces {
                next_space: 1,
                next_backing: 1,
                active: 0,
                alive,
                pages: BTreeMap::new(),
                fail_create: false,
                fail_map: false,
            }
        }

        /// Number of live spaces, kernel space included
        pub fn live_spaces(&self) -> usize {
            self.alive.len()
        }

        /// Whether a space has not been destroyed
        pub fn is_alive(&self, space: SpaceId) -> bool {
            self.alive.contains(&space.0)
        }

        /// Flags of the page mapped at `addr`, if any
        pub fn page_flags(&self, space: SpaceId, addr: u64) -> Option<u32> {
            let page = addr & !(PAGE_SIZE - 1);
            self.pages.get(&(space.0, page)).map(|p| p.flags)
        }

        fn page_range(addr: u64, size: u64) -> impl Iterator<Item = u64> {
            let start = addr & !(PAGE_SIZE - 1);
            let end = (addr + size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
            (start..end).step_by(PAGE_SIZE as usize)
        }
    }

    impl AddressSpaces for MockSpaces {
        fn create(&mut self) -> Result<SpaceId, KernelError> {
            if self.fail_create {
                self.fail_create = false;
                return Err(KernelError::OutOfMemory);
            }
            let id = self.next_space;
            self.next_space += 1;
            self.alive.insert(id);
            Ok(SpaceId(id))
        }

        fn destroy(&mut self, space: SpaceId) {
            self.alive.remove(&space.0);
            self.pages.retain(|(s, _), _| *s != space.0);
        }

        fn kernel_space(&self) -> SpaceId {
            SpaceId(0)
        }

        fn active(&self) -> SpaceId {
            SpaceId(self.active)
        }

        fn switch_active(&mut self, space: SpaceId) {
            assert!(self.alive.contains(&space.0), "switch to dead space");
            self.active = space.0;
        }

        fn map(
            &mut self,
            dst: SpaceId,
            dst_addr: u64,
            src: Option<(SpaceId, u64)>,
            size: u64,
            flags: u32,
        ) -> Result<(), KernelError> {
            if self.fail_map {
                self.fail_map = false;
                return Err(KernelError::OutOfMemory);
            }
            if size == 0 {
                return Ok(());
            }
            for (i, page) in Self::page_range(dst_addr, size).enumerate() {
                let new = match src {
                    None => {
                        let fill = if flags & ALLOC_ONE != 0 { 0xFF } else { 0 };
                        let backing = self.next_backing;
                        self.next_backing += 1;
                        MockPage {
                            flags,
                            backing,
                            data: vec![fill; PAGE_SIZE as usize],
                        }
                    }
                    Some((src_space, src_addr)) => {
                        let src_start = src_addr & !(PAGE_SIZE - 1);
                        let src_page = src_start + i as u64 * PAGE_SIZE;
                        let existing = self
                            .pages
                            .get(&(src_space.0, src_page))
                            .ok_or(KernelError::InvalidArgument)?;
                        let mut copy = existing.clone();
                        if flags & PROT_COMBINE != 0 {
                            copy.flags |= flags;
                        } else {
                            copy.flags = flags;
                        }
                        copy
                    }
                };
                self.pages.insert((dst.0, page), new);
            }
            Ok(())
        }

        fn unmap(&mut self, space: SpaceId, addr: u64, size: u64) {
            for page in Self::page_range(addr, size) {
                self.pages.remove(&(space.0, page));
            }
        }

        fn max_ref(&self, space: SpaceId, addr: u64, size: u64) -> u64 {
            let mut max = 0;
            for page in Self::page_range(addr, size) {
                let Some(p) = self.pages.get(&(space.0, page)) else {
                    continue;
                };
                let refs = self
                    .pages
                    .values()
                    .filter(|q| q.backing == p.backing)
                    .count() as u64;
                max = max.max(refs);
            }
            max
        }

        fn write(&mut self, space: SpaceId, addr: u64, bytes: &[u8]) -> Result<(), KernelError> {
            let mut offset = 0usize;
            while offset < bytes.len() {
                let va = addr + offset as u64;
                let page = va & !(PAGE_SIZE - 1);
                let page_off = (va - page) as usize;
                let chunk = (PAGE_SIZE as usize - page_off).min(bytes.len() - offset);
                let p = self
                    .pages
                    .get_mut(&(space.0, page))
                    .ok_or(KernelError::InvalidArgument)?;
                p.data[page_off..page_off + chunk]
                    .copy_from_slice(&bytes[offset..offset + chunk]);
                offset += chunk;
            }
            Ok(())
        }

        fn read(&self, space: SpaceId, addr: u64, len: u64) -> Result<Vec<u8>, KernelError> {
            let mut out = Vec::with_capacity(len as usize);
            let mut offset = 0u64;
            while offset < len {
                let va = addr + offset;
                let page = va & !(PAGE_SIZE - 1);
                let page_off = (va - page) as usize;
                let chunk = ((PAGE_SIZE as usize - page_off) as u64).min(len - offset);
                let p = self
                    .pages
                    .get(&(space.0, page))
                    .ok_or(KernelError::InvalidArgument)?;
                out.extend_from_slice(&p.data[page_off..page_off + chunk as usize]);
                offset += chunk;
            }
            Ok(out)
        }

        fn user_mem_check(&self, space: SpaceId, addr: u64, len: u64, flags: u32) -> bool {
            if len == 0 {
                return true;
            }
            let Some(end) = addr.checked_add(len) else {
                return false;
            };
            if end > MAX_USER_ADDRESS {
                return false;
            }
            let access = flags & (PROT_R | PROT_W | PROT_X);
            for page in Self::page_range(addr, len) {
                match self.pages.get(&(space.0, page)) {
                    Some(p) => {
                        if p.flags & PROT_USER == 0 || p.flags & access != access {
                            return false;
                        }
                    }
                    None => return false,
                }
            }
            true
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PAGE_SIZE;

    #[test]
    fn prot_all_excludes_kernel_only_bits() {
        assert_eq!(PROT_ALL & PROT_USER, 0);
        assert_eq!(PROT_ALL & ALLOC_ZERO, 0);
        assert_eq!(PROT_ALL & ALLOC_ONE, 0);
    }

    #[test]
    fn mock_create_destroy() {
        let mut mem = MockSpaces::new();
        let s = mem.create().unwrap();
        assert!(mem.is_alive(s));
        assert_eq!(mem.live_spaces(), 2);
        mem.destroy(s);
        assert!(!mem.is_alive(s));
        assert_eq!(mem.live_spaces(), 1);
    }

    #[test]
    fn mock_fresh_map_zero_and_one_fill() {
        let mut mem = MockSpaces::new();
        let s = mem.create().unwrap();
        mem.map(s, 0x1000, None, PAGE_SIZE, PROT_R | PROT_USER | ALLOC_ZERO)
            .unwrap();
        mem.map(s, 0x2000, None, PAGE_SIZE, PROT_R | PROT_USER | ALLOC_ONE)
            .unwrap();
        assert_eq!(mem.read(s, 0x1000, 4).unwrap(), [0, 0, 0, 0]);
        assert_eq!(mem.read(s, 0x2000, 4).unwrap(), [0xFF; 4]);
    }

    #[test]
    fn mock_alias_map_shares_backing() {
        let mut mem = MockSpaces::new();
        let a = mem.create().unwrap();
        let b = mem.create().unwrap();
        mem.map(a, 0x1000, None, PAGE_SIZE, PROT_R | PROT_W | PROT_USER | ALLOC_ZERO)
            .unwrap();
        mem.write(a, 0x1000, b"hello").unwrap();
        mem.map(b, 0x5000, Some((a, 0x1000)), PAGE_SIZE, PROT_R | PROT_USER)
            .unwrap();
        assert_eq!(mem.read(b, 0x5000, 5).unwrap(), b"hello");
        assert_eq!(mem.max_ref(a, 0x1000, PAGE_SIZE), 2);
    }

    #[test]
    fn mock_alias_of_unmapped_source_fails() {
        let mut mem = MockSpaces::new();
        let a = mem.create().unwrap();
        let b = mem.create().unwrap();
        let res = mem.map(b, 0x5000, Some((a, 0x1000)), PAGE_SIZE, PROT_R);
        assert_eq!(res, Err(KernelError::InvalidArgument));
    }

    #[test]
    fn mock_user_mem_check_requires_user_bit_and_access() {
        let mut mem = MockSpaces::new();
        let s = mem.create().unwrap();
        mem.map(s, 0x1000, None, PAGE_SIZE, PROT_R | PROT_USER | ALLOC_ZERO)
            .unwrap();
        mem.map(s, 0x2000, None, PAGE_SIZE, PROT_R | ALLOC_ZERO).unwrap();
        assert!(mem.user_mem_check(s, 0x1000, 16, PROT_R));
        assert!(!mem.user_mem_check(s, 0x1000, 16, PROT_W));
        // kernel-only page
        assert!(!mem.user_mem_check(s, 0x2000, 16, PROT_R));
        // unmapped
        assert!(!mem.user_mem_check(s, 0x3000, 16, PROT_R));
    }

    #[test]
    fn mock_unmap_is_idempotent() {
        let mut mem = MockSpaces::new();
        let s = mem.create().unwrap();
        mem.unmap(s, 0x4000, PAGE_SIZE);
        mem.map(s, 0x4000, None, PAGE_SIZE, PROT_R | PROT_USER | ALLOC_ZERO)
            .unwrap();
        mem.unmap(s, 0x4000, PAGE_SIZE);
        assert_eq!(mem.page_flags(s, 0x4000), None);
    }
}
