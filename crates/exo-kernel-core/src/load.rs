//! Boot-image (ELF64) loader
//!
//! Parses the image out of a byte slice, validates its structure, then
//! materializes each loadable segment: fresh zeroed memory is mapped at
//! the segment's address in the kernel space, the file bytes are copied
//! in, the region is remapped into the target environment with the
//! segment's own protection, and the kernel-space scratch mapping is
//! dropped. The whole image is validated before the first mapping so a
//! malformed image has no side effects.

use crate::env::EnvTable;
use crate::error::KernelError;
use crate::space::{AddressSpaces, ALLOC_ZERO, PROT_R, PROT_USER, PROT_W, PROT_X};
use crate::types::{PAGE_SIZE, USER_STACK_TOP};

const ELF_MAGIC: u32 = 0x464C_457F; // "\x7fELF", little-endian

const EHDR_SIZE: usize = 64;
const PHDR_SIZE: u16 = 56;
const SHDR_SIZE: u16 = 64;

const PT_LOAD: u32 = 1;

const PF_X: u32 = 0x1;
const PF_W: u32 = 0x2;
const PF_R: u32 = 0x4;

#[derive(Clone, Copy, Debug)]
struct Segment {
    offset: u64,
    vaddr: u64,
    filesz: u64,
    memsz: u64,
    prot: u32,
}

fn read_u16(b: &[u8], off: usize) -> Result<u16, KernelError> {
    let s = b.get(off..off + 2).ok_or(KernelError::InvalidImage)?;
    let a: [u8; 2] = s.try_into().map_err(|_| KernelError::InvalidImage)?;
    Ok(u16::from_le_bytes(a))
}

fn read_u32(b: &[u8], off: usize) -> Result<u32, KernelError> {
    let s = b.get(off..off + 4).ok_or(KernelError::InvalidImage)?;
    let a: [u8; 4] = s.try_into().map_err(|_| KernelError::InvalidImage)?;
    Ok(u32::from_le_bytes(a))
}

fn read_u64(b: &[u8], off: usize) -> Result<u64, KernelError> {
    let s = b.get(off..off + 8).ok_or(KernelError::InvalidImage)?;
    let a: [u8; 8] = s.try_into().map_err(|_| KernelError::InvalidImage)?;
    Ok(u64::from_le_bytes(a))
}

fn prot_from_elf(p_flags: u32) -> u32 {
    let mut prot = 0;
    if p_flags & PF_R != 0 {
        prot |= PROT_R;
    }
    if p_flags & PF_W != 0 {
        prot |= PROT_W;
    }
    if p_flags & PF_X != 0 {
        prot |= PROT_X;
    }
    prot
}

/// Validate the image and collect its loadable segments plus the entry
/// point.
fn parse(image: &[u8]) -> Result<(u64, seglist::Segments), KernelError> {
    if image.len() < EHDR_SIZE {
        return Err(KernelError::InvalidImage);
    }
    if read_u32(image, 0)? != ELF_MAGIC {
        return Err(KernelError::InvalidImage);
    }
    if read_u16(image, 54)? != PHDR_SIZE {
        return Err(KernelError::InvalidImage);
    }
    if read_u16(image, 58)? != SHDR_SIZE {
        return Err(KernelError::InvalidImage);
    }
    let shnum = read_u16(image, 60)?;
    let shstrndx = read_u16(image, 62)?;
    if shstrndx >= shnum {
        return Err(KernelError::InvalidImage);
    }

    let entry = read_u64(image, 24)?;
    let phoff = read_u64(image, 32)?;
    let phnum = read_u16(image, 56)?;

    let mut segments = seglist::Segments::new();
    for i in 0..phnum as u64 {
        let base = phoff
            .checked_add(i * PHDR_SIZE as u64)
            .ok_or(KernelError::InvalidImage)? as usize;
        if read_u32(image, base)? != PT_LOAD {
            continue;
        }
        let p_flags = read_u32(image, base + 4)?;
        let offset = read_u64(image, base + 8)?;
        let vaddr = read_u64(image, base + 16)?;
        let filesz = read_u64(image, base + 32)?;
        let memsz = read_u64(image, base + 40)?;

        if filesz > memsz {
            return Err(KernelError::InvalidImage);
        }
        let end = offset.checked_add(filesz).ok_or(KernelError::InvalidImage)?;
        if end > image.len() as u64 {
            return Err(KernelError::InvalidImage);
        }

        segments.push(Segment {
            offset,
            vaddr,
            filesz,
            memsz,
            prot: prot_from_elf(p_flags),
        })?;
    }

    Ok((entry, segments))
}

/// Load an ELF64 image into the environment in slot `idx`.
///
/// Structural problems are reported as `InvalidImage` before any state
/// changes; mapping failures propagate from the memory subsystem. The
/// entry point lands in the environment's `rip` and one zeroed
/// read/write stack page is mapped just below `USER_STACK_TOP`.
pub fn load_image<M: AddressSpaces>(
    table: &mut EnvTable,
    mem: &mut M,
    idx: usize,
    image: &[u8],
) -> Result<(), KernelError> {
    let (entry, segments) = parse(image)?;

    let kspace = mem.kernel_space();
    let env_space = table.get(idx).space;

    for seg in segments.iter() {
        // Scratch-map into the kernel space so the file bytes can be
        // copied in, then alias into the environment and drop the
        // scratch mapping.
        mem.map(
            kspace,
            seg.vaddr,
            None,
            seg.memsz,
            PROT_R | PROT_W | PROT_X | ALLOC_ZERO,
        )?;
        let file = &image[seg.offset as usize..(seg.offset + seg.filesz) as usize];
        mem.write(kspace, seg.vaddr, file)?;
        mem.map(
            env_space,
            seg.vaddr,
            Some((kspace, seg.vaddr)),
            seg.memsz,
            seg.prot | PROT_USER,
        )?;
        mem.unmap(kspace, seg.vaddr, seg.memsz);
    }

    table.get_mut(idx).trap_frame.rip = entry;

    mem.map(
        env_space,
        USER_STACK_TOP - PAGE_SIZE,
        None,
        PAGE_SIZE,
        PROT_R | PROT_W | PROT_USER | ALLOC_ZERO,
    )?;

    Ok(())
}

/// Fixed-capacity segment list; images carrying more than
/// `MAX_LOAD_SEGMENTS` loadable segments are rejected as invalid.
mod seglist {
    use super::Segment;
    use crate::error::KernelError;
    use crate::types::MAX_LOAD_SEGMENTS;

    pub(super) struct Segments {
        buf: [Option<Segment>; MAX_LOAD_SEGMENTS],
        len: usize,
    }

    impl Segments {
        pub(super) fn new() -> Segments {
            Segments {
                buf: [None; MAX_LOAD_SEGMENTS],
                len: 0,
            }
        }

        pub(super) fn push(&mut self, seg: Segment) -> Result<(), KernelError> {
            if self.len == MAX_LOAD_SEGMENTS {
                return Err(KernelError::InvalidImage);
            }
            self.buf[self.len] = Some(seg);
            self.len += 1;
            Ok(())
        }

        pub(super) fn iter(&self) -> impl Iterator<Item = &Segment> {
            self.buf[..self.len].iter().filter_map(|s| s.as_ref())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
