//! MLK executable format and the build-time binary registry (spec §6's
//! "Executable format consumed by SPAWN" and "Binary registry"). The wire
//! format itself — a 16-byte header plus a flat, position-independent code
//! image — and the act of placing those bytes into a new address space are
//! the part of this contract the core kernel owns; the registry is just a
//! closed, build-time-fixed set of such images this particular build ships.

use crate::config::{MAX_CODE_SIZE, PAGE_SIZE, USER_CODE_BASE, USER_STACK_PAGES, USER_STACK_TOP};
use crate::error::{KernelError, KernelResult};
use crate::mm::{MapFlags, PhysAddr, VirtAddr};
use crate::process::Process;
use crate::sched::{Priority, ThreadId};

const MAGIC: [u8; 4] = [b'M', b'L', b'K', 0x01];
const HEADER_SIZE: usize = 16;

/// A validated binary: the raw code slice (header stripped) and its entry
/// offset, ready for [`load_into`].
pub struct Binary {
    pub code: &'static [u8],
    pub entry_offset: u32,
}

/// Parse and validate an MLK image. Rejects a bad magic, an out-of-range
/// `code_size`, a non-zero reserved field, an `entry_offset` at or beyond
/// `code_size`, or a buffer shorter than the header claims.
fn parse_mlk(bytes: &'static [u8]) -> KernelResult<Binary> {
    if bytes.len() < HEADER_SIZE || bytes[0..4] != MAGIC {
        return Err(KernelError::InvalidArgument { name: "mlk magic" });
    }
    let entry_offset = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    let code_size = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    let reserved = u32::from_le_bytes(bytes[12..16].try_into().unwrap());

    if reserved != 0 {
        return Err(KernelError::InvalidArgument { name: "mlk reserved" });
    }
    if code_size == 0 || code_size > MAX_CODE_SIZE {
        return Err(KernelError::InvalidArgument { name: "mlk code_size" });
    }
    if entry_offset >= code_size {
        return Err(KernelError::InvalidArgument { name: "mlk entry_offset" });
    }
    if bytes.len() < HEADER_SIZE + code_size as usize {
        return Err(KernelError::InvalidArgument { name: "mlk truncated image" });
    }

    Ok(Binary {
        code: &bytes[HEADER_SIZE..HEADER_SIZE + code_size as usize],
        entry_offset,
    })
}

/// `WRITE(addr, 14)` of `"Hello, World!\n"` followed by `EXIT(0)` — the
/// program the worked hello round-trip (spec's test scenario S1) spawns.
#[rustfmt::skip]
static HELLO_MLK: &[u8] = &[
    b'M', b'L', b'K', 0x01,
    0x00, 0x00, 0x00, 0x00, // entry_offset = 0
    0x2a, 0x00, 0x00, 0x00, // code_size = 42
    0x00, 0x00, 0x00, 0x00, // reserved

    0xe0, 0x00, 0x00, 0x10, // adr  x0, msg
    0xc1, 0x01, 0x80, 0xd2, // movz x1, #14
    0x08, 0x05, 0x80, 0xd2, // movz x8, #40      (WRITE)
    0x01, 0x00, 0x00, 0xd4, // svc  #0
    0x00, 0x00, 0x80, 0xd2, // movz x0, #0
    0x08, 0x00, 0x80, 0xd2, // movz x8, #0       (EXIT)
    0x01, 0x00, 0x00, 0xd4, // svc  #0
    b'H', b'e', b'l', b'l', b'o', b',', b' ',
    b'W', b'o', b'r', b'l', b'd', b'!', b'\n', // msg:
];

/// `EXIT(0)` with no other side effects — a minimal child for exercising
/// spawn/wait without touching the console.
#[rustfmt::skip]
static EXIT_ONLY_MLK: &[u8] = &[
    b'M', b'L', b'K', 0x01,
    0x00, 0x00, 0x00, 0x00, // entry_offset = 0
    0x0c, 0x00, 0x00, 0x00, // code_size = 12
    0x00, 0x00, 0x00, 0x00, // reserved

    0x00, 0x00, 0x80, 0xd2, // movz x0, #0
    0x08, 0x00, 0x80, 0xd2, // movz x8, #0       (EXIT)
    0x01, 0x00, 0x00, 0xd4, // svc  #0
];

/// The closed set of binaries this build embeds (spec's "Binary registry"):
/// ids are this build's own ABI and not fixed by the core design.
const REGISTRY: &[(u64, &[u8])] = &[(0, HELLO_MLK), (1, EXIT_ONLY_MLK)];

/// Look up a binary id in the build-time registry and validate its MLK
/// header. `SPAWN` rejects unknown ids (spec's "rejects unknown ones").
pub fn lookup_binary(id: u64) -> KernelResult<Binary> {
    let bytes = REGISTRY
        .iter()
        .find(|(rid, _)| *rid == id)
        .map(|(_, bytes)| *bytes)
        .ok_or(KernelError::InvalidArgument { name: "binary id" })?;
    parse_mlk(bytes)
}

/// Copy `code` into freshly allocated physical frames mapped read/execute
/// at the fixed user code base, allocate a fixed-size user stack at the
/// fixed high stack address, and start a thread at `entry_offset` (spec's
/// "loader" paragraph). On any failure, every frame allocated so far is
/// freed before returning — `process::create_user_process` relies on this
/// to keep a partially-built process unreachable.
pub fn load_into(process: &mut Process, code: &[u8], entry_offset: u32) -> KernelResult<ThreadId> {
    let code_pages = (code.len()).div_ceil(PAGE_SIZE);
    let code_phys = crate::mm::frame_allocator::alloc_contiguous(code_pages)?;

    // SAFETY: `code_phys` was just allocated and is identity-mapped in the
    // kernel's own view of RAM; no other reference to it exists yet.
    let dst = unsafe { core::slice::from_raw_parts_mut(code_phys.as_usize() as *mut u8, code_pages * PAGE_SIZE) };
    dst[..code.len()].copy_from_slice(code);
    dst[code.len()..].fill(0);

    if let Err(e) = map_region(process, USER_CODE_BASE, code_phys, code_pages, MapFlags::USER_RX) {
        let _ = crate::mm::frame_allocator::free_pages(code_phys, code_pages);
        return Err(e);
    }
    process.track_region(code_phys, code_pages)?;

    let stack_base = USER_STACK_TOP - (USER_STACK_PAGES * PAGE_SIZE) as u64;
    let stack_phys = match crate::mm::frame_allocator::alloc_contiguous(USER_STACK_PAGES) {
        Ok(p) => p,
        Err(e) => return Err(e),
    };
    if let Err(e) = map_region(process, stack_base, stack_phys, USER_STACK_PAGES, MapFlags::USER_RW) {
        let _ = crate::mm::frame_allocator::free_pages(stack_phys, USER_STACK_PAGES);
        return Err(e);
    }
    process.track_region(stack_phys, USER_STACK_PAGES)?;

    let kernel_stack_phys = crate::mm::frame_allocator::alloc_contiguous(crate::config::KERNEL_STACK_PAGES)?;
    process.track_region(kernel_stack_phys, crate::config::KERNEL_STACK_PAGES)?;

    let entry = USER_CODE_BASE + entry_offset as u64;
    let user_sp = USER_STACK_TOP;
    let kernel_stack_top = kernel_stack_phys.as_u64() + crate::arch::aarch64::context::KERNEL_STACK_SIZE as u64;

    // SAFETY: `kernel_stack_top` is the exclusive top of the kernel stack
    // just allocated above, owned by no other thread.
    let kernel_sp = unsafe {
        crate::arch::aarch64::context::prepare_initial_frame(kernel_stack_top, entry, user_sp, true)
    };

    let tid = crate::sched::spawn_thread(
        Some(process.pid),
        Priority::Normal,
        entry,
        user_sp,
        kernel_stack_phys,
        true,
    )?;
    crate::sched::with_thread_mut(tid, |t| t.kernel_sp = kernel_sp);

    Ok(tid)
}

fn map_region(
    process: &mut Process,
    virt_base: u64,
    phys_base: PhysAddr,
    page_count: usize,
    flags: MapFlags,
) -> KernelResult<()> {
    for i in 0..page_count {
        let virt = VirtAddr::new(virt_base + (i * PAGE_SIZE) as u64);
        let phys = phys_base.offset((i * PAGE_SIZE) as u64);
        process.address_space.map(virt, phys, flags)?;
    }
    Ok(())
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn hello_binary_parses() {
        let binary = parse_mlk(HELLO_MLK).unwrap();
        assert_eq!(binary.entry_offset, 0);
        assert_eq!(binary.code.len(), 42);
    }

    #[test]
    fn rejects_bad_magic() {
        static BAD: &[u8] = &[0; 16];
        assert!(parse_mlk(BAD).is_err());
    }

    #[test]
    fn rejects_entry_beyond_code() {
        static BAD: &[u8] = &[
            b'M', b'L', b'K', 0x01,
            0x05, 0x00, 0x00, 0x00,
            0x04, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0, 0, 0, 0,
        ];
        assert!(matches!(parse_mlk(BAD), Err(KernelError::InvalidArgument { .. })));
    }

    #[test]
    fn rejects_nonzero_reserved() {
        static BAD: &[u8] = &[
            b'M', b'L', b'K', 0x01,
            0x00, 0x00, 0x00, 0x00,
            0x04, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0, 0, 0, 0,
        ];
        assert!(matches!(parse_mlk(BAD), Err(KernelError::InvalidArgument { .. })));
    }

    #[test]
    fn unknown_binary_id_rejected() {
        assert!(lookup_binary(9999).is_err());
    }
}
