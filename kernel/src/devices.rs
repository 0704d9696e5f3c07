//! Static device-region allowlist consulted by `MAP_DEVICE` (spec §4.6):
//! "refuses any physical range not fully contained in a static allowlist
//! table". Grounded on `arch::aarch64`'s own platform constants (GICD/GICC,
//! UART) plus the VirtIO-MMIO region QEMU `virt` exposes, the exact three
//! ranges spec §6 names as "Device regions mappable by MAP_DEVICE".

use crate::arch::aarch64::{GICC_BASE, GICD_BASE, GIC_SIZE, UART_BASE, UART_SIZE};
use crate::config::PAGE_SIZE;

/// One allow-listed physical range, `[base, base + len)`.
struct Region {
    base: u64,
    len: u64,
}

const VIRTIO_MMIO_BASE: u64 = 0x0a00_0000;
const VIRTIO_MMIO_SLOTS: u64 = 32;
const VIRTIO_MMIO_SLOT_SIZE: u64 = 512;

const ALLOWLIST: &[Region] = &[
    Region { base: GICD_BASE, len: GIC_SIZE },
    Region { base: GICC_BASE, len: GIC_SIZE },
    Region { base: UART_BASE, len: UART_SIZE },
    Region { base: VIRTIO_MMIO_BASE, len: VIRTIO_MMIO_SLOTS * VIRTIO_MMIO_SLOT_SIZE },
];

/// True iff `[phys, phys + len)` is fully contained in one allow-listed
/// region. A request spanning two adjacent regions is rejected, matching
/// the spec's "fully contained" wording literally.
pub fn is_allowed(phys: u64, len: u64) -> bool {
    if len == 0 {
        return false;
    }
    let end = match phys.checked_add(len) {
        Some(e) => e,
        None => return false,
    };
    ALLOWLIST.iter().any(|r| {
        let region_end = r.base + r.len;
        phys >= r.base && end <= region_end
    })
}

/// Number of 4 KiB pages `len` bytes (starting at a page-aligned `phys`)
/// spans, used by `MAP_DEVICE` to map one page at a time.
pub fn page_count(len: u64) -> usize {
    (len as usize).div_ceil(PAGE_SIZE)
}
