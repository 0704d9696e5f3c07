//! Architecture abstraction. This kernel targets exactly one platform —
//! 64-bit ARM (QEMU `virt`, Cortex-A72) — so there is no multi-arch
//! dispatch here, just the one module the rest of the kernel reaches
//! into directly (`crate::arch::aarch64::...`).

pub mod aarch64;
