//! Binary entry point: pulls in the library crate's module tree and boot
//! stub. All real logic lives in `lib.rs`/`arch::aarch64::boot`; this file
//! only exists because `cargo` wants a `main.rs` for the `[[bin]]` target.

#![no_std]
#![no_main]

use microkernel as _;
