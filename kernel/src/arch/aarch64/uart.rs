//! PL011 UART driver backing the structured logger and the `WRITE`/`READ`
//! console syscalls (spec §4.6). Grounded on the teacher's
//! `arch::aarch64::uart` MMIO register layout for QEMU `virt`'s PL011 at
//! `0x0900_0000`.

use core::fmt;
use core::ptr;

use spin::Mutex;

use crate::sync::GlobalState;

/// PL011 base address on QEMU virt.
const UART_BASE: usize = 0x0900_0000;

const UARTDR: usize = 0x000;
const UARTFR: usize = 0x018;
const UARTIBRD: usize = 0x024;
const UARTFBRD: usize = 0x028;
const UARTLCR_H: usize = 0x02C;
const UARTCR: usize = 0x030;
const UARTIMSC: usize = 0x038;
const UARTICR: usize = 0x044;

const FR_TXFF: u32 = 1 << 5;
const FR_RXFE: u32 = 1 << 4;

struct Pl011 {
    base: usize,
}

impl Pl011 {
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: `base` is the PL011 MMIO region identity-mapped by
        // `arch::aarch64::boot`; `offset` is one of the register constants
        // above.
        unsafe { ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn write(&self, offset: usize, value: u32) {
        // SAFETY: see `read`.
        unsafe { ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }

    fn init(&self) {
        self.write(UARTCR, 0);
        self.write(UARTIBRD, 13);
        self.write(UARTFBRD, 1);
        self.write(UARTLCR_H, 0b11 << 5); // 8 data bits, FIFOs enabled
        self.write(UARTIMSC, 0);
        self.write(UARTICR, 0x7ff);
        self.write(UARTCR, (1 << 0) | (1 << 8) | (1 << 9)); // UARTEN | TXE | RXE
    }

    fn putc(&self, byte: u8) {
        while self.read(UARTFR) & FR_TXFF != 0 {}
        self.write(UARTDR, byte as u32);
    }

    fn try_getc(&self) -> Option<u8> {
        if self.read(UARTFR) & FR_RXFE != 0 {
            None
        } else {
            Some(self.read(UARTDR) as u8)
        }
    }
}

impl fmt::Write for Pl011 {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            if b == b'\n' {
                self.putc(b'\r');
            }
            self.putc(b);
        }
        Ok(())
    }
}

static UART: GlobalState<Mutex<Pl011>> = GlobalState::new();

/// Initialize the PL011 UART. Must run once during boot, after the device
/// region is identity-mapped.
pub fn init() {
    let uart = Pl011 { base: UART_BASE };
    uart.init();
    let _ = UART.init(Mutex::new(uart));
}

/// Run `f` with exclusive access to the UART as a [`fmt::Write`] sink.
pub fn with_console<R>(f: impl FnOnce(&mut dyn fmt::Write) -> R) -> Option<R> {
    UART.with(|u| f(&mut *u.lock()))
}

/// Write a single byte, blocking until the transmit FIFO has room. Backs
/// the `WRITE` console syscall.
pub fn write_byte(byte: u8) -> Option<()> {
    UART.with(|u| u.lock().putc(byte))
}

/// Non-blocking byte read. Backs the `READ` console syscall.
pub fn try_read_byte() -> Option<u8> {
    UART.with(|u| u.lock().try_getc())?
}
