//! 16550-compatible UART driver for the client (Bluetooth) and modem (WiFi) links.
//!
//! The UARTs sit behind the lightweight bridge with their byte-wide registers on a two-byte
//! stride. They are polled: the receive side is checked through the line status register, and the
//! transmit side blocks while the holding register is full.

use core::fmt::{Debug, Formatter, Result as FmtResult};

use cty::uintptr_t;
use volatile_register::{RO, RW};

use super::{BAUD_RATE, BUS_CLOCK_HZ};
use crate::link::Link;

#[repr(C)]
struct Registers {
    /// Receive/transmit holding register; divisor latch LSB while DLAB is set
    data: RW<u8>,
    _pad0: u8,
    /// Interrupt enable; divisor latch MSB while DLAB is set
    ier: RW<u8>,
    _pad1: u8,
    /// FIFO control on write, interrupt identification on read
    fcr: RW<u8>,
    _pad2: u8,
    lcr: RW<u8>,
    _pad3: u8,
    _mcr: RW<u8>,
    _pad4: u8,
    lsr: RO<u8>,
    _pad5: u8,
    _msr: RO<u8>,
    _pad6: u8,
    _scr: RW<u8>,
    _pad7: u8,
}

/// Line status bits
enum LineStatus {
    DataReady = 0x01,
    TransmitEmpty = 0x20,
}

/// Base addresses of the two UARTs
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Port {
    Wifi = 0xFF21_0200,
    Bluetooth = 0xFF21_0220,
}

/// A polled UART
pub struct Uart {
    regs: &'static mut Registers,
    port: Port,
}

impl Uart {
    /// Claims and initialises the UART at `port`: 8 data bits, no parity, one stop bit, FIFOs
    /// reset.
    ///
    /// Each port must be claimed at most once.
    pub fn new(port: Port) -> Self {
        let regs = unsafe { &mut *(port as u32 as uintptr_t as *mut Registers) };
        let divisor = BUS_CLOCK_HZ / (BAUD_RATE * 16);
        unsafe {
            regs.lcr.write(0x80);
            regs.data.write(divisor as u8);
            regs.ier.write((divisor >> 8) as u8);
            regs.lcr.write(0x03);
            regs.fcr.write(0x06);
            regs.fcr.write(0x00);
        }
        Uart { regs, port }
    }

    /// Whether a received byte is waiting
    pub fn avail(&self) -> bool {
        self.regs.lsr.read() & LineStatus::DataReady as u8 != 0
    }

    pub fn readb(&mut self) -> Option<u8> {
        if self.avail() {
            Some(self.regs.data.read())
        } else {
            None
        }
    }

    pub fn writeb(&mut self, data: u8) {
        while self.regs.lsr.read() & LineStatus::TransmitEmpty as u8 == 0 {}
        unsafe {
            self.regs.data.write(data);
        }
    }

    pub fn write(&mut self, buf: &[u8]) {
        for b in buf {
            self.writeb(*b);
        }
    }

    /// Discards everything in the receive FIFO
    pub fn flush(&mut self) {
        while self.readb().is_some() {}
    }
}

impl Link for Uart {
    fn send(&mut self, bytes: &[u8]) {
        self.write(bytes);
    }

    fn try_receive_byte(&mut self) -> Option<u8> {
        self.readb()
    }
}

impl Debug for Uart {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Uart({:?})", self.port)
    }
}
