//! The parallel I/O peripherals (switch bank and hex display) and the motion sensor.

use cortex_m::asm;
use cty::uintptr_t;
use volatile_register::{RO, RW};

use crate::debug;
use crate::hardware::{HardwareIo, MotionSample, Sensor, MOTION_BURST_SZ};

const SWITCHES: uintptr_t = 0xFF20_0000;
const HEX0_1: uintptr_t = 0xFF20_0030;
const HEX2_3: uintptr_t = 0xFF20_0040;
const HEX4_5: uintptr_t = 0xFF20_0050;

/// Switch bank, hex display and busy-wait delays
pub struct Board {
    switches: &'static RO<u32>,
    /// Digit pairs, least significant first
    hex: [&'static RW<u32>; 3],
    cycles_per_ms: u32,
}

impl Board {
    /// Claims the parallel I/O peripherals. `cpu_hz` calibrates the delays.
    pub fn new(cpu_hz: u32) -> Self {
        let (switches, hex) = unsafe {
            (
                &*(SWITCHES as *const RO<u32>),
                [
                    &*(HEX0_1 as *const RW<u32>),
                    &*(HEX2_3 as *const RW<u32>),
                    &*(HEX4_5 as *const RW<u32>),
                ],
            )
        };
        Board {
            switches,
            hex,
            cycles_per_ms: cpu_hz / 1000,
        }
    }
}

impl HardwareIo for Board {
    fn switches(&self) -> u8 {
        self.switches.read() as u8
    }

    fn show_challenge(&mut self, code: u32) {
        for (i, pair) in self.hex.iter().enumerate() {
            unsafe { pair.write((code >> (8 * i)) & 0xff) }
        }
    }

    fn clear_challenge(&mut self) {
        for pair in &self.hex {
            unsafe { pair.write(0) }
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            asm::delay(self.cycles_per_ms);
        }
    }
}

/// Avalon SPI master registers
#[repr(C)]
struct Spi {
    rxdata: RO<u32>,
    txdata: RW<u32>,
    status: RO<u32>,
    control: RW<u32>,
    _reserved: u32,
    slaveselect: RW<u32>,
}

enum SpiStatus {
    TransmitEmpty = 0x20,
    TransmitReady = 0x40,
    ReceiveReady = 0x80,
}

/// Forces the slave select line while set
const SPI_SSO: u32 = 0x400;

const SPI_BASE: uintptr_t = 0xFF20_2060;

/// Register address flag requesting a read
const READ_FLAG: u8 = 0x80;
const INT_STATUS: u8 = 0x3A;
const PWR_MGMT_1: u8 = 0x6B;

/// Reads attempted before falling back on the previous value
const SAMPLE_ATTEMPTS: usize = 8;

/// The MPU-9250 motion sensor on the first SPI slave select
pub struct MotionSensor {
    spi: &'static mut Spi,
    /// Environment value of the last fresh sample
    last: u32,
}

impl MotionSensor {
    /// Claims the SPI master and wakes the sensor on its gyroscope clock
    pub fn new() -> Self {
        let spi = unsafe { &mut *(SPI_BASE as *mut Spi) };
        let mut sensor = MotionSensor { spi, last: 0 };
        sensor.transfer(&[PWR_MGMT_1, 0x01], &mut []);
        sensor
    }

    fn wait(&self, status: SpiStatus) {
        let mask = status as u32;
        while self.spi.status.read() & mask == 0 {}
    }

    /// Clocks one byte out and one byte in
    fn exchange(&mut self, out: u8) -> u8 {
        self.wait(SpiStatus::TransmitReady);
        unsafe { self.spi.txdata.write(out.into()) }
        self.wait(SpiStatus::ReceiveReady);
        self.spi.rxdata.read() as u8
    }

    /// Writes `tx`, then reads `rx.len()` bytes, under one slave select
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) {
        unsafe {
            self.spi.slaveselect.write(0x01);
            self.spi.control.write(SPI_SSO);
        }
        for b in tx {
            self.exchange(*b);
        }
        for b in rx.iter_mut() {
            *b = self.exchange(0);
        }
        self.wait(SpiStatus::TransmitEmpty);
        unsafe { self.spi.control.write(0) }
    }

    /// One register burst, if the sensor has fresh data
    pub fn sample(&mut self) -> Option<MotionSample> {
        let mut burst = [0_u8; MOTION_BURST_SZ];
        self.transfer(&[INT_STATUS | READ_FLAG], &mut burst);
        MotionSample::from_burst(&burst)
    }
}

impl Sensor for MotionSensor {
    fn read_environment(&mut self) -> u32 {
        match (0..SAMPLE_ATTEMPTS).find_map(|_| self.sample()) {
            Some(sample) => self.last = sample.environment(),
            None => {
                debug!("Motion sensor had no fresh data");
            }
        }
        self.last
    }
}
