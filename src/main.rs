// Generate this documentation in a prettier form with `cargo doc --release --features board --open`

//! CloudLockr appliance firmware image.
//!
//! Claims the board peripherals, seeds the random source from the motion sensor and the switch
//! bank, and hands everything to the [protocol engine](cloudlockr::Controller), which then serves
//! the paired client forever. See the library documentation for building and for the design of
//! the engine itself.

#![no_std]
#![no_main]
#![warn(clippy::pedantic)] // enforce pedantic checks -- false positive prone
#![deny(clippy::missing_docs_in_private_items)] // enforce documentation

use alloc_cortex_m::CortexMHeap;
use cortex_m_rt::entry;
use cortex_m_rt::exception;
use lm3s6965 as _;
#[cfg(not(feature = "semihosted"))]
use panic_halt as _;
#[cfg(feature = "semihosted")]
use panic_semihosting as _;

use cloudlockr::board::{AesAccelerator, Board, Modem, MotionSensor, Port, Uart};
use cloudlockr::config::Config;
use cloudlockr::debug;
use cloudlockr::hardware::{HardwareIo, Sensor};
use cloudlockr::Controller;

// includes the code generated by build.rs; these are the values specified at build time
include!(concat!(env!("OUT_DIR"), "/values.rs"));

/// Heap backing the request buffers, the decoded fields and the JSON responses
#[global_allocator]
static ALLOCATOR: CortexMHeap = CortexMHeap::empty();

/// Bytes reserved for the heap, just past the static data
const HEAP_SZ: usize = 32 * 1024;

/// Core clock, used to calibrate busy-wait delays
const CPU_HZ: u32 = 800_000_000;

/// Builds the 32-byte boot seed from the sensor and the switch bank
fn boot_seed(sensor: &mut MotionSensor, board: &Board) -> [u8; 32] {
    let mut seed = [0_u8; 32];
    for chunk in seed.chunks_mut(4) {
        let sample = sensor.read_environment() ^ u32::from(board.switches()).rotate_left(13);
        chunk.copy_from_slice(&sample.to_be_bytes());
    }
    seed
}

/// Entrypoint for the appliance firmware, which claims the peripherals, instantiates the
/// controller, then enters the controller run loop
#[entry]
fn main() -> ! {
    unsafe { ALLOCATOR.init(cortex_m_rt::heap_start() as usize, HEAP_SZ) }

    let board = Board::new(CPU_HZ);
    let mut sensor = MotionSensor::new();
    let seed = boot_seed(&mut sensor, &board);
    debug!("Booted; storage at {}", STORAGE_HOST);

    let mut controller = Controller::new(
        Uart::new(Port::Bluetooth),
        Modem::new(Uart::new(Port::Wifi), STORAGE_HOST),
        sensor,
        board,
        AesAccelerator::new(),
        seed,
        Config::default().with_response_delay_ms(RESPONSE_DELAY_MS),
    );

    controller.run()
}

/// Handler for exceptions generated by the processor. In our case, we are not handling them as they
/// do not pertain to our use case (every peripheral is polled)
#[exception]
#[allow(non_snake_case)]
fn DefaultHandler(_irqn: i16) {}
