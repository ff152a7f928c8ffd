//! Memory-mapped implementations of every collaborator of the protocol engine.
//!
//! All unsafe code of the crate lives here, as volatile reads and writes of the peripheral
//! registers behind the FPGA bridge. Each peripheral is claimed once at boot by the firmware
//! binary and handed to the [controller](crate::controller::Controller) by value.
//!
//! The register addresses are those of the appliance's FPGA fabric (UARTs, AES units, switches,
//! HEX displays and the SPI core at `0xFF20_0000..0xFF21_0000`). The firmware image itself is
//! linked with the `lm3s6965` runtime and memory layout, so it runs under an emulated lm3s6965
//! with those peripherals mapped in; it is not a deployable image for the appliance's own
//! application processor.

mod accelerator;
mod interface;
mod modem;
mod peripherals;

pub use accelerator::AesAccelerator;
pub use interface::{Port, Uart};
pub use modem::Modem;
pub use peripherals::{Board, MotionSensor};

/// Clock driving the bridge peripherals and the UART baud generators
pub const BUS_CLOCK_HZ: u32 = 50_000_000;

/// Baud rate of both the client and the modem links
pub const BAUD_RATE: u32 = 115_200;
