//! Apple II Disk II floppy emulator core.
//!
//! Emulates a 5.25" Disk II drive on top of an SD card: it mounts a FAT16
//! volume, lazily converts a DSK (logical-sector) image to a NIC (GCR
//! physical-sector) image the first time it sees one, and then services
//! host stepper/read/write traffic against the NIC file in real time.
//!
//! The bit-banged SPI transport, the timer that clocks read pulses, and the
//! host's GPIO lines are external collaborators, expressed here only as the
//! traits in [`hw`]; this crate never talks to real hardware itself.

// Mark the crate as no_std if the feature is enabled (and only).
#![cfg_attr(all(feature = "no_std", not(test)), no_std)]

#[allow(unused_extern_crates)]
extern crate core; // makes rls actually look into the standard library (hack)

#[cfg_attr(target_os = "none", panic_handler)]
#[cfg(target_os = "none")]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

macro_rules! using_std { ($($i:item)*) => ($(#[cfg(not(feature = "no_std"))]$i)*) }

pub mod error;
pub mod hw;
pub mod mutex;
pub mod storage;
pub mod util;

pub mod fat;
pub mod gcr;
pub mod nic;
pub mod convert;
pub mod stepper;
pub mod writebuffer;
pub mod hostio;
pub mod emulator;

pub use error::{Error, Result};
pub use emulator::Emulator;
