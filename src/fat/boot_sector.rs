//! The handful of BIOS Parameter Block fields this crate needs (spec §4.2).
//!
//! Grounded on the teacher's little-endian field-extraction macro; trimmed
//! to the FAT16 fields the original firmware's `init()` actually reads
//! (`sdisk2.c:737-864`) rather than the teacher's full FAT32 EBPB.

use generic_array::GenericArray;
use typenum::consts::U512;

use core::convert::TryInto;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bpb {
    /// Offset 0x00D, 1 byte.
    pub sectors_per_cluster: u8,
    /// Offset 0x00E, 2 bytes LE.
    pub reserved_sectors: u16,
    /// Offset 0x016, 2 bytes LE.
    pub sectors_per_fat: u16,
}

impl Bpb {
    pub fn parse(sector: &GenericArray<u8, U512>) -> Self {
        let sector = sector.as_slice();

        macro_rules! e {
            ($ty:tt, $offset:literal) => {
                $ty::from_le_bytes(
                    sector[$offset..($offset + core::mem::size_of::<$ty>())]
                        .try_into()
                        .unwrap(),
                )
            };
        }

        Self {
            sectors_per_cluster: e!(u8, 0x00D),
            reserved_sectors: e!(u16, 0x00E),
            sectors_per_fat: e!(u16, 0x016),
        }
    }
}
