//! Master Boot Record lookup, used only for the fallback when LBA 0 does
//! not carry a raw FAT16 BPB (spec §4.2).
//!
//! Grounded on `fubupc-cs140e-rust`'s `mbr.rs` partition entry layout and on
//! the original firmware's `init()` (`sdisk2.c:737-864`), which reads the
//! first partition's starting LBA straight out of the table rather than
//! validating the whole MBR structure.

use generic_array::GenericArray;
use typenum::consts::U512;

use core::convert::TryInto;

use crate::error::{Error, Result};

const FIRST_PARTITION_LBA_OFFSET: usize = 0x1C6;

/// Reads the first partition's starting LBA (4 bytes LE at 0x1C6).
pub fn first_partition_lba(lba0: &GenericArray<u8, U512>) -> Result<u32> {
    let bytes: [u8; 4] = lba0[FIRST_PARTITION_LBA_OFFSET..FIRST_PARTITION_LBA_OFFSET + 4]
        .try_into()
        .map_err(|_| Error::NotFound)?;
    Ok(u32::from_le_bytes(bytes))
}
