//! Crate-wide error type.
//!
//! `MalformedImage` deliberately has no variant here: per the design, the
//! emulator trusts on-card data, and an invalid GCR nibble simply decodes to
//! `0` through the decode table and corrupts the sector in a way the host's
//! own checksum will catch. This layer never inspects GCR payloads for
//! validity.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The card-present line deasserted mid-operation.
    CardEjected,
    /// Neither a DSK nor a NIC file was found at mount time.
    NotFound,
    /// The root directory has no free 8.3 entry for a new file.
    OutOfDirectorySpace,
    /// The FAT has no free clusters left to satisfy an allocation.
    OutOfClusters,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::CardEjected => "SD card ejected mid-operation",
            Error::NotFound => "no DSK or NIC image found on the card",
            Error::OutOfDirectorySpace => "root directory has no free entry",
            Error::OutOfClusters => "FAT has no free clusters left",
        };
        f.write_str(msg)
    }
}

using_std! {
    impl std::error::Error for Error {}
}

pub type Result<T> = core::result::Result<T, Error>;
