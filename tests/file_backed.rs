//! End-to-end coverage over an in-memory card image: mount a synthetic
//! FAT16 volume, create a DSK entry, convert it to NIC, and read a known
//! sector back out through the GCR codec.
//!
//! Stands in for the teacher's `tests/file_backed.rs`, which needs a real
//! SD card or file-backed image under `assets/`; this crate carries
//! neither, so the harness here is a small `Storage` impl over a `Vec`
//! (the public equivalent of `src/storage.rs`'s `#[cfg(test)]`-only
//! `VecStorage`, which an external integration test can't reach).

use diskii::fat::dir;
use diskii::fat::Fat16;
use diskii::nic::NicLayout;
use diskii::storage::{ReadError, Storage, WriteError};

const SECTOR: usize = 512;

struct Image {
    blocks: Vec<[u8; SECTOR]>,
}

impl Image {
    fn new(block_count: usize) -> Self {
        Image { blocks: vec![[0u8; SECTOR]; block_count] }
    }
}

impl Storage for Image {
    type SECTOR_SIZE = typenum::consts::U512;
    type ReadErr = std::convert::Infallible;
    type WriteErr = std::convert::Infallible;

    fn read_sector(
        &mut self,
        sector_idx: usize,
        buffer: &mut generic_array::GenericArray<u8, Self::SECTOR_SIZE>,
    ) -> Result<(), ReadError<Self::ReadErr>> {
        let block = self
            .blocks
            .get(sector_idx)
            .ok_or(ReadError::OutOfRange { requested_offset: sector_idx })?;
        buffer.as_mut_slice().copy_from_slice(block);
        Ok(())
    }

    fn write_sector(
        &mut self,
        sector_idx: usize,
        buffer: &generic_array::GenericArray<u8, Self::SECTOR_SIZE>,
    ) -> Result<(), WriteError<Self::WriteErr>> {
        let block = self
            .blocks
            .get_mut(sector_idx)
            .ok_or(WriteError::OutOfRange { requested_offset: sector_idx })?;
        block.copy_from_slice(buffer.as_slice());
        Ok(())
    }

    fn sector_count(&self) -> usize {
        self.blocks.len()
    }
}

/// Lays down a raw (unpartitioned) FAT16 BPB at LBA 0: one reserved
/// sector, a 4-sector FAT, enough clusters for a handful of small test
/// files.
fn format_fat16(image: &mut Image) {
    let mut boot = [0u8; SECTOR];
    boot[54..59].copy_from_slice(b"FAT16");
    boot[0x0D] = 1; // sectors_per_cluster
    boot[0x0E..0x10].copy_from_slice(&1u16.to_le_bytes()); // reserved_sectors
    boot[0x16..0x18].copy_from_slice(&4u16.to_le_bytes()); // sectors_per_fat
    image.blocks[0] = boot;
}

#[test]
fn mounts_a_raw_fat16_volume() {
    let mut image = Image::new(600);
    format_fat16(&mut image);

    let fat = Fat16::mount(&mut image).unwrap();
    assert_eq!(fat.bpb_offset, 0);
    assert_eq!(fat.sectors_per_cluster, 1);
    assert_eq!(fat.reserved_sectors, 1);
    assert_eq!(fat.fat_offset, SECTOR as u64);
    assert_eq!(fat.root_offset, SECTOR as u64 * (1 + 2 * 4));
}

#[test]
fn creates_and_finds_a_dsk_entry() {
    let mut image = Image::new(600);
    format_fat16(&mut image);
    let mut fat = Fat16::mount(&mut image).unwrap();

    let created = dir::create(&mut fat, &mut image, b"HELLO   ", b"DSK", 143_360).unwrap();
    let found = dir::find_newest(&fat, &mut image, b"DSK").unwrap();

    assert_eq!(found.starting_cluster, created.starting_cluster);
    assert_eq!(&found.name, b"HELLO   ");
    assert!(!found.protect);
}

#[test]
fn converts_a_dsk_image_to_nic_and_decodes_a_known_sector() {
    let mut image = Image::new(2600);
    format_fat16(&mut image);
    let mut fat = Fat16::mount(&mut image).unwrap();

    let dsk = dir::create(&mut fat, &mut image, b"HELLO   ", b"DSK", 143_360).unwrap();

    // Write a recognizable pattern into the first logical DSK sector.
    let first_sector_idx = (fat.cluster_offset(dsk.starting_cluster) / SECTOR as u64) as usize;
    let mut block = generic_array::GenericArray::<u8, typenum::consts::U512>::default();
    for (i, b) in block.iter_mut().enumerate() {
        *b = (i * 3 + 1) as u8;
    }
    image.write_sector(first_sector_idx, &block).unwrap();

    diskii::convert::ImageConverter::convert(&mut fat, &mut image, &dsk.name, dsk.starting_cluster, || true).unwrap();

    let nic = dir::find_newest(&fat, &mut image, b"NIC").unwrap();
    assert_eq!(nic.name, dsk.name);

    let nic_sector_idx = (fat.cluster_offset(nic.starting_cluster) / SECTOR as u64) as usize;
    let mut frame = generic_array::GenericArray::<u8, typenum::consts::U512>::default();
    image.read_sector(nic_sector_idx, &mut frame).unwrap();

    let mut frame_bytes = [0u8; 512];
    frame_bytes.copy_from_slice(frame.as_slice());

    let mut decoded = [0u8; 256];
    NicLayout::decode_to_dsk_sector(&frame_bytes, &mut decoded);

    let mut expected = [0u8; 256];
    for (i, b) in expected.iter_mut().enumerate() {
        *b = (i * 3 + 1) as u8;
    }
    assert_eq!(decoded, expected);
}
