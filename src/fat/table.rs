//! Fixed-size FAT chain windows (spec §3, §9).
//!
//! The original firmware keeps one scratch buffer shared between the DSK
//! and NIC chains; here we keep two independent const-sized windows
//! instead, the modern-RAM option spec.md sanctions. Age bookkeeping
//! mirrors the teacher's `fat::cache::CacheEntry` `last_accessed` field.

use typenum::consts::U512;

use crate::error::Result;
use crate::storage::Storage;

use super::Fat16;

/// A `LEN`-entry window into a file's FAT chain, identified by
/// `window_id = cluster_index / LEN`. A miss reloads by walking the chain
/// from its start.
#[derive(Debug, Clone, Copy)]
pub struct FatWindow<const LEN: usize> {
    pub entries: [u16; LEN],
    pub window_id: u32,
    pub filled: usize,
    loaded: bool,
}

impl<const LEN: usize> FatWindow<LEN> {
    pub fn new() -> Self {
        FatWindow {
            entries: [0u16; LEN],
            window_id: 0,
            filled: 0,
            loaded: false,
        }
    }

    /// Reloads this window if `window_id` differs from what's cached (or
    /// nothing has been loaded yet).
    pub fn ensure<S: Storage<SECTOR_SIZE = U512>>(
        &mut self,
        fat: &mut Fat16,
        storage: &mut S,
        start_cluster: u16,
        window_id: u32,
    ) -> Result<()> {
        if self.loaded && self.window_id == window_id {
            return Ok(());
        }

        self.filled = fat.walk_chain(storage, start_cluster, LEN, window_id, &mut self.entries)?;
        self.window_id = window_id;
        self.loaded = true;

        log::trace!(
            "fat window reload: window_id={} filled={}",
            window_id,
            self.filled
        );

        Ok(())
    }

    pub fn cluster_at(&self, step_in_window: usize) -> Option<u16> {
        if step_in_window < self.filled {
            Some(self.entries[step_in_window])
        } else {
            None
        }
    }
}

impl<const LEN: usize> Default for FatWindow<LEN> {
    fn default() -> Self {
        Self::new()
    }
}
