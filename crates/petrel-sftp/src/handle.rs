//! Handle table
//!
//! Open files and directory streams are parked in a fixed table and named
//! on the wire by their 1-based slot index, rendered as a zero-padded
//! two-digit ASCII decimal. Zero is the sentinel for "no handle", which is
//! why indices are 1-based. The table owns each OS resource from
//! allocation until CLOSE releases it (or the process exits).

use std::fs::File;

use tracing::warn;

use crate::unix::DirStream;

/// Capacity of the handle table. Chosen so every index prints in
/// [`HANDLE_DIGITS`] decimal digits.
pub const MAX_HANDLES: usize = 99;

/// Fixed width of the wire encoding.
pub const HANDLE_DIGITS: usize = 2;

/// One table slot: free, an open file, or an open directory stream.
pub enum Handle {
    /// Unoccupied slot
    Free,
    /// Open regular file
    File(File),
    /// Open directory with its seekable stream
    Dir(DirStream),
}

impl Handle {
    fn is_free(&self) -> bool {
        matches!(self, Handle::Free)
    }
}

/// Fixed-capacity table mapping wire handles to live OS resources.
pub struct HandleTable {
    slots: Vec<Handle>,
}

impl HandleTable {
    /// Fresh table with every slot free.
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_HANDLES).map(|_| Handle::Free).collect(),
        }
    }

    fn alloc(&mut self, handle: Handle) -> Option<u32> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_free() {
                *slot = handle;
                return Some(i as u32 + 1);
            }
        }
        // The resource passed in drops here, releasing it
        warn!("out of handles");
        None
    }

    /// Park an open file; returns its 1-based index, or `None` when the
    /// table is full (in which case the file has been closed).
    pub fn alloc_file(&mut self, file: File) -> Option<u32> {
        self.alloc(Handle::File(file))
    }

    /// Park an open directory stream, as [`Self::alloc_file`].
    pub fn alloc_dir(&mut self, dir: DirStream) -> Option<u32> {
        self.alloc(Handle::Dir(dir))
    }

    /// Render a 1-based index as its fixed-width wire form.
    pub fn encode(index: u32) -> String {
        format!("{index:0width$}", width = HANDLE_DIGITS)
    }

    /// Strict wire decode: exactly [`HANDLE_DIGITS`] ASCII digits, nonzero,
    /// in range. Anything else is "no handle".
    fn decode(wire: &[u8]) -> Option<usize> {
        if wire.len() != HANDLE_DIGITS {
            return None;
        }
        if !wire.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let index: usize = std::str::from_utf8(wire).ok()?.parse().ok()?;
        if index == 0 || index > MAX_HANDLES {
            return None;
        }
        Some(index)
    }

    /// Look up a wire handle, yielding the live slot or `None` for any
    /// malformed, out-of-range, or unallocated handle.
    pub fn lookup(&mut self, wire: &[u8]) -> Option<&mut Handle> {
        let index = Self::decode(wire)?;
        let slot = &mut self.slots[index - 1];
        if slot.is_free() { None } else { Some(slot) }
    }

    /// Remove a wire handle from the table, handing ownership of the
    /// resource to the caller (CLOSE reports the release result). The slot
    /// becomes free immediately.
    pub fn take(&mut self, wire: &[u8]) -> Option<Handle> {
        let index = Self::decode(wire)?;
        let slot = &mut self.slots[index - 1];
        if slot.is_free() {
            return None;
        }
        Some(std::mem::replace(slot, Handle::Free))
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
