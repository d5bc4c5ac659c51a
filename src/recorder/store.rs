//! On-disk frame store format.
//!
//! One file per acquisition. A fixed little-endian header carries a magic
//! number, a format version, a flags word (the concurrent-read bit is set
//! once at creation), and one length per column; the data region holds one
//! row of four i64 cells per frame index:
//!
//! ```text
//! offset  size  field
//!      0     8  magic "FLNKREC\0"
//!      8     4  format version (u32 le)
//!     12     4  flags (u32 le)
//!     16    32  column lengths, 4 x u64 le
//!     48   ...  rows: adjustment, attenuation, uid, filters_moving (i64 le)
//! ```
//!
//! The four columns are logically independent arrays indexed by frame
//! number; they grow together in a single `set_len` step (zero-filling the
//! new rows) and the new lengths are published in the header before any cell
//! at a new index is written. A reader that re-reads the header can
//! therefore tail the file while the writer appends and will never observe
//! a written cell beyond the reported length.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::error::{LinkError, Result};
use crate::protocol::FrameRecord;

pub(crate) const MAGIC: [u8; 8] = *b"FLNKREC\0";
pub(crate) const FORMAT_VERSION: u32 = 1;
/// Set at creation; the file is written for single-writer, many-reader use.
pub(crate) const FLAG_CONCURRENT_READ: u32 = 0x1;

/// Number of columns in a store.
pub const COLUMN_COUNT: usize = 4;

/// Column names, in row order.
pub const COLUMN_NAMES: [&str; COLUMN_COUNT] =
    ["adjustment", "attenuation", "uid", "filters_moving"];

const HEADER_SIZE: u64 = 8 + 4 + 4 + COLUMN_COUNT as u64 * 8;
const CELL_SIZE: u64 = 8;
const ROW_SIZE: u64 = CELL_SIZE * COLUMN_COUNT as u64;

/// Append-only writer for one acquisition file.
pub struct FrameStore {
    file: File,
    path: PathBuf,
    lengths: [u64; COLUMN_COUNT],
}

impl FrameStore {
    /// Create a new store at `path` with all four columns at length 1.
    ///
    /// Fails if the file already exists; the caller decides names, this
    /// layer never overwrites data.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| LinkError::file(path, e))?;

        let mut store = Self { file, path: path.to_path_buf(), lengths: [0; COLUMN_COUNT] };
        store.resize(1)?;
        store.sync()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current column length.
    ///
    /// The four columns must always agree; divergence means corrupted
    /// writer state and aborts the recorder.
    pub fn len(&self) -> u64 {
        let first = self.lengths[0];
        assert!(
            self.lengths.iter().all(|len| *len == first),
            "column length divergence: {:?}",
            self.lengths
        );
        first
    }

    /// Write one frame at its frame number, growing the columns first if the
    /// index is beyond the current length.
    ///
    /// Growth is a single step to `max(frame_number + 1, len + 1)`; all four
    /// columns report the same length after every call. The file is flushed
    /// before returning.
    pub fn write(&mut self, frame: &FrameRecord) -> Result<()> {
        let row_offset = row_offset(frame.frame_number)?;
        let len = self.len();
        if frame.frame_number >= len {
            let new_len = (frame.frame_number + 1).max(len + 1);
            self.resize(new_len)?;
        }

        let cells: [i64; COLUMN_COUNT] = [
            frame.adjustment,
            frame.attenuation,
            frame.uid,
            i64::from(frame.filters_moving),
        ];
        let mut row = [0u8; ROW_SIZE as usize];
        for (slot, cell) in cells.iter().enumerate() {
            row[slot * CELL_SIZE as usize..(slot + 1) * CELL_SIZE as usize]
                .copy_from_slice(&cell.to_le_bytes());
        }

        self.file.seek(SeekFrom::Start(row_offset)).map_err(|e| LinkError::file(&self.path, e))?;
        self.file.write_all(&row).map_err(|e| LinkError::file(&self.path, e))?;
        self.sync()?;

        trace!(frame = frame.frame_number, len = self.len(), "frame recorded");
        Ok(())
    }

    /// Flush pending data to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.sync()
    }

    /// Grow every column to `new_len` in one step.
    ///
    /// The data region is extended (zero-filled) before the new lengths are
    /// published, so a concurrent reader never sees a length the file cannot
    /// back.
    fn resize(&mut self, new_len: u64) -> Result<()> {
        let end = row_offset(new_len)?;
        self.file.set_len(end).map_err(|e| LinkError::file(&self.path, e))?;
        self.lengths = [new_len; COLUMN_COUNT];
        self.write_header()?;
        trace!(len = new_len, "columns resized");
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..8].copy_from_slice(&MAGIC);
        header[8..12].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        header[12..16].copy_from_slice(&FLAG_CONCURRENT_READ.to_le_bytes());
        for (slot, len) in self.lengths.iter().enumerate() {
            let at = 16 + slot * 8;
            header[at..at + 8].copy_from_slice(&len.to_le_bytes());
        }
        self.file.seek(SeekFrom::Start(0)).map_err(|e| LinkError::file(&self.path, e))?;
        self.file.write_all(&header).map_err(|e| LinkError::file(&self.path, e))?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_data().map_err(|e| LinkError::file(&self.path, e))
    }
}

/// One decoded row of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRow {
    pub adjustment: i64,
    pub attenuation: i64,
    pub uid: i64,
    pub filters_moving: bool,
}

/// Read-only view of a store file, suitable for tailing a live writer.
pub struct StoreReader {
    file: File,
    path: PathBuf,
    flags: u32,
    lengths: [u64; COLUMN_COUNT],
}

impl StoreReader {
    /// Open `path` and validate its header.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| LinkError::file(path, e))?;
        let (flags, lengths) = read_header(&mut file, path)?;
        Ok(Self { file, path: path.to_path_buf(), flags, lengths })
    }

    /// Re-read the header, picking up appended rows from a live writer.
    pub fn refresh(&mut self) -> Result<u64> {
        let (flags, lengths) = read_header(&mut self.file, &self.path)?;
        self.flags = flags;
        self.lengths = lengths;
        Ok(self.len())
    }

    /// Column length as of the last [`refresh`](Self::refresh) (or open).
    pub fn len(&self) -> u64 {
        self.lengths[0]
    }

    /// Whether the writer enabled concurrent-read mode at creation.
    pub fn concurrent_read(&self) -> bool {
        self.flags & FLAG_CONCURRENT_READ != 0
    }

    /// Read the row at `index`.
    pub fn row(&mut self, index: u64) -> Result<FrameRow> {
        if index >= self.len() {
            return Err(LinkError::protocol(
                "store read",
                format!("row {index} beyond reported length {}", self.len()),
            ));
        }
        let mut row = [0u8; ROW_SIZE as usize];
        self.file
            .seek(SeekFrom::Start(row_offset(index)?))
            .map_err(|e| LinkError::file(&self.path, e))?;
        self.file.read_exact(&mut row).map_err(|e| LinkError::file(&self.path, e))?;

        let cell = |slot: usize| {
            let at = slot * CELL_SIZE as usize;
            let mut bytes = [0u8; CELL_SIZE as usize];
            bytes.copy_from_slice(&row[at..at + CELL_SIZE as usize]);
            i64::from_le_bytes(bytes)
        };
        Ok(FrameRow {
            adjustment: cell(0),
            attenuation: cell(1),
            uid: cell(2),
            filters_moving: cell(3) != 0,
        })
    }
}

/// Byte offset of the row at `index`, guarding against offset overflow from
/// an absurd frame number.
fn row_offset(index: u64) -> Result<u64> {
    index
        .checked_mul(ROW_SIZE)
        .and_then(|bytes| bytes.checked_add(HEADER_SIZE))
        .ok_or_else(|| LinkError::protocol("store write", format!("frame number {index} out of range")))
}

fn read_header(file: &mut File, path: &Path) -> Result<(u32, [u64; COLUMN_COUNT])> {
    let mut header = [0u8; HEADER_SIZE as usize];
    file.seek(SeekFrom::Start(0)).map_err(|e| LinkError::file(path, e))?;
    file.read_exact(&mut header).map_err(|e| LinkError::file(path, e))?;

    if header[0..8] != MAGIC {
        return Err(LinkError::protocol("store header", "bad magic number"));
    }
    let version = u32::from_le_bytes(header[8..12].try_into().expect("fixed slice"));
    if version != FORMAT_VERSION {
        return Err(LinkError::protocol(
            "store header",
            format!("unsupported format version {version}"),
        ));
    }
    let flags = u32::from_le_bytes(header[12..16].try_into().expect("fixed slice"));

    let mut lengths = [0u64; COLUMN_COUNT];
    for (slot, len) in lengths.iter_mut().enumerate() {
        let at = 16 + slot * 8;
        *len = u64::from_le_bytes(header[at..at + 8].try_into().expect("fixed slice"));
    }
    let first = lengths[0];
    if lengths.iter().any(|len| *len != first) {
        return Err(LinkError::protocol(
            "store header",
            format!("column lengths diverge: {lengths:?}"),
        ));
    }
    Ok((flags, lengths))
}
