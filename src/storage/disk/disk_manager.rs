use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::common::{
    FolioError, IoCounters, PageId, Result, COUNTER_BLOCK_SIZE, PAGE_SIZE,
};

/// Counter block layout (physical page 0 of every paged file):
///
/// | Field   | Offset | Size |
/// |---------|--------|------|
/// | reads   | 0      | 4    |
/// | writes  | 4      | 4    |
/// | appends | 8      | 4    |
const READS_OFFSET: usize = 0;
const WRITES_OFFSET: usize = 4;
const APPENDS_OFFSET: usize = 8;

/// DiskManager is responsible for reading and writing pages to/from disk.
///
/// It manages a single paged file. Callers address pages from zero; the
/// physical file reserves its first page for the persisted read/write/append
/// counters, so logical page `n` lives at physical page `n + 1`.
pub struct DiskManager {
    /// The paged file
    file: Mutex<File>,
    /// Path to the paged file
    path: String,
    /// Number of logical pages in the file
    num_pages: AtomicU32,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
    num_appends: AtomicU32,
}

impl DiskManager {
    /// Creates a new paged file with a zeroed counter block.
    /// Fails if anything already exists at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(FolioError::FileAlreadyExists(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        file.write_all(&[0u8; COUNTER_BLOCK_SIZE])?;
        file.sync_all()?;
        debug!("created paged file {}", path.display());
        Ok(())
    }

    /// Removes the paged file at `path`.
    pub fn destroy<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        match fs::remove_file(path) {
            Ok(()) => {
                debug!("destroyed paged file {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(FolioError::FileNotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Opens an existing paged file and loads its persisted counters.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let mut file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FolioError::FileNotFound(path_str))
            }
            Err(e) => return Err(e.into()),
        };

        let file_size = file.metadata()?.len();
        if file_size < COUNTER_BLOCK_SIZE as u64 {
            return Err(FolioError::Corrupted {
                page_id: PageId::new(0),
                reason: format!("{} is missing its counter block", path_str),
            });
        }
        let num_pages = ((file_size - COUNTER_BLOCK_SIZE as u64) / PAGE_SIZE as u64) as u32;

        let mut block = [0u8; COUNTER_BLOCK_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut block)?;

        Ok(Self {
            file: Mutex::new(file),
            path: path_str,
            num_pages: AtomicU32::new(num_pages),
            num_reads: AtomicU32::new(read_u32(&block, READS_OFFSET)),
            num_writes: AtomicU32::new(read_u32(&block, WRITES_OFFSET)),
            num_appends: AtomicU32::new(read_u32(&block, APPENDS_OFFSET)),
        })
    }

    fn physical_offset(page_id: PageId) -> u64 {
        COUNTER_BLOCK_SIZE as u64 + (page_id.as_u32() as u64) * (PAGE_SIZE as u64)
    }

    fn check_range(&self, page_id: PageId) -> Result<()> {
        let page_count = self.page_count();
        if page_id.as_u32() >= page_count {
            return Err(FolioError::PageOutOfRange {
                page_id,
                page_count,
            });
        }
        Ok(())
    }

    /// Reads a page from disk into the provided buffer.
    /// The buffer must be exactly PAGE_SIZE bytes.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        self.check_range(page_id)?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(Self::physical_offset(page_id)))?;
        file.read_exact(data)?;

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    /// The buffer must be exactly PAGE_SIZE bytes.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        self.check_range(page_id)?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(Self::physical_offset(page_id)))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Appends a page to the end of the file and returns its page ID.
    pub fn append_page(&self, data: &[u8]) -> Result<PageId> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let mut file = self.file.lock();
        let page_id = PageId::new(self.num_pages.load(Ordering::SeqCst));
        file.seek(SeekFrom::Start(Self::physical_offset(page_id)))?;
        file.write_all(data)?;
        file.flush()?;
        self.num_pages.fetch_add(1, Ordering::SeqCst);

        self.num_appends.fetch_add(1, Ordering::Relaxed);
        debug!("appended {} to {}", page_id, self.path);
        Ok(page_id)
    }

    /// Returns the number of logical pages in the file.
    pub fn page_count(&self) -> u32 {
        self.num_pages.load(Ordering::SeqCst)
    }

    /// Returns the read/write/append counters, including those loaded from disk.
    pub fn collect_counters(&self) -> IoCounters {
        IoCounters {
            reads: self.num_reads.load(Ordering::Relaxed),
            writes: self.num_writes.load(Ordering::Relaxed),
            appends: self.num_appends.load(Ordering::Relaxed),
        }
    }

    /// Returns the path to the paged file.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Writes the counter triple back into the hidden counter block.
    pub fn persist_counters(&self) -> Result<()> {
        let counters = self.collect_counters();
        let mut block = [0u8; 12];
        block[READS_OFFSET..READS_OFFSET + 4].copy_from_slice(&counters.reads.to_le_bytes());
        block[WRITES_OFFSET..WRITES_OFFSET + 4].copy_from_slice(&counters.writes.to_le_bytes());
        block[APPENDS_OFFSET..APPENDS_OFFSET + 4]
            .copy_from_slice(&counters.appends.to_le_bytes());

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&block)?;
        file.flush()?;
        Ok(())
    }

    /// Persists counters and flushes the file to stable storage.
    pub fn close(self) -> Result<()> {
        self.persist_counters()?;
        self.file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        if let Err(e) = self.persist_counters() {
            warn!("failed to persist counters for {}: {}", self.path, e);
        }
        let _ = self.file.get_mut().sync_all();
    }
}

fn read_u32(block: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&block[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}
