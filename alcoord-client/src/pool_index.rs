//! Byte-offset index over the pool corpus
//!
//! Line `i` is read by seeking to `offsets[i]` and reading one line, so the
//! pool never has to be held in memory. Offsets are the running sum of raw
//! line lengths in bytes, including the line terminator.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PoolIndex {
    path: PathBuf,
    offsets: Vec<u64>,
}

impl PoolIndex {
    /// Index `path` with one sequential scan
    ///
    /// A missing or empty pool is a configuration error.
    pub fn build(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::Config(format!("Cannot open pool {}: {}", path.display(), e)))?;
        let mut reader = BufReader::new(file);

        let mut offsets = Vec::new();
        let mut offset = 0u64;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf)?;
            if n == 0 {
                break;
            }
            offsets.push(offset);
            offset += n as u64;
        }

        if offsets.is_empty() {
            return Err(Error::Config(format!("Pool {} is empty", path.display())));
        }

        debug!("Indexed {} pool lines ({} bytes)", offsets.len(), offset);
        Ok(Self {
            path: path.to_path_buf(),
            offsets,
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Open a private read handle on the pool
    pub fn reader(&self) -> Result<PoolReader<'_>> {
        Ok(PoolReader {
            index: self,
            reader: BufReader::new(File::open(&self.path)?),
        })
    }

    /// Visit every line in order without loading the pool
    pub fn for_each_line<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(usize, &str),
    {
        let mut reader = self.reader()?;
        let mut line = String::new();
        for i in 0..self.len() {
            reader.next_line(&mut line)?;
            f(i, &line);
        }
        Ok(())
    }
}

/// One open handle on the pool file
pub struct PoolReader<'a> {
    index: &'a PoolIndex,
    reader: BufReader<File>,
}

impl PoolReader<'_> {
    /// Read line `i` with trailing whitespace stripped
    pub fn read_line(&mut self, i: usize) -> Result<String> {
        self.seek_to(i)?;
        let mut line = String::new();
        self.next_line(&mut line)?;
        Ok(line)
    }

    /// Read lines `[start, end)`
    pub fn read_range(&mut self, start: usize, end: usize) -> Result<Vec<String>> {
        let end = end.min(self.index.len());
        if start >= end {
            return Ok(Vec::new());
        }
        self.seek_to(start)?;
        let mut lines = Vec::with_capacity(end - start);
        for _ in start..end {
            let mut line = String::new();
            self.next_line(&mut line)?;
            lines.push(line);
        }
        Ok(lines)
    }

    fn seek_to(&mut self, i: usize) -> Result<()> {
        let offset = self.index.offsets.get(i).copied().ok_or_else(|| {
            Error::Dataset(format!(
                "pool line {} out of range ({} lines)",
                i,
                self.index.len()
            ))
        })?;
        self.reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn next_line(&mut self, line: &mut String) -> Result<()> {
        let mut buf = Vec::new();
        self.reader.read_until(b'\n', &mut buf)?;
        let text = String::from_utf8(buf)
            .map_err(|e| Error::Dataset(format!("pool line is not UTF-8: {}", e)))?;
        line.clear();
        line.push_str(text.trim_end());
        Ok(())
    }
}
