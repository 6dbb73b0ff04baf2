//! Record shard reading and batching
//!
//! Shard files use the standard record framing: a u64 LE payload length, a
//! 4-byte length checksum, the payload, and a 4-byte payload checksum.
//! Checksums are skipped rather than verified; shards are local files
//! produced by the preparation tooling. Every payload must match the byte
//! footprint of the configured feature shape exactly.

use ndarray::Array4;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use training_core::{Error, PixelBatch, PixelSample, Result, SAMPLE_CHANNELS};

/// Upper bound on a single record payload; anything larger is corruption
const MAX_RECORD_LEN: u64 = 1 << 30;

/// Read-ahead buffer bounds in bytes
const MIN_READ_AHEAD: usize = 64 * 1024;
const MAX_READ_AHEAD: usize = 8 * 1024 * 1024;

/// Fixed per-sample feature shape of a shard set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureShape {
    /// Color channels per sample
    pub channels: usize,

    /// Image side length in pixels
    pub side: usize,
}

impl FeatureShape {
    /// Shape for a resolution level: `[3, 2^lod, 2^lod]`
    pub fn for_lod(lod: usize) -> Self {
        Self {
            channels: SAMPLE_CHANNELS,
            side: 1 << lod,
        }
    }

    /// Byte footprint of one u8 sample
    pub fn bytes_per_sample(&self) -> usize {
        self.channels * self.side * self.side
    }
}

/// Builds batched iterators over record shard files.
///
/// This is the seam to the record-reading machinery: the dataset hands over
/// the shard list, the feature shape, the batch size, and a buffering budget
/// in samples, and consumes whatever the iterator yields.
pub trait BatchIteratorFactory {
    /// Iterator type produced by this factory
    type Iter: Iterator<Item = Result<PixelBatch>>;

    /// Open a fresh iterator over the given shard files
    fn open(
        &self,
        files: &[PathBuf],
        shape: FeatureShape,
        batch_size: usize,
        buffer_samples: usize,
    ) -> Result<Self::Iter>;
}

/// Default factory reading record shards from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFileReader;

impl BatchIteratorFactory for RecordFileReader {
    type Iter = RecordBatchIterator;

    fn open(
        &self,
        files: &[PathBuf],
        shape: FeatureShape,
        batch_size: usize,
        buffer_samples: usize,
    ) -> Result<Self::Iter> {
        Ok(RecordBatchIterator::new(
            files.to_vec(),
            shape,
            batch_size,
            buffer_samples,
        ))
    }
}

/// Blocking pull-based iterator yielding `[n, channels, side, side]` batches.
///
/// Files are consumed in list order. A final batch shorter than the batch
/// size is yielded rather than dropped.
pub struct RecordBatchIterator {
    files: VecDeque<PathBuf>,
    current: Option<(PathBuf, BufReader<File>)>,
    shape: FeatureShape,
    batch_size: usize,
    read_ahead: usize,
}

impl RecordBatchIterator {
    fn new(
        files: Vec<PathBuf>,
        shape: FeatureShape,
        batch_size: usize,
        buffer_samples: usize,
    ) -> Self {
        let read_ahead = buffer_samples
            .saturating_mul(shape.bytes_per_sample())
            .clamp(MIN_READ_AHEAD, MAX_READ_AHEAD);

        Self {
            files: files.into(),
            current: None,
            shape,
            batch_size,
            read_ahead,
        }
    }

    /// Pull the next sample payload, advancing across files at EOF
    fn next_sample(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some((path, reader)) = self.current.as_mut() {
                match read_record(reader, path)? {
                    Some(payload) => {
                        let expected = self.shape.bytes_per_sample();
                        if payload.len() != expected {
                            return Err(Error::MalformedRecord {
                                path: path.display().to_string(),
                                reason: format!(
                                    "payload is {} bytes, feature shape needs {}",
                                    payload.len(),
                                    expected
                                ),
                            });
                        }
                        return Ok(Some(payload));
                    }
                    None => self.current = None,
                }
            } else {
                match self.files.pop_front() {
                    Some(path) => {
                        let file = File::open(&path)?;
                        let reader = BufReader::with_capacity(self.read_ahead, file);
                        self.current = Some((path, reader));
                    }
                    None => return Ok(None),
                }
            }
        }
    }

    fn build_batch(&self, samples: Vec<Vec<u8>>) -> Result<PixelBatch> {
        let count = samples.len();
        let mut flat = Vec::with_capacity(count * self.shape.bytes_per_sample());
        for sample in samples {
            flat.extend_from_slice(&sample);
        }

        Array4::from_shape_vec(
            (count, self.shape.channels, self.shape.side, self.shape.side),
            flat,
        )
        .map_err(|e| Error::InvalidBatch {
            message: e.to_string(),
        })
    }
}

impl Iterator for RecordBatchIterator {
    type Item = Result<PixelBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut samples = Vec::with_capacity(self.batch_size);
        while samples.len() < self.batch_size {
            match self.next_sample() {
                Ok(Some(sample)) => samples.push(sample),
                Ok(None) => break,
                Err(e) => return Some(Err(e)),
            }
        }

        if samples.is_empty() {
            return None;
        }
        Some(self.build_batch(samples))
    }
}

/// Read one framed record; `None` on clean end-of-file
fn read_record(reader: &mut impl Read, path: &Path) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 8];
    if !read_or_eof(reader, &mut len_buf, path)? {
        return Ok(None);
    }
    let len = u64::from_le_bytes(len_buf);
    if len > MAX_RECORD_LEN {
        return Err(Error::MalformedRecord {
            path: path.display().to_string(),
            reason: format!("record length {} exceeds limit", len),
        });
    }

    let mut checksum = [0u8; 4];
    read_fully(reader, &mut checksum, path)?;

    let mut payload = vec![0u8; len as usize];
    read_fully(reader, &mut payload, path)?;
    read_fully(reader, &mut checksum, path)?;

    Ok(Some(payload))
}

/// Fill `buf`, returning false only on EOF at a record boundary
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8], path: &Path) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(truncated(path));
        }
        filled += n;
    }
    Ok(true)
}

fn read_fully(reader: &mut impl Read, buf: &mut [u8], path: &Path) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            truncated(path)
        } else {
            e.into()
        }
    })
}

fn truncated(path: &Path) -> Error {
    Error::MalformedRecord {
        path: path.display().to_string(),
        reason: "truncated record".to_string(),
    }
}

/// Write samples to a record shard file, one framed record per sample.
///
/// Checksum fields are written as zeros to keep the framing intact; the
/// default reader never inspects them. Intended for dataset preparation
/// tooling and tests.
pub fn write_record_file<P: AsRef<Path>>(path: P, samples: &[PixelSample]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    for sample in samples {
        let contiguous = sample.as_standard_layout();
        let bytes = contiguous.as_slice().ok_or_else(|| Error::InvalidBatch {
            message: "sample storage is not contiguous".to_string(),
        })?;

        writer.write_all(&(bytes.len() as u64).to_le_bytes())?;
        writer.write_all(&[0u8; 4])?;
        writer.write_all(bytes)?;
        writer.write_all(&[0u8; 4])?;
    }
    writer.flush()?;
    Ok(())
}
