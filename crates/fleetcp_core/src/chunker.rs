//! Lazy, ordered chunking of a file's byte stream.

use crate::error::CoreResult;
use bytes::Bytes;
use flate2::read::GzEncoder;
use flate2::Compression;
use fleetcp_protocol::TransferChunk;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Yields the chunks of one file in index order, reading on demand.
///
/// With compression enabled the whole file is fed through a single gzip
/// stream and that stream is sliced, so chunks are not independently
/// decompressible. A file of `S` bytes yields `ceil(S / chunk_size)` chunks
/// without compression.
pub struct ChunkReader {
    reader: Box<dyn Read + Send>,
    remote_path: String,
    chunk_size: usize,
    compressed: bool,
    mode: Option<u32>,
    next_index: u64,
    done: bool,
}

impl ChunkReader {
    /// Opens `path` for chunking.
    pub fn open(
        path: &Path,
        remote_path: impl Into<String>,
        chunk_size: usize,
        compress: bool,
        mode: Option<u32>,
    ) -> CoreResult<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(file, remote_path, chunk_size, compress, mode))
    }

    /// Chunks an arbitrary byte source.
    pub fn from_reader<R: Read + Send + 'static>(
        reader: R,
        remote_path: impl Into<String>,
        chunk_size: usize,
        compress: bool,
        mode: Option<u32>,
    ) -> Self {
        let reader: Box<dyn Read + Send> = if compress {
            Box::new(GzEncoder::new(reader, Compression::default()))
        } else {
            Box::new(reader)
        };
        Self {
            reader,
            remote_path: remote_path.into(),
            chunk_size: chunk_size.max(1),
            compressed: compress,
            mode,
            next_index: 1,
            done: false,
        }
    }

    /// Returns the index the next chunk will carry.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(filled)
    }
}

impl Iterator for ChunkReader {
    type Item = io::Result<TransferChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut buf = vec![0u8; self.chunk_size];
        let filled = match self.fill(&mut buf) {
            Ok(filled) => filled,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        if filled < self.chunk_size {
            self.done = true;
        }
        if filled == 0 {
            return None;
        }

        buf.truncate(filled);
        let chunk = TransferChunk::new(
            self.remote_path.clone(),
            Bytes::from(buf),
            self.next_index,
            self.compressed,
            self.mode,
        );
        self.next_index += 1;
        Some(Ok(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn chunks(data: Vec<u8>, size: usize, compress: bool) -> Vec<TransferChunk> {
        ChunkReader::from_reader(Cursor::new(data), "/r", size, compress, Some(0o644))
            .collect::<io::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn ten_bytes_by_four() {
        let chunks = chunks(b"0123456789".to_vec(), 4, false);
        let sizes: Vec<_> = chunks.iter().map(TransferChunk::len).collect();
        let appends: Vec<_> = chunks.iter().map(|c| c.append).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(appends, vec![false, true, true]);
        assert!(chunks.iter().all(|c| c.mode == Some(0o644)));
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(chunks(Vec::new(), 4, false).is_empty());
    }

    #[test]
    fn exact_multiple_has_no_trailing_empty_chunk() {
        assert_eq!(chunks(vec![7u8; 8], 4, false).len(), 2);
    }

    #[test]
    fn compressed_stream_reassembles() {
        let data: Vec<u8> = (0..5000u32).flat_map(|i| i.to_le_bytes()).collect();
        let chunks = chunks(data.clone(), 64, true);
        assert!(chunks.iter().all(|c| c.compressed));

        let stream: Vec<u8> = chunks.iter().flat_map(|c| c.payload.to_vec()).collect();
        let mut restored = Vec::new();
        GzDecoder::new(&stream[..]).read_to_end(&mut restored).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn open_missing_file_fails() {
        assert!(ChunkReader::open(Path::new("/definitely/not/here"), "/r", 4, false, None).is_err());
    }

    proptest! {
        #[test]
        fn chunk_count_law(data in prop::collection::vec(any::<u8>(), 0..2048), size in 1usize..300) {
            let chunks = chunks(data.clone(), size, false);
            prop_assert_eq!(chunks.len(), data.len().div_ceil(size));
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, i as u64 + 1);
                prop_assert_eq!(chunk.append, i > 0);
            }
            let joined: Vec<u8> = chunks.iter().flat_map(|c| c.payload.to_vec()).collect();
            prop_assert_eq!(joined, data);
        }
    }
}
