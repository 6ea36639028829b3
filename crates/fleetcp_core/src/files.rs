//! Loading of source files for one-shot (non-chunked) transfers.

use crate::error::{CoreError, CoreResult};
use fleetcp_protocol::FileMap;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Reads every source into a `path -> contents` map.
///
/// One-shot mode is meant for text files: contents are decoded as UTF-8,
/// invalid sequences replaced.
///
/// # Errors
///
/// `CoreError::MissingSource` for a missing path and
/// `CoreError::DirectoryWithoutChunked` for a directory.
pub fn load_files(sources: &[PathBuf]) -> CoreResult<FileMap> {
    let mut files = FileMap::new();
    for source in sources {
        let metadata = fs::metadata(source).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => CoreError::MissingSource {
                path: source.clone(),
            },
            _ => CoreError::Io(err),
        })?;
        if metadata.is_dir() {
            return Err(CoreError::DirectoryWithoutChunked {
                path: source.clone(),
            });
        }
        let data = fs::read(source)?;
        files.insert(
            source.to_string_lossy().into_owned(),
            String::from_utf8_lossy(&data).into_owned(),
        );
    }
    Ok(files)
}
