//! Asynchronous file handles opened on the I/O pool

use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::info;

use super::pool::WorkerPool;
use crate::error::PoolError;

/// How a file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read an existing file
    Read,
    /// Create or truncate, then write
    Write,
    /// Create if missing, then append
    Append,
    /// Read and write an existing file
    ReadWrite,
    /// Create a new file, failing if it exists
    Create,
}

impl OpenMode {
    fn options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.write(true).create(true).truncate(true),
            OpenMode::Append => options.append(true).create(true),
            OpenMode::ReadWrite => options.read(true).write(true),
            OpenMode::Create => options.write(true).create_new(true),
        };
        options
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self {
            OpenMode::Read => "r",
            OpenMode::Write => "w",
            OpenMode::Append => "a",
            OpenMode::ReadWrite => "r+",
            OpenMode::Create => "x",
        };
        f.write_str(mode)
    }
}

/// Open `path` on a worker of `pool` and return an async file handle
pub async fn open_file(
    pool: &WorkerPool,
    path: impl AsRef<Path>,
    mode: OpenMode,
) -> Result<tokio::fs::File, PoolError> {
    let path: PathBuf = path.as_ref().to_path_buf();
    info!(pool = pool.name(), path = %path.display(), %mode, "Opening file");

    let file = pool.submit(move || mode.options().open(path)).await??;
    Ok(tokio::fs::File::from_std(file))
}
