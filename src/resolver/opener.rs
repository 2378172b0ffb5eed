//! File opening seam used by the resolver

use std::future::Future;
use std::io;
use std::path::Path;

/// Opens a candidate path during resolution.
///
/// Dropping a handle must release it; the resolver closes losing handles
/// by dropping them.
pub trait Opener: Send + Sync + 'static {
    type Handle: Send + 'static;

    fn open(&self, path: &Path) -> impl Future<Output = io::Result<Self::Handle>> + Send;
}

/// Opens files read-only on the local filesystem (including network mounts)
#[derive(Debug, Clone, Copy, Default)]
pub struct FsOpener;

impl Opener for FsOpener {
    type Handle = tokio::fs::File;

    fn open(&self, path: &Path) -> impl Future<Output = io::Result<Self::Handle>> + Send {
        tokio::fs::File::open(path.to_path_buf())
    }
}
