//! Portable test bundle container.
//!
//! A bundle is a single gzipped tar stream that captures everything needed
//! to rerun a scripted load test on a different host: the test metadata
//! envelope (`metadata.json`, including the entry script bytes) and one
//! subdirectory per URL scheme holding every file the script read during
//! init. All paths inside the container are normalized and anonymized, so
//! a bundle written on any OS replays on any other without leaking
//! usernames.
//!
//! # Example
//!
//! ```no_run
//! use squall_archive::read_archive;
//! use std::fs::File;
//!
//! let file = File::open("bundle.tar.gz").unwrap();
//! let archive = read_archive(file).unwrap();
//! println!("entry: {}", archive.metadata.filename_url.as_ref().unwrap());
//! ```

mod metadata;
mod read;
mod urls;
mod write;

pub use metadata::ArchiveMetadata;
pub use read::read_archive;

use std::collections::BTreeMap;
use std::sync::Arc;

use squall_fs::Fs;

/// Tool version stamped into bundles this library writes.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The replay namespace: one virtual filesystem per URL scheme. Scheme
/// labels are opaque; `file` and `https` are the conventional ones.
pub type FsMap = BTreeMap<String, Arc<dyn Fs>>;

/// A fully hydrated test bundle: the metadata envelope plus the per-scheme
/// filesystems. The archive owns both exclusively after construction.
pub struct Archive {
    pub metadata: ArchiveMetadata,
    pub filesystems: FsMap,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("metadata", &self.metadata)
            .field("filesystems", &self.filesystems.keys().collect::<Vec<_>>())
            .finish()
    }
}
