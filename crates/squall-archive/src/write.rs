//! Bundle writer.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{bail, Context, Result};
use flate2::{Compression, GzBuilder};
use tar::{Builder, Header};
use tracing::debug;

use squall_fs::path::normalize_and_anonymize;
use squall_fs::FileEntry;

use crate::{urls, Archive};

impl Archive {
    /// Serialize the bundle into `out` as a gzipped tar stream.
    ///
    /// Normalizes the metadata URLs in place and populates the legacy
    /// `filename`/`pwd` strings, then emits `metadata.json` followed by
    /// every captured file under `<scheme>/<normalized-path>`, in sorted
    /// order with deterministic headers. Filesystems with nothing captured
    /// are elided. Nothing is written if validation fails, so callers can
    /// write to a buffer and rename into place.
    ///
    /// # Errors
    ///
    /// When `data` is set but the `file` filesystem does not hold those
    /// bytes at the entry path, the error contains
    /// `the main script wasn't present in the cached filesystem`.
    pub fn write<W: Write>(&mut self, out: W) -> Result<()> {
        let mut trees: BTreeMap<&str, BTreeMap<String, FileEntry>> = BTreeMap::new();
        for (scheme, fs) in &self.filesystems {
            trees.insert(scheme.as_str(), fs.snapshot());
        }

        self.validate_entry_script(&trees)?;

        if let Some(url) = &self.metadata.filename_url {
            let url = urls::normalize_file_url(url);
            self.metadata.filename = url.to_string();
            self.metadata.filename_url = Some(url);
        }
        if let Some(url) = &self.metadata.pwd_url {
            let url = urls::normalize_file_url(url);
            self.metadata.pwd = url.to_string();
            self.metadata.pwd_url = Some(url);
        }

        let metadata_json = self
            .metadata
            .to_json()
            .context("serializing bundle metadata")?;

        let gz = GzBuilder::new().mtime(0).write(out, Compression::default());
        let mut tar = Builder::new(gz);
        tar.mode(tar::HeaderMode::Deterministic);

        write_entry(&mut tar, "metadata.json", &metadata_json, 0o644)?;

        for (scheme, tree) in &trees {
            if tree.is_empty() {
                continue;
            }
            debug!(scheme = %scheme, files = tree.len(), "archiving filesystem");
            for (path, entry) in tree {
                let name = format!("{}{}", scheme, normalize_and_anonymize(path));
                write_entry(&mut tar, &name, &entry.data, entry.mode)?;
            }
        }

        let gz = tar.into_inner().context("finalizing tar archive")?;
        gz.finish().context("finishing gzip stream")?;
        Ok(())
    }

    /// The entry script named by the metadata must be present, byte for
    /// byte, in the captured `file` tree, or a replay would run different
    /// code than the original test.
    fn validate_entry_script(
        &self,
        trees: &BTreeMap<&str, BTreeMap<String, FileEntry>>,
    ) -> Result<()> {
        let (Some(data), Some(url)) = (&self.metadata.data, &self.metadata.filename_url) else {
            return Ok(());
        };
        if url.scheme() != "file" {
            return Ok(());
        }
        let path = normalize_and_anonymize(&urls::fs_path(url));
        match trees.get("file").and_then(|tree| tree.get(&path)) {
            Some(entry) if entry.data == *data => Ok(()),
            _ => bail!("the main script wasn't present in the cached filesystem"),
        }
    }
}

fn write_entry<W: Write>(
    tar: &mut Builder<W>,
    name: &str,
    data: &[u8],
    mode: u32,
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_cksum();
    tar.append_data(&mut header, name, data)
        .with_context(|| format!("writing archive entry {name}"))?;
    Ok(())
}
