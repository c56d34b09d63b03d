//! Bundle reader.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use tracing::debug;
use url::Url;

use squall_fs::{CacheOnReadFs, Fs, InMemoryFs};

use crate::{urls, Archive, ArchiveMetadata, FsMap};

/// Parse a bundle from a gzipped tar stream.
///
/// Every restored filesystem comes back sealed: reads of paths the bundle
/// does not carry fail with the never-requested sentinel, so a replayed
/// test cannot depend on files from the replay host. The conventional
/// `file` and `https` schemes are always materialized, even when empty.
///
/// # Errors
///
/// A malformed `metadata.json` fails with the raw JSON parse diagnostic.
pub fn read_archive<R: Read>(source: R) -> Result<Archive> {
    let gz = GzDecoder::new(source);
    let mut tar = tar::Archive::new(gz);

    let mut metadata_bytes: Option<Vec<u8>> = None;
    let mut schemes: BTreeMap<String, InMemoryFs> = BTreeMap::new();
    schemes.insert("file".to_string(), InMemoryFs::new());
    schemes.insert("https".to_string(), InMemoryFs::new());

    for entry in tar.entries().context("reading archive entries")? {
        let mut entry = entry.context("reading archive entry")?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .context("decoding archive entry path")?
            .to_string_lossy()
            .into_owned();
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("reading archive entry {name}"))?;

        if name == "metadata.json" {
            metadata_bytes = Some(data);
            continue;
        }
        let Some((scheme, rest)) = name.split_once('/') else {
            debug!(entry = name.as_str(), "ignoring unexpected top-level entry");
            continue;
        };
        let mode = entry.header().mode().unwrap_or(0o644);
        schemes
            .entry(scheme.to_string())
            .or_default()
            .write(&format!("/{rest}"), &data, mode)?;
    }

    let Some(metadata_bytes) = metadata_bytes else {
        bail!("archive is missing metadata.json");
    };
    // Surface the parser diagnostic as the error message itself.
    let mut metadata: ArchiveMetadata =
        serde_json::from_slice(&metadata_bytes).map_err(anyhow::Error::new)?;
    resolve_locations(&mut metadata)?;

    let mut filesystems = FsMap::new();
    for (scheme, cache) in schemes {
        debug!(
            scheme = scheme.as_str(),
            files = cache.snapshot().len(),
            "restored filesystem"
        );
        filesystems.insert(scheme, Arc::new(CacheOnReadFs::sealed(cache)) as Arc<dyn Fs>);
    }

    Ok(Archive {
        metadata,
        filesystems,
    })
}

/// Make the canonical URLs and the legacy strings agree: the URLs win when
/// present; otherwise they are derived from the legacy strings written by
/// older producers, which may be plain native paths.
fn resolve_locations(metadata: &mut ArchiveMetadata) -> Result<()> {
    match &metadata.filename_url {
        Some(url) => {
            if metadata.filename.is_empty() {
                metadata.filename = url.to_string();
            }
        }
        None => {
            if metadata.filename.is_empty() {
                bail!("archive metadata does not name an entry script");
            }
            metadata.filename_url = Some(parse_legacy_location(&metadata.filename)?);
        }
    }
    match &metadata.pwd_url {
        Some(url) => {
            if metadata.pwd.is_empty() {
                metadata.pwd = url.to_string();
            }
        }
        None => {
            if metadata.pwd.is_empty() {
                bail!("archive metadata does not name a working directory");
            }
            metadata.pwd_url = Some(parse_legacy_location(&metadata.pwd)?);
        }
    }
    Ok(())
}

fn parse_legacy_location(raw: &str) -> Result<Url> {
    match Url::parse(raw) {
        // A single-letter scheme is a Windows drive, not a URL.
        Ok(url) if url.scheme().len() == 1 => Ok(urls::file_url_from_path(raw)),
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(urls::file_url_from_path(raw)),
        Err(e) => Err(e).with_context(|| format!("parsing archive location {raw:?}")),
    }
}
