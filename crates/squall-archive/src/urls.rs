//! URL handling at the bundle boundary.
//!
//! Filesystem lookups use decoded paths while `metadata.json` carries the
//! encoded URL form, so the two conversions live here, next to the rule
//! that only `file` URLs have a native path worth normalizing.

use percent_encoding::percent_decode_str;
use url::Url;

use squall_fs::path::normalize_and_anonymize;

/// Decoded filesystem path of a URL.
pub(crate) fn fs_path(url: &Url) -> String {
    percent_decode_str(url.path())
        .decode_utf8_lossy()
        .into_owned()
}

/// Normalize and anonymize the path of a `file` URL. URLs of other schemes
/// are returned unchanged: their paths are not native paths and carry no
/// home directories to scrub.
pub(crate) fn normalize_file_url(url: &Url) -> Url {
    if url.scheme() != "file" {
        return url.clone();
    }
    let mut out = url.clone();
    out.set_path(&normalize_and_anonymize(&fs_path(url)));
    out
}

/// Build a `file` URL from a native path, normalizing it on the way.
pub(crate) fn file_url_from_path(path: &str) -> Url {
    let mut url = Url::parse("file:///").expect("literal URL");
    url.set_path(&normalize_and_anonymize(path));
    url
}
