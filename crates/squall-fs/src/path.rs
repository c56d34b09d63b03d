//! Lexical path cleaning and anonymization.
//!
//! Every path that ends up inside a bundle must be OS-independent: forward
//! slashes only, drive letters folded into a top-level segment, UNC share
//! roots collapsed, and user-identifying segments scrubbed to `nobody`.
//! Everything here is purely lexical. The host filesystem is never
//! consulted, and the host separator convention never leaks into the
//! output, so a bundle written on Windows replays identically on Linux.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Windows volume prefix, e.g. `C:\dir\f` or `/C:/dir/f`.
    static ref VOLUME: Regex = Regex::new(r"^[/\\]?([a-zA-Z]):(.*)").unwrap();
    /// UNC share prefix before backslash conversion, e.g. `\\VMBOXSVR\dir\f`.
    /// The share name itself is treated as a user-identifying segment.
    static ref SHARE: Regex = Regex::new(r"^\\\\[^\\]+").unwrap();
    /// Home-like parent anchored at the root, optionally behind a volume
    /// segment. The segment after the parent is the username.
    static ref HOME: Regex =
        Regex::new(r"(?i)^(/[a-zA-Z])?/(Users|home|Documents and Settings)/[^/]+").unwrap();
}

/// Lexically clean a `/`-separated path: collapse separator runs, resolve
/// `.` and `..` segments without filesystem access, and drop any trailing
/// slash. Returns `.` when nothing is left.
pub fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    // Number of leading ".." segments that cannot be backtracked over.
    let mut pinned = 0;
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.len() > pinned {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                    pinned = segments.len();
                }
            }
            other => segments.push(other),
        }
    }
    if rooted {
        format!("/{}", segments.join("/"))
    } else if segments.is_empty() {
        ".".to_string()
    } else {
        segments.join("/")
    }
}

/// Normalize a native path to a `/`-separated, rooted, anonymized form.
///
/// The rewrite is total, deterministic and idempotent: drive letters become
/// a `/<LETTER>` segment, UNC share roots become `/nobody`, backslashes
/// become slashes, the result is lexically cleaned, and the first segment
/// under a root-anchored `home`/`Users`/`Documents and Settings` parent is
/// replaced with the literal `nobody`. Parent matching is case-insensitive
/// but the parent's own spelling is preserved.
pub fn normalize_and_anonymize(path: &str) -> String {
    let p = VOLUME.replace(path, "/${1}${2}");
    let p = SHARE.replace(&p, "/nobody");
    let p = p.replace('\\', "/");
    let p = clean(&p);
    if p == "." {
        return "/".to_string();
    }
    let mut p = HOME.replace(&p, "${1}/${2}/nobody").into_owned();
    if !p.starts_with('/') {
        p.insert(0, '/');
    }
    p
}
