//! The `metadata.json` envelope.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// Structured envelope stored as `metadata.json` at the root of a bundle.
///
/// The `filename`/`pwd` strings are the legacy form of the entry and
/// working-directory locations; writers populate them for older readers
/// and readers derive them when only the canonical `*_url` fields are
/// present. Unknown keys survive a round-trip untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    /// Script dialect, e.g. `js`. Opaque to the container.
    #[serde(rename = "type", default)]
    pub type_: String,

    /// Version of the tool that produced the bundle. Advisory; readers do
    /// not validate it. The key name is part of the on-disk contract.
    #[serde(default)]
    pub k6_version: String,

    /// Test options, preserved verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,

    /// Legacy string form of [`Self::filename_url`].
    #[serde(default)]
    pub filename: String,

    /// Canonical entry-script URL, normalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_url: Option<Url>,

    /// Legacy string form of [`Self::pwd_url`].
    #[serde(default)]
    pub pwd: String,

    /// Canonical working-directory URL, normalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pwd_url: Option<Url>,

    /// Raw bytes of the entry script. May be absent, in which case the
    /// `file` filesystem holds the script at the entry path.
    #[serde(
        default,
        with = "base64_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Vec<u8>>,

    /// Forward-compatibility: keys this version does not recognize.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ArchiveMetadata {
    /// The bytes written as `metadata.json`. serde_json leaves `<`, `>`
    /// and `&` as literal UTF-8, which keeps the envelope embeddable in a
    /// web context without double escaping.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match data {
            Some(bytes) => s.serialize_str(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|encoded| {
                STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}
