//! Identifier-to-address layouts.
//!
//! Every function here is pure: the same identifier and request always map to the
//! same file name, directory, archive or member.

use std::fmt;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

use crate::compression::{Compression, Format};
use crate::error::{Error, Result};
use crate::id::VolumeId;

pub const PAIRTREE_ROOT: &str = "pairtree_root";
pub const DEFAULT_SHARD_LEN: usize = 3;
const SHA1_HEX_LEN: usize = 40;

/// `{encoded-id}[.{suffix}].{format}[.{compression}]`.
///
/// The compression segment is dropped for `Compression::None` and for
/// self-framing formats.
pub fn file_name(
    id: &VolumeId,
    format: Format,
    compression: Compression,
    suffix: Option<&str>,
) -> Result<String> {
    let mut name = id.encode().to_string();
    if let Some(suffix) = suffix {
        validate_suffix(suffix)?;
        name.push('.');
        name.push_str(suffix);
    }
    name.push('.');
    name.push_str(format.extension());
    if !format.is_self_framing() {
        if let Some(ext) = compression.extension() {
            name.push('.');
            name.push_str(ext);
        }
    }
    Ok(name)
}

/// Successive two-character shards of an encoded volume; the last one may be a
/// single character.
pub fn pairtree_segments(encoded_volume: &str) -> Vec<String> {
    let chars: Vec<char> = encoded_volume.chars().collect();
    chars.chunks(2).map(|pair| pair.iter().collect()).collect()
}

/// Every third character of an encoded volume, starting with the first.
pub fn stubby_segment(encoded_volume: &str) -> String {
    encoded_volume.chars().step_by(3).collect()
}

/// Lowercase hex sha1 of the raw identifier, truncated to `shard_len` characters.
pub fn ziptree_shard(id: &VolumeId, shard_len: usize) -> String {
    let digest = Sha1::digest(id.as_str().as_bytes());
    let mut shard = hex::encode(digest);
    shard.truncate(shard_len);
    shard
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Pairtree,
    Stubbytree,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Pairtree => f.write_str("pairtree"),
            Scheme::Stubbytree => f.write_str("stubbytree"),
        }
    }
}

impl std::str::FromStr for Scheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pairtree" => Ok(Scheme::Pairtree),
            "stubbytree" => Ok(Scheme::Stubbytree),
            other => Err(Error::Misconfigured(format!("unknown path scheme {other:?}"))),
        }
    }
}

impl Scheme {
    /// Directory of `id` relative to the tree root.
    pub fn dir(&self, id: &VolumeId) -> PathBuf {
        let encoded = id.encode();
        let mut dir = PathBuf::from(encoded.library());
        match self {
            Scheme::Pairtree => {
                dir.push(PAIRTREE_ROOT);
                for segment in pairtree_segments(encoded.volume()) {
                    dir.push(segment);
                }
                dir.push(encoded.volume());
            }
            Scheme::Stubbytree => dir.push(stubby_segment(encoded.volume())),
        }
        dir
    }

    pub fn relative_path(
        &self,
        id: &VolumeId,
        format: Format,
        compression: Compression,
        suffix: Option<&str>,
    ) -> Result<PathBuf> {
        Ok(self.dir(id).join(file_name(id, format, compression, suffix)?))
    }

    /// Same as `relative_path`, joined with `/` whatever the host separator.
    pub fn url_path(
        &self,
        id: &VolumeId,
        format: Format,
        compression: Compression,
        suffix: Option<&str>,
    ) -> Result<String> {
        let path = self.relative_path(id, format, compression, suffix)?;
        Ok(path
            .iter()
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"))
    }
}

/// Rsync-relative location of the canonical `json.bz2` dataset file.
pub fn rsync_path(id: &VolumeId, scheme: Scheme) -> Result<String> {
    scheme.url_path(id, Format::Json, Compression::Bz2, None)
}

#[derive(Debug, Clone)]
pub struct TreeLayout {
    root: PathBuf,
    scheme: Scheme,
}

impl TreeLayout {
    pub fn new(root: impl Into<PathBuf>, scheme: Scheme) -> Self {
        Self {
            root: root.into(),
            scheme,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn path(
        &self,
        id: &VolumeId,
        format: Format,
        compression: Compression,
        suffix: Option<&str>,
    ) -> Result<PathBuf> {
        Ok(self
            .root
            .join(self.scheme.relative_path(id, format, compression, suffix)?))
    }
}

#[derive(Debug, Clone)]
pub struct ZiptreeLayout {
    root: PathBuf,
    shard_len: usize,
}

impl ZiptreeLayout {
    pub fn new(root: impl Into<PathBuf>, shard_len: usize) -> Result<Self> {
        if shard_len == 0 || shard_len > SHA1_HEX_LEN {
            return Err(Error::Misconfigured(format!(
                "ziptree shard length must be in 1..={SHA1_HEX_LEN}, got {shard_len}"
            )));
        }
        Ok(Self {
            root: root.into(),
            shard_len,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shard_len(&self) -> usize {
        self.shard_len
    }

    pub fn archive_path(&self, id: &VolumeId) -> PathBuf {
        self.root
            .join(format!("{}.zip", ziptree_shard(id, self.shard_len)))
    }
}

/// One tar archive per stubbytree leaf directory: `{lib}/{stub}.tar`, holding
/// members named `{stub}/{file}`.
#[derive(Debug, Clone)]
pub struct StubbyTarLayout {
    root: PathBuf,
}

impl StubbyTarLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive_path(&self, id: &VolumeId) -> PathBuf {
        let encoded = id.encode();
        self.root
            .join(encoded.library())
            .join(format!("{}.tar", stubby_segment(encoded.volume())))
    }

    pub fn member_name(&self, id: &VolumeId, file_name: &str) -> String {
        format!("{}/{file_name}", stubby_segment(id.encode().volume()))
    }
}

fn validate_suffix(suffix: &str) -> Result<()> {
    if suffix.is_empty() {
        return Err(Error::Misconfigured("empty file suffix".into()));
    }
    if suffix == "." || suffix == ".." || suffix.contains(['/', '\\', '\0']) {
        return Err(Error::Misconfigured(format!("invalid file suffix {suffix:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> VolumeId {
        VolumeId::parse(raw).expect("valid id")
    }

    #[test]
    fn file_name_drops_compression_for_parquet() {
        let name = file_name(
            &id("mdp.12345"),
            Format::Parquet,
            Compression::Snappy,
            Some("tokens"),
        )
        .expect("name");
        assert_eq!(name, "mdp.12345.tokens.parquet");

        let name = file_name(&id("mdp.12345"), Format::Json, Compression::Gz, None).expect("name");
        assert_eq!(name, "mdp.12345.json.gz");

        let name = file_name(&id("mdp.12345"), Format::Json, Compression::None, None).expect("name");
        assert_eq!(name, "mdp.12345.json");
    }

    #[test]
    fn file_name_is_pure_and_sensitive_to_every_argument() {
        let vol = id("uc2.ark:/13960/t0dv1g69b");
        let base = file_name(&vol, Format::Json, Compression::Bz2, Some("meta")).expect("name");
        assert_eq!(
            base,
            file_name(&vol, Format::Json, Compression::Bz2, Some("meta")).expect("name")
        );
        let variants = [
            file_name(&vol, Format::Json, Compression::Bz2, None),
            file_name(&vol, Format::Json, Compression::Bz2, Some("tokens")),
            file_name(&vol, Format::Json, Compression::Gz, Some("meta")),
            file_name(&vol, Format::Parquet, Compression::Bz2, Some("meta")),
        ];
        for variant in variants {
            assert_ne!(variant.expect("name"), base);
        }
    }

    #[test]
    fn invalid_suffix_is_rejected() {
        let err = file_name(&id("mdp.1"), Format::Json, Compression::None, Some("a/b")).unwrap_err();
        assert!(matches!(err, Error::Misconfigured(_)));
    }

    #[test]
    fn pairtree_path_matches_reference_layout() {
        let path = Scheme::Pairtree
            .url_path(&id("aeu.ark:/13960/t1rf63t52"), Format::Json, Compression::Gz, None)
            .expect("path");
        assert_eq!(
            path,
            "aeu/pairtree_root/ar/k+/=1/39/60/=t/1r/f6/3t/52/ark+=13960=t1rf63t52/aeu.ark+=13960=t1rf63t52.json.gz"
        );
    }

    #[test]
    fn pairtree_depth_follows_encoded_length() {
        for raw in ["mdp.1", "mdp.12", "mdp.39015012345", "uc2.ark:/13960/t0dv1g69b"] {
            let vol = id(raw);
            let encoded_len = vol.encode().volume().chars().count();
            let dir = Scheme::Pairtree.dir(&vol);
            // lib + pairtree_root + shards + terminal id directory
            assert_eq!(dir.iter().count(), 2 + encoded_len.div_ceil(2) + 1, "{raw}");
        }
    }

    #[test]
    fn stubbytree_has_one_level_below_library() {
        let vol = id("aeu.ark:/13960/t1rf63t52");
        let path = Scheme::Stubbytree
            .url_path(&vol, Format::Json, Compression::Bz2, None)
            .expect("path");
        assert_eq!(path, "aeu/a+30165/aeu.ark+=13960=t1rf63t52.json.bz2");
        assert_eq!(Scheme::Stubbytree.dir(&vol).iter().count(), 2);
    }

    #[test]
    fn stubby_segment_takes_every_third_char() {
        assert_eq!(stubby_segment("abcdefgh"), "adg");
        assert_eq!(stubby_segment("a"), "a");
    }

    #[test]
    fn ziptree_shard_is_truncated_sha1() {
        let vol = id("mdp.39015012345");
        let full = ziptree_shard(&vol, 40);
        assert_eq!(full.len(), 40);
        assert!(full.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(ziptree_shard(&vol, 3), full[..3]);
    }

    #[test]
    fn ziptree_layout_rejects_bad_shard_len() {
        assert!(ZiptreeLayout::new("/data", 0).is_err());
        assert!(ZiptreeLayout::new("/data", 41).is_err());
    }

    #[test]
    fn stubbytar_archive_and_member() {
        let layout = StubbyTarLayout::new("/data/tars");
        let vol = id("mdp.39015012345");
        assert_eq!(
            layout.archive_path(&vol),
            PathBuf::from("/data/tars/mdp/3114.tar")
        );
        assert_eq!(
            layout.member_name(&vol, "mdp.39015012345.json.bz2"),
            "3114/mdp.39015012345.json.bz2"
        );
    }

    #[test]
    fn rsync_path_uses_json_bz2() {
        let path = rsync_path(&id("mdp.39015012345"), Scheme::Stubbytree).expect("rsync");
        assert_eq!(path, "mdp/3114/mdp.39015012345.json.bz2");
    }
}
