//! Volume identifiers and their filesystem-safe encoding.
//!
//! A raw identifier has the form `library.volume`, split at the first `.`; the
//! volume part may itself contain `:`, `/` and further dots. The encoded form
//! replaces `:` with `+`, `/` with `=` and every dot of the volume part with `,`.
//!
//! Raw identifiers that already contain one of the encoding targets are rejected
//! at parse time, which keeps `decode(encode(x)) == x` total over everything the
//! type can hold. Encoding is only reachable from a parsed [`VolumeId`], so an
//! [`EncodedId`] can never be encoded a second time.

use std::fmt;

use crate::error::{Error, Result};

const RESERVED: [char; 3] = ['+', '=', ','];

const FORMAT_EXTENSIONS: [&str; 2] = [".json", ".parquet"];
const COMPRESSION_EXTENSIONS: [&str; 2] = [".gz", ".bz2"];
const KNOWN_SUFFIXES: [&str; 4] = [".meta", ".tokens", ".chars", ".section"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeId {
    raw: String,
    split: usize,
}

impl VolumeId {
    pub fn parse(raw: &str) -> Result<Self> {
        let split = raw
            .find('.')
            .ok_or_else(|| Error::malformed(raw, "missing '.' between library and volume"))?;
        let (library, volume) = (&raw[..split], &raw[split + 1..]);
        validate_library(raw, library)?;
        if volume.is_empty() {
            return Err(Error::malformed(raw, "empty volume part"));
        }
        if volume.contains(RESERVED) {
            return Err(Error::malformed(
                raw,
                "volume part contains a reserved encoding character ('+', '=' or ',')",
            ));
        }
        if volume.contains(['\0', '\\']) {
            return Err(Error::malformed(raw, "volume part contains a forbidden character"));
        }
        Ok(Self {
            raw: raw.to_string(),
            split,
        })
    }

    /// Parse the encoded form (`lib.vol` with the volume part escaped).
    pub fn from_encoded(encoded: &str) -> Result<Self> {
        let (library, volume) = encoded
            .split_once('.')
            .ok_or_else(|| Error::malformed(encoded, "missing '.' between library and volume"))?;
        if volume.contains([':', '/', '.']) {
            return Err(Error::malformed(encoded, "volume part is not in encoded form"));
        }
        Self::parse(&format!("{library}.{}", decode_volume(volume)))
    }

    /// Recover the identifier from a file name produced by `layout::file_name`.
    pub fn from_file_name(name: &str) -> Result<Self> {
        let mut stem = name;
        for ext in COMPRESSION_EXTENSIONS {
            stem = stem.strip_suffix(ext).unwrap_or(stem);
        }
        for ext in FORMAT_EXTENSIONS {
            stem = stem.strip_suffix(ext).unwrap_or(stem);
        }
        for ext in KNOWN_SUFFIXES {
            stem = stem.strip_suffix(ext).unwrap_or(stem);
        }
        Self::from_encoded(stem)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn library(&self) -> &str {
        &self.raw[..self.split]
    }

    pub fn volume(&self) -> &str {
        &self.raw[self.split + 1..]
    }

    pub fn encode(&self) -> EncodedId {
        EncodedId {
            library: self.library().to_string(),
            volume: encode_volume(self.volume()),
        }
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for VolumeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedId {
    library: String,
    volume: String,
}

impl EncodedId {
    pub fn library(&self) -> &str {
        &self.library
    }

    /// The escaped volume part, used for shard computation.
    pub fn volume(&self) -> &str {
        &self.volume
    }

    pub fn decode(&self) -> Result<VolumeId> {
        VolumeId::from_encoded(&self.to_string())
    }
}

impl fmt::Display for EncodedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.library, self.volume)
    }
}

pub fn encode_volume(volume: &str) -> String {
    volume
        .chars()
        .map(|c| match c {
            ':' => '+',
            '/' => '=',
            '.' => ',',
            other => other,
        })
        .collect()
}

pub fn decode_volume(encoded: &str) -> String {
    encoded
        .chars()
        .map(|c| match c {
            '+' => ':',
            '=' => '/',
            ',' => '.',
            other => other,
        })
        .collect()
}

fn validate_library(raw: &str, library: &str) -> Result<()> {
    if library.is_empty() {
        return Err(Error::malformed(raw, "empty library part"));
    }
    if library.contains(['/', '\\', ':', '\0']) || library.contains(RESERVED) {
        return Err(Error::malformed(raw, "library part contains a forbidden character"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn encode_escapes_volume_part_only() {
        let id = VolumeId::parse("aeu.ark:/13960/t1rf63t52").expect("parse");
        assert_eq!(id.library(), "aeu");
        assert_eq!(id.volume(), "ark:/13960/t1rf63t52");
        assert_eq!(id.encode().to_string(), "aeu.ark+=13960=t1rf63t52");
    }

    #[test]
    fn decode_inverts_encode_with_dots_colons_and_slashes() {
        for raw in [
            "uc2.ark:/13960/t0dv1g69b",
            "hvd.32044.019.626.998",
            "mdp.39015.a:b/c.d",
            "nyp.33433082524681",
        ] {
            let id = VolumeId::parse(raw).expect("parse");
            let encoded = id.encode();
            assert!(!encoded.volume().contains(['.', ':', '/']));
            assert_eq!(encoded.decode().expect("decode"), id);
        }
    }

    #[test]
    fn missing_separator_is_malformed() {
        let err = VolumeId::parse("mdp39015").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }

    #[test]
    fn reserved_characters_are_rejected_at_ingestion() {
        for raw in ["mdp.a+b", "mdp.a=b", "mdp.a,b"] {
            let err = VolumeId::parse(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Malformed, "{raw}");
        }
    }

    #[test]
    fn empty_parts_are_rejected() {
        assert!(VolumeId::parse(".123").is_err());
        assert!(VolumeId::parse("mdp.").is_err());
    }

    #[test]
    fn from_encoded_refuses_raw_form() {
        let err = VolumeId::from_encoded("aeu.ark:/13960/t1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }

    #[test]
    fn from_file_name_strips_extensions() {
        let id = VolumeId::from_file_name("aeu.ark+=13960=t1rf63t52.tokens.parquet").expect("id");
        assert_eq!(id.as_str(), "aeu.ark:/13960/t1rf63t52");

        let id = VolumeId::from_file_name("hvd.32044,019.json.bz2").expect("id");
        assert_eq!(id.as_str(), "hvd.32044.019");
    }
}
