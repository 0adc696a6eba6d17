//! Logical formats, compression codecs and the decompression layer.
//!
//! The layer wraps a backend's raw stream so that reads inflate and writes
//! deflate according to the declared compression. Self-framing formats
//! (parquet) carry their codec internally and always pass through untouched,
//! whatever compression was requested.
//!
//! # Usage
//!
//! ```rust,ignore
//! use htrc_store::compression::{wrap_reader, Compression, Format};
//!
//! let file = std::fs::File::open("mdp.39015.json.bz2")?;
//! let reader = wrap_reader(Box::new(file), Format::Json, Compression::Bz2)?;
//! ```

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stream::{ResourceReader, ResourceSink, ResourceWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Format {
    Json,
    Parquet,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Parquet => "parquet",
        }
    }

    /// Formats whose compression, if any, lives inside the format itself.
    pub fn is_self_framing(&self) -> bool {
        matches!(self, Format::Parquet)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Format::Json),
            "parquet" => Ok(Format::Parquet),
            other => Err(Error::Misconfigured(format!("unknown format {other:?}"))),
        }
    }
}

impl TryFrom<String> for Format {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Format> for String {
    fn from(value: Format) -> Self {
        value.extension().to_string()
    }
}

/// Declared compression of a resource. There is no implicit default: every
/// resolver tier and every request names one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Compression {
    None,
    Bz2,
    Gz,
    /// Parquet-internal codec; never applied by this layer.
    Snappy,
}

impl Compression {
    /// Filename extension, if this codec shows up in file names at all.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Bz2 => Some("bz2"),
            Compression::Gz => Some("gz"),
            Compression::Snappy => Some("snappy"),
        }
    }

    fn name(&self) -> &'static str {
        self.extension().unwrap_or("none")
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Compression::None),
            "bz2" => Ok(Compression::Bz2),
            "gz" | "gzip" => Ok(Compression::Gz),
            "snappy" => Ok(Compression::Snappy),
            "default" => Err(Error::Misconfigured(
                "compression \"default\" is not accepted; name the codec explicitly".into(),
            )),
            other => Err(Error::Misconfigured(format!("unknown compression {other:?}"))),
        }
    }
}

impl TryFrom<String> for Compression {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Compression> for String {
    fn from(value: Compression) -> Self {
        value.name().to_string()
    }
}

/// The format and compression a resolver tier stores its resources in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Encoding {
    pub format: Format,
    pub compression: Compression,
}

impl Encoding {
    pub fn new(format: Format, compression: Compression) -> Self {
        Self {
            format,
            compression,
        }
    }

    /// Compression that the stream layer must apply; `None` when the format
    /// frames itself.
    pub fn effective_compression(&self) -> Compression {
        if self.format.is_self_framing() {
            Compression::None
        } else {
            self.compression
        }
    }
}

/// Wrap a raw read stream so that it yields decompressed bytes.
pub fn wrap_reader(
    raw: ResourceReader,
    format: Format,
    compression: Compression,
) -> Result<ResourceReader> {
    match Encoding::new(format, compression).effective_compression() {
        Compression::None => Ok(raw),
        Compression::Bz2 => Ok(Box::new(MultiBzDecoder::new(raw))),
        Compression::Gz => Ok(Box::new(MultiGzDecoder::new(raw))),
        Compression::Snappy => Err(snappy_outside_parquet(format)),
    }
}

/// Wrap a raw sink so that bytes written to it are compressed on the way down.
pub fn wrap_writer(
    raw: ResourceWriter,
    format: Format,
    compression: Compression,
) -> Result<ResourceWriter> {
    let encoder = match Encoding::new(format, compression).effective_compression() {
        Compression::None => return Ok(raw),
        Compression::Bz2 => Encoder::Bz2(BzEncoder::new(raw, bzip2::Compression::default())),
        Compression::Gz => Encoder::Gz(GzEncoder::new(raw, flate2::Compression::default())),
        Compression::Snappy => return Err(snappy_outside_parquet(format)),
    };
    Ok(Box::new(CompressingSink { encoder }))
}

fn snappy_outside_parquet(format: Format) -> Error {
    Error::Misconfigured(format!(
        "snappy is a parquet-internal codec and cannot frame {format} streams"
    ))
}

enum Encoder {
    Bz2(BzEncoder<ResourceWriter>),
    Gz(GzEncoder<ResourceWriter>),
}

struct CompressingSink {
    encoder: Encoder,
}

impl Write for CompressingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.encoder {
            Encoder::Bz2(enc) => enc.write(buf),
            Encoder::Gz(enc) => enc.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.encoder {
            Encoder::Bz2(enc) => enc.flush(),
            Encoder::Gz(enc) => enc.flush(),
        }
    }
}

impl ResourceSink for CompressingSink {
    fn finish(self: Box<Self>) -> Result<()> {
        let inner = match self.encoder {
            Encoder::Bz2(enc) => enc.finish()?,
            Encoder::Gz(enc) => enc.finish()?,
        };
        inner.finish()
    }
}
