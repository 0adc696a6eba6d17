//! The resolver contract and its backends.
//!
//! A backend only knows how to turn an identifier into raw bytes at its own kind
//! of address (`open_raw_read` / `open_raw_write`). The provided `open_read` /
//! `open_write` methods put the decompression layer on top, so every backend
//! presents the same stream semantics to callers.

mod fallback;
mod fs;
#[cfg(feature = "http")]
mod http;
mod stubbytar;
mod ziptree;

use std::io;
use std::path::PathBuf;

use log::debug;

use crate::compression::{self, Compression, Encoding, Format};
use crate::error::{Error, Result};
use crate::stream::{Mode, ResourceReader, ResourceWriter, Stream};

pub use fallback::FallbackResolver;
pub use fs::FsResolver;
#[cfg(feature = "http")]
pub use http::{HttpResolver, DEFAULT_URL};
pub use stubbytar::StubbyTarResolver;
pub use ziptree::ZiptreeResolver;

/// Per-call description of the resource wanted for an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Request {
    pub format: Format,
    pub compression: Compression,
    pub suffix: Option<String>,
}

impl Request {
    pub fn new(format: Format, compression: Compression) -> Self {
        Self {
            format,
            compression,
            suffix: None,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    pub fn encoding(&self) -> Encoding {
        Encoding::new(self.format, self.compression)
    }

    /// The same resource, stored under a different compression.
    pub fn recompressed(&self, compression: Compression) -> Self {
        Self {
            compression,
            ..self.clone()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.compression == Compression::Snappy && !self.format.is_self_framing() {
            return Err(Error::Misconfigured(format!(
                "snappy compression requested for {} resource",
                self.format
            )));
        }
        Ok(())
    }
}

impl From<Encoding> for Request {
    fn from(value: Encoding) -> Self {
        Self::new(value.format, value.compression)
    }
}

pub trait Resolver: Send + Sync {
    /// Backend nickname, e.g. `pairtree`.
    fn method(&self) -> &str;

    /// Where this resolver stores data: a directory, URL template, or empty.
    /// Together with `method` this identifies a tier.
    fn location(&self) -> String;

    /// Format and compression this tier stores its resources in.
    fn encoding(&self) -> Encoding;

    fn writable(&self) -> bool {
        true
    }

    fn open_raw_read(&self, id: &str, request: &Request) -> Result<ResourceReader>;

    fn open_raw_write(&self, id: &str, request: &Request) -> Result<ResourceWriter>;

    /// Filesystem path of the resource, for backends that have one.
    fn path(&self, id: &str, _request: &Request) -> Result<PathBuf> {
        Err(Error::Unsupported(format!(
            "{} resolver has no filesystem path for {id}",
            self.method()
        )))
    }

    /// Default request for this tier, without a suffix.
    fn request(&self) -> Request {
        Request::from(self.encoding())
    }

    fn open_read(&self, id: &str, request: &Request) -> Result<ResourceReader> {
        request.validate()?;
        let raw = self.open_raw_read(id, request)?;
        compression::wrap_reader(raw, request.format, request.compression)
    }

    fn open_write(&self, id: &str, request: &Request) -> Result<ResourceWriter> {
        request.validate()?;
        let raw = self.open_raw_write(id, request)?;
        compression::wrap_writer(raw, request.format, request.compression)
    }

    fn open(&self, id: &str, mode: Mode, request: &Request) -> Result<Stream> {
        match mode {
            Mode::Read => self.open_read(id, request).map(Stream::Reader),
            Mode::Write => self.open_write(id, request).map(Stream::Writer),
        }
    }
}

/// Copy one resource from `from` to `to`, decompressing with `from_request` and
/// recompressing with `to_request`. Returns the number of decompressed bytes.
///
/// The source is opened first, so a missing source never touches the target.
/// Nothing becomes visible at the target unless the whole copy succeeds.
pub fn copy_resource(
    id: &str,
    from: &dyn Resolver,
    from_request: &Request,
    to: &dyn Resolver,
    to_request: &Request,
) -> Result<u64> {
    if from_request.format != to_request.format {
        return Err(Error::Misconfigured(format!(
            "cannot copy {id} from {} to {} without transcoding",
            from_request.format, to_request.format
        )));
    }
    let mut reader = from.open_read(id, from_request)?;
    let mut writer = to.open_write(id, to_request)?;
    let copied = io::copy(&mut reader, &mut writer)?;
    writer.finish()?;
    debug!(
        "copied {id} ({copied} bytes) from {}:{} to {}:{}",
        from.method(),
        from.location(),
        to.method(),
        to.location()
    );
    Ok(copied)
}
