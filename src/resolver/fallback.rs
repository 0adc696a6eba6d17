use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::compression::Encoding;
use crate::error::Result;
use crate::stream::{ResourceReader, ResourceWriter};

use super::{copy_resource, Request, Resolver};

/// Read-through, write-back cache over two resolvers.
///
/// A read is served by `primary` when it can be. Only a `NotFound` from the
/// primary sends the read to `fallback`; the resource is then copied into the
/// primary and re-opened there, so callers always see primary read semantics.
/// Writes go to the primary only.
///
/// An `uncached` resolver reads through to the fallback on a miss without
/// filling the primary.
pub struct FallbackResolver {
    primary: Arc<dyn Resolver>,
    fallback: Option<Arc<dyn Resolver>>,
    cache: bool,
}

impl FallbackResolver {
    pub fn new(primary: Arc<dyn Resolver>, fallback: Arc<dyn Resolver>) -> Self {
        Self {
            primary,
            fallback: Some(fallback),
            cache: true,
        }
    }

    pub fn uncached(primary: Arc<dyn Resolver>, fallback: Arc<dyn Resolver>) -> Self {
        Self {
            primary,
            fallback: Some(fallback),
            cache: false,
        }
    }

    /// A cache tier with nothing behind it; misses propagate as `NotFound`.
    pub fn without_fallback(primary: Arc<dyn Resolver>) -> Self {
        Self {
            primary,
            fallback: None,
            cache: true,
        }
    }

    pub fn caches(&self) -> bool {
        self.cache
    }

    pub fn primary(&self) -> &Arc<dyn Resolver> {
        &self.primary
    }

    pub fn fallback(&self) -> Option<&Arc<dyn Resolver>> {
        self.fallback.as_ref()
    }

    /// The request used against the fallback: same resource, stored in the
    /// fallback tier's own compression.
    fn fallback_request(fallback: &dyn Resolver, request: &Request) -> Request {
        request.recompressed(fallback.encoding().compression)
    }
}

impl Resolver for FallbackResolver {
    fn method(&self) -> &str {
        self.primary.method()
    }

    fn location(&self) -> String {
        self.primary.location()
    }

    fn encoding(&self) -> Encoding {
        self.primary.encoding()
    }

    fn writable(&self) -> bool {
        self.primary.writable()
    }

    fn path(&self, id: &str, request: &Request) -> Result<PathBuf> {
        self.primary.path(id, request)
    }

    fn open_raw_read(&self, id: &str, request: &Request) -> Result<ResourceReader> {
        self.primary.open_raw_read(id, request)
    }

    fn open_raw_write(&self, id: &str, request: &Request) -> Result<ResourceWriter> {
        self.primary.open_raw_write(id, request)
    }

    fn open_read(&self, id: &str, request: &Request) -> Result<ResourceReader> {
        let err = match self.primary.open_read(id, request) {
            Ok(reader) => {
                debug!("{id}: hit in {}:{}", self.primary.method(), self.primary.location());
                return Ok(reader);
            }
            Err(err) if err.is_not_found() => err,
            Err(err) => return Err(err),
        };

        let Some(fallback) = self.fallback.as_deref() else {
            warn!("{id}: miss in {} and no fallback configured", self.primary.method());
            return Err(err);
        };

        debug!(
            "{id}: miss in {}:{}, fetching from {}:{}",
            self.primary.method(),
            self.primary.location(),
            fallback.method(),
            fallback.location()
        );
        let fallback_request = Self::fallback_request(fallback, request);
        if !self.cache {
            return fallback.open_read(id, &fallback_request);
        }
        let copied = copy_resource(id, fallback, &fallback_request, &*self.primary, request)?;
        info!(
            "{id}: cached {copied} bytes into {}:{}",
            self.primary.method(),
            self.primary.location()
        );
        self.primary.open_read(id, request)
    }

    fn open_write(&self, id: &str, request: &Request) -> Result<ResourceWriter> {
        self.primary.open_write(id, request)
    }
}
