//! Byte streams handed out by resolvers, and the scoped handle list that keeps
//! auxiliary OS handles alive for exactly as long as one stream needs them.

use std::fmt;
use std::io::{self, Read, Write};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type ResourceReader = Box<dyn Read + Send>;
pub type ResourceWriter = Box<dyn ResourceSink>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Read,
    Write,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Read => f.write_str("read"),
            Mode::Write => f.write_str("write"),
        }
    }
}

/// Write half of a resource.
///
/// Bytes written are not visible at the resource address until `finish` returns
/// `Ok`. Dropping a sink without finishing it abandons the write.
pub trait ResourceSink: Write + Send {
    fn finish(self: Box<Self>) -> Result<()>;
}

pub enum Stream {
    Reader(ResourceReader),
    Writer(ResourceWriter),
}

impl Stream {
    pub fn mode(&self) -> Mode {
        match self {
            Stream::Reader(_) => Mode::Read,
            Stream::Writer(_) => Mode::Write,
        }
    }

    pub fn into_reader(self) -> Result<ResourceReader> {
        match self {
            Stream::Reader(reader) => Ok(reader),
            Stream::Writer(_) => Err(Error::Unsupported("stream was opened for write".into())),
        }
    }

    pub fn into_writer(self) -> Result<ResourceWriter> {
        match self {
            Stream::Writer(writer) => Ok(writer),
            Stream::Reader(_) => Err(Error::Unsupported("stream was opened for read".into())),
        }
    }
}

/// An OS-level handle that must be released when its owning stream is done.
pub trait Release: Send {
    fn release(self: Box<Self>) -> io::Result<()>;
}

impl Release for std::fs::File {
    fn release(self: Box<Self>) -> io::Result<()> {
        drop(self);
        Ok(())
    }
}

/// Ordered list of handles acquired while serving one logical stream.
///
/// `close_all` releases every handle in acquisition order and reports the first
/// failure after attempting all of them. Dropping the scope does the same,
/// discarding errors.
#[derive(Default)]
pub struct HandleScope {
    handles: Vec<(String, Box<dyn Release>)>,
}

impl HandleScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, label: impl Into<String>, handle: impl Release + 'static) {
        self.handles.push((label.into(), Box::new(handle)));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn close_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for (label, handle) in self.handles.drain(..) {
            debug!("releasing handle {label}");
            if let Err(err) = handle.release() {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(Error::Io(err)),
            None => Ok(()),
        }
    }
}

impl Drop for HandleScope {
    fn drop(&mut self) {
        let _ = self.close_all();
    }
}

/// A reader that owns the handles its inner stream depends on.
///
/// The inner reader is dropped first, then the scope is closed.
pub struct ScopedReader {
    inner: Option<ResourceReader>,
    scope: HandleScope,
}

impl ScopedReader {
    pub fn new(inner: ResourceReader, scope: HandleScope) -> Self {
        Self {
            inner: Some(inner),
            scope,
        }
    }

    pub fn close(mut self) -> Result<()> {
        self.inner.take();
        self.scope.close_all()
    }
}

impl Read for ScopedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(inner) => inner.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for ScopedReader {
    fn drop(&mut self) {
        self.inner.take();
        let _ = self.scope.close_all();
    }
}

/// Sink that accumulates the whole resource in memory; used by backends that can
/// only commit a complete payload (archive members).
pub(crate) struct BufferedSink<F>
where
    F: FnOnce(Vec<u8>) -> Result<()> + Send,
{
    buf: Vec<u8>,
    commit: Option<F>,
}

impl<F> BufferedSink<F>
where
    F: FnOnce(Vec<u8>) -> Result<()> + Send,
{
    pub(crate) fn new(commit: F) -> Self {
        Self {
            buf: Vec::new(),
            commit: Some(commit),
        }
    }
}

impl<F> Write for BufferedSink<F>
where
    F: FnOnce(Vec<u8>) -> Result<()> + Send,
{
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<F> ResourceSink for BufferedSink<F>
where
    F: FnOnce(Vec<u8>) -> Result<()> + Send,
{
    fn finish(mut self: Box<Self>) -> Result<()> {
        let commit = self
            .commit
            .take()
            .ok_or_else(|| Error::Unsupported("sink already finished".into()))?;
        commit(std::mem::take(&mut self.buf))
    }
}
