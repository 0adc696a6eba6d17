use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::NamedTempFile;

use crate::compression::Encoding;
use crate::error::{Error, Result};
use crate::id::VolumeId;
use crate::layout::{self, Scheme, TreeLayout};
use crate::stream::{ResourceReader, ResourceSink, ResourceWriter};

use super::{Request, Resolver};

#[derive(Debug, Clone)]
enum FsLayout {
    /// The identifier is itself the path.
    Literal,
    Flat(PathBuf),
    Tree(TreeLayout),
}

/// Directory-backed resolver: path, local, pairtree or stubbytree.
#[derive(Debug, Clone)]
pub struct FsResolver {
    layout: FsLayout,
    encoding: Encoding,
}

impl FsResolver {
    pub fn literal(encoding: Encoding) -> Self {
        Self {
            layout: FsLayout::Literal,
            encoding,
        }
    }

    pub fn local(dir: impl Into<PathBuf>, encoding: Encoding) -> Self {
        Self {
            layout: FsLayout::Flat(dir.into()),
            encoding,
        }
    }

    pub fn pairtree(dir: impl Into<PathBuf>, encoding: Encoding) -> Self {
        Self {
            layout: FsLayout::Tree(TreeLayout::new(dir, Scheme::Pairtree)),
            encoding,
        }
    }

    pub fn stubbytree(dir: impl Into<PathBuf>, encoding: Encoding) -> Self {
        Self {
            layout: FsLayout::Tree(TreeLayout::new(dir, Scheme::Stubbytree)),
            encoding,
        }
    }

    fn address(&self, id: &str, request: &Request) -> Result<PathBuf> {
        match &self.layout {
            FsLayout::Literal => {
                if id.is_empty() {
                    return Err(Error::malformed(id, "empty path"));
                }
                Ok(PathBuf::from(id))
            }
            FsLayout::Flat(dir) => {
                let id = VolumeId::parse(id)?;
                let name =
                    layout::file_name(&id, request.format, request.compression, request.suffix())?;
                Ok(dir.join(name))
            }
            FsLayout::Tree(tree) => {
                let id = VolumeId::parse(id)?;
                tree.path(&id, request.format, request.compression, request.suffix())
            }
        }
    }
}

impl Resolver for FsResolver {
    fn method(&self) -> &str {
        match &self.layout {
            FsLayout::Literal => "path",
            FsLayout::Flat(_) => "local",
            FsLayout::Tree(tree) => match tree.scheme() {
                Scheme::Pairtree => "pairtree",
                Scheme::Stubbytree => "stubbytree",
            },
        }
    }

    fn location(&self) -> String {
        match &self.layout {
            FsLayout::Literal => String::new(),
            FsLayout::Flat(dir) => dir.display().to_string(),
            FsLayout::Tree(tree) => tree.root().display().to_string(),
        }
    }

    fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn path(&self, id: &str, request: &Request) -> Result<PathBuf> {
        self.address(id, request)
    }

    fn open_raw_read(&self, id: &str, request: &Request) -> Result<ResourceReader> {
        let path = self.address(id, request)?;
        debug!("{} read {}", self.method(), path.display());
        let file = File::open(&path).map_err(|err| Error::from_open(err, path.display()))?;
        Ok(Box::new(file))
    }

    fn open_raw_write(&self, id: &str, request: &Request) -> Result<ResourceWriter> {
        let path = self.address(id, request)?;
        debug!("{} write {}", self.method(), path.display());
        Ok(Box::new(FileSink::create(path)?))
    }
}

/// Writes into a uniquely named sibling temp file and renames it onto the
/// destination on `finish`, creating missing parent directories first.
///
/// The temp file is removed on every path that does not end in a rename.
pub(crate) struct FileSink {
    file: Option<BufWriter<NamedTempFile>>,
    dest: PathBuf,
}

impl FileSink {
    pub(crate) fn create(dest: PathBuf) -> Result<Self> {
        let parent = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;
        let file = tempfile::Builder::new()
            .prefix(&temp_prefix(&dest))
            .suffix(".tmp")
            .tempfile_in(&parent)?;
        Ok(Self {
            file: Some(BufWriter::new(file)),
            dest,
        })
    }

    fn file(&mut self) -> io::Result<&mut BufWriter<NamedTempFile>> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "sink already finished"))
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl ResourceSink for FileSink {
    fn finish(mut self: Box<Self>) -> Result<()> {
        let file = self
            .file
            .take()
            .ok_or_else(|| Error::Unsupported("sink already finished".into()))?;
        let file = file.into_inner().map_err(|err| Error::Io(err.into_error()))?;
        file.as_file().sync_all()?;
        file.persist(&self.dest).map_err(|err| Error::Io(err.error))?;
        Ok(())
    }
}

/// Hidden name stem for temp files, so a directory listing never shows a
/// half-written resource under its final name.
fn temp_prefix(dest: &Path) -> OsString {
    let mut prefix = OsString::from(".");
    if let Some(name) = dest.file_name() {
        prefix.push(name);
    }
    prefix.push(".");
    prefix
}
