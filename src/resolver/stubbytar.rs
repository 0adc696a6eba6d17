use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use crate::compression::Encoding;
use crate::error::{Error, Result};
use crate::id::VolumeId;
use crate::layout::{self, StubbyTarLayout};
use crate::stream::{HandleScope, Release, ResourceReader, ResourceWriter, ScopedReader};

use super::{Request, Resolver};

/// Read-only stubbytree whose leaf directories are packed into tar files.
///
/// Useful where inode capacity rather than disk space limits a mirror.
#[derive(Debug, Clone)]
pub struct StubbyTarResolver {
    layout: StubbyTarLayout,
    encoding: Encoding,
}

impl StubbyTarResolver {
    pub fn new(dir: impl Into<PathBuf>, encoding: Encoding) -> Self {
        Self {
            layout: StubbyTarLayout::new(dir),
            encoding,
        }
    }

    pub fn archive_path(&self, id: &str) -> Result<PathBuf> {
        Ok(self.layout.archive_path(&VolumeId::parse(id)?))
    }
}

impl Resolver for StubbyTarResolver {
    fn method(&self) -> &str {
        "stubbytar"
    }

    fn location(&self) -> String {
        self.layout.root().display().to_string()
    }

    fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn writable(&self) -> bool {
        false
    }

    fn open_raw_read(&self, id: &str, request: &Request) -> Result<ResourceReader> {
        let id = VolumeId::parse(id)?;
        let file_name =
            layout::file_name(&id, request.format, request.compression, request.suffix())?;
        let archive_path = self.layout.archive_path(&id);
        let member = self.layout.member_name(&id, &file_name);
        debug!("stubbytar read {member} from {}", archive_path.display());

        let archive = File::open(&archive_path)
            .map_err(|err| Error::from_open(err, archive_path.display()))?;
        let (offset, len) = locate_member(&archive, &archive_path, &member)?;
        (&archive).seek(SeekFrom::Start(offset))?;

        let archive = SharedFile(Arc::new(archive));
        let mut scope = HandleScope::new();
        scope.register(archive_path.display().to_string(), archive.clone());
        let reader = ScopedReader::new(Box::new(archive.take(len)), scope);
        Ok(Box::new(reader))
    }

    fn open_raw_write(&self, id: &str, _request: &Request) -> Result<ResourceWriter> {
        Err(Error::Unsupported(format!(
            "stubbytar archives are read-only; cannot write {id}"
        )))
    }
}

/// The archive handle, shared between the member stream reading it and the
/// scope that closes it.
#[derive(Clone)]
struct SharedFile(Arc<File>);

impl Read for SharedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&*self.0).read(buf)
    }
}

impl Release for SharedFile {
    fn release(self: Box<Self>) -> io::Result<()> {
        drop(self);
        Ok(())
    }
}

/// Byte offset and length of `member`'s data inside the tar file.
fn locate_member(file: &File, archive_path: &Path, member: &str) -> Result<(u64, u64)> {
    let mut archive = tar::Archive::new(file);
    let entries = archive
        .entries_with_seek()
        .map_err(|err| tar_error(archive_path, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| tar_error(archive_path, err))?;
        let path = entry.path().map_err(|err| tar_error(archive_path, err))?;
        let path: &Path = &path;
        if path.strip_prefix("./").unwrap_or(path) == Path::new(member) {
            return Ok((entry.raw_file_position(), entry.size()));
        }
    }
    Err(Error::NotFound(format!(
        "{member} in {}",
        archive_path.display()
    )))
}

fn tar_error(archive_path: &Path, err: io::Error) -> Error {
    Error::Archive {
        path: archive_path.display().to_string(),
        detail: err.to_string(),
    }
}
