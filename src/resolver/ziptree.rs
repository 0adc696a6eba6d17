use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use log::debug;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::compression::Encoding;
use crate::error::{Error, Result};
use crate::id::VolumeId;
use crate::layout::{self, ZiptreeLayout, DEFAULT_SHARD_LEN};
use crate::stream::{BufferedSink, ResourceReader, ResourceWriter};

use super::{Request, Resolver};

/// Packs every identifier of a sha1 shard into one zip archive.
///
/// Members are immutable once written: a second write of the same member is a
/// `Conflict` and leaves the archive untouched.
#[derive(Debug, Clone)]
pub struct ZiptreeResolver {
    layout: ZiptreeLayout,
    encoding: Encoding,
}

impl ZiptreeResolver {
    pub fn new(dir: impl Into<PathBuf>, encoding: Encoding) -> Result<Self> {
        Self::with_shard_len(dir, DEFAULT_SHARD_LEN, encoding)
    }

    pub fn with_shard_len(
        dir: impl Into<PathBuf>,
        shard_len: usize,
        encoding: Encoding,
    ) -> Result<Self> {
        Ok(Self {
            layout: ZiptreeLayout::new(dir, shard_len)?,
            encoding,
        })
    }

    pub fn archive_path(&self, id: &str) -> Result<PathBuf> {
        Ok(self.layout.archive_path(&VolumeId::parse(id)?))
    }

    fn address(&self, id: &str, request: &Request) -> Result<(PathBuf, String)> {
        let id = VolumeId::parse(id)?;
        let member =
            layout::file_name(&id, request.format, request.compression, request.suffix())?;
        Ok((self.layout.archive_path(&id), member))
    }
}

impl Resolver for ZiptreeResolver {
    fn method(&self) -> &str {
        "ziptree"
    }

    fn location(&self) -> String {
        self.layout.root().display().to_string()
    }

    fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn open_raw_read(&self, id: &str, request: &Request) -> Result<ResourceReader> {
        let (archive_path, member) = self.address(id, request)?;
        debug!("ziptree read {member} from {}", archive_path.display());

        let file = File::open(&archive_path)
            .map_err(|err| Error::from_open(err, archive_path.display()))?;
        if file.metadata()?.len() == 0 {
            return Err(Error::NotFound(format!(
                "{member} in empty archive {}",
                archive_path.display()
            )));
        }

        // Zip member streams borrow the archive and cannot seek, so the member
        // is read out whole and the archive handle released before returning.
        let mut archive =
            ZipArchive::new(&file).map_err(|err| zip_error(&archive_path, &member, err))?;
        let mut entry = archive
            .by_name(&member)
            .map_err(|err| zip_error(&archive_path, &member, err))?;
        // The declared size comes from an unverified header; let the buffer grow.
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        Ok(Box::new(Cursor::new(buf)))
    }

    fn open_raw_write(&self, id: &str, request: &Request) -> Result<ResourceWriter> {
        let (archive_path, member) = self.address(id, request)?;
        debug!("ziptree write {member} into {}", archive_path.display());

        match File::open(&archive_path) {
            Ok(mut file) => ensure_absent(&mut file, &archive_path, &member)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(Error::Io(err)),
        }
        Ok(Box::new(BufferedSink::new(move |buf| {
            append_member(&archive_path, &member, &buf)
        })))
    }
}

/// Append one member to the shard archive, creating the archive if needed.
fn append_member(archive_path: &Path, member: &str, buf: &[u8]) -> Result<()> {
    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(archive_path)?;
    let _lock = ArchiveLock::acquire(&file)?;

    // Another writer may have committed the member since open_write.
    let fresh = file.metadata()?.len() == 0;
    if !fresh {
        ensure_absent(&mut file, archive_path, member)?;
        file.rewind()?;
    }

    let mut writer = if fresh {
        ZipWriter::new(&mut file)
    } else {
        ZipWriter::new_append(&mut file).map_err(|err| zip_error(archive_path, member, err))?
    };
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);
    writer
        .start_file(member, options)
        .map_err(|err| zip_error(archive_path, member, err))?;
    writer.write_all(buf)?;
    writer
        .finish()
        .map_err(|err| zip_error(archive_path, member, err))?;
    drop(writer);
    file.sync_all()?;
    debug!(
        "appended {member} ({} bytes) to {}",
        buf.len(),
        archive_path.display()
    );
    Ok(())
}

/// Exclusive advisory lock on a shard archive, released on drop.
///
/// Held across the duplicate check and the append so that concurrent
/// committers of one shard, in this process or another, take turns.
struct ArchiveLock {
    fd: RawFd,
}

impl ArchiveLock {
    fn acquire(file: &File) -> Result<Self> {
        let fd = file.as_raw_fd();
        loop {
            let res = unsafe { libc::flock(fd, libc::LOCK_EX) };
            if res == 0 {
                return Ok(Self { fd });
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(Error::Io(err));
            }
        }
    }
}

impl Drop for ArchiveLock {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.fd, libc::LOCK_UN);
        }
    }
}

fn ensure_absent(file: &mut File, archive_path: &Path, member: &str) -> Result<()> {
    if file.metadata()?.len() == 0 {
        return Ok(());
    }
    let archive = ZipArchive::new(&mut *file).map_err(|err| zip_error(archive_path, member, err))?;
    let exists = archive.file_names().any(|name| name == member);
    if exists {
        return Err(Error::Conflict(format!(
            "{member} already present in {}",
            archive_path.display()
        )));
    }
    Ok(())
}

fn zip_error(archive_path: &Path, member: &str, err: ZipError) -> Error {
    match err {
        ZipError::FileNotFound => Error::NotFound(format!(
            "{member} in {}",
            archive_path.display()
        )),
        ZipError::Io(err) => Error::Io(err),
        other => Error::Archive {
            path: archive_path.display().to_string(),
            detail: other.to_string(),
        },
    }
}
