//! Cache directory archiving
//!
//! The sync engine only needs two capabilities: pack a directory into an
//! archive file and unpack an archive into a directory. `TarGzArchiver`
//! implements them in-process with `tar` and gzip.
//!
//! Extraction sniffs the gzip magic so plain tar archives (as produced by
//! `tar cf`) are accepted as well.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};
use walkdir::WalkDir;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Errors from archive operations
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("failed to compress {dir} into {archive}: {source}")]
    Compress {
        dir: PathBuf,
        archive: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to extract {archive} into {dir}: {source}")]
    Extract {
        archive: PathBuf,
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Directory archiving capability.
pub trait Archiver {
    /// Pack the contents of `dir` into a new archive at `archive`.
    fn compress(&self, dir: &Path, archive: &Path) -> Result<(), ArchiveError>;

    /// Unpack `archive` into `dir`, overwriting existing files.
    fn extract(&self, archive: &Path, dir: &Path) -> Result<(), ArchiveError>;
}

/// gzip-compressed tar archiver.
#[derive(Debug, Clone, Copy)]
pub struct TarGzArchiver {
    level: Compression,
}

impl TarGzArchiver {
    pub fn new() -> Self {
        Self {
            level: Compression::fast(),
        }
    }

    /// Set the gzip level (0-9).
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    fn write_archive(&self, dir: &Path, archive: &Path) -> Result<(), ArchiveError> {
        let compress_err = |source: io::Error| ArchiveError::Compress {
            dir: dir.to_path_buf(),
            archive: archive.to_path_buf(),
            source,
        };

        let file = File::create(archive).map_err(compress_err)?;
        let encoder = GzEncoder::new(BufWriter::new(file), self.level);
        let mut builder = Builder::new(encoder);
        builder.follow_symlinks(false);

        for entry in WalkDir::new(dir)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry?;
            let rel_path = entry
                .path()
                .strip_prefix(dir)
                .map_err(|e| compress_err(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
            builder
                .append_path_with_name(entry.path(), rel_path)
                .map_err(compress_err)?;
        }

        let encoder = builder.into_inner().map_err(compress_err)?;
        let writer = encoder.finish().map_err(compress_err)?;
        writer
            .into_inner()
            .map_err(|e| compress_err(e.into_error()))?
            .sync_all()
            .map_err(compress_err)?;
        Ok(())
    }
}

impl Default for TarGzArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Archiver for TarGzArchiver {
    fn compress(&self, dir: &Path, archive: &Path) -> Result<(), ArchiveError> {
        if !dir.is_dir() {
            return Err(ArchiveError::MissingDirectory(dir.to_path_buf()));
        }

        let result = self.write_archive(dir, archive);
        if result.is_err() {
            let _ = fs::remove_file(archive);
        }
        result
    }

    fn extract(&self, archive: &Path, dir: &Path) -> Result<(), ArchiveError> {
        let extract_err = |source: io::Error| ArchiveError::Extract {
            archive: archive.to_path_buf(),
            dir: dir.to_path_buf(),
            source,
        };

        fs::create_dir_all(dir).map_err(extract_err)?;

        let mut file = File::open(archive).map_err(extract_err)?;
        let mut magic = [0u8; 2];
        let gzipped = match file.read_exact(&mut magic) {
            Ok(()) => magic == GZIP_MAGIC,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => false,
            Err(e) => return Err(extract_err(e)),
        };
        file.seek(SeekFrom::Start(0)).map_err(extract_err)?;

        let reader = BufReader::new(file);
        if gzipped {
            unpack(Archive::new(GzDecoder::new(reader)), dir).map_err(extract_err)
        } else {
            unpack(Archive::new(reader), dir).map_err(extract_err)
        }
    }
}

fn unpack<R: Read>(mut archive: Archive<R>, dir: &Path) -> io::Result<()> {
    archive.set_overwrite(true);
    archive.set_preserve_mtime(true);
    archive.unpack(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populate(dir: &Path) {
        fs::create_dir_all(dir.join("a/b")).unwrap();
        fs::create_dir_all(dir.join("tmp")).unwrap();
        fs::write(dir.join("a/b/obj.o"), b"object code").unwrap();
        fs::write(dir.join("ccache.conf"), "max_size = 5G\n").unwrap();
    }

    #[test]
    fn test_compress_and_extract() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        populate(&source);

        let archive = temp.path().join("g1-ccache.tar.gz");
        let archiver = TarGzArchiver::new();
        archiver.compress(&source, &archive).unwrap();

        let mut magic = [0u8; 2];
        File::open(&archive).unwrap().read_exact(&mut magic).unwrap();
        assert_eq!(magic, GZIP_MAGIC);

        let dest = temp.path().join("dest");
        archiver.extract(&archive, &dest).unwrap();
        assert_eq!(fs::read(dest.join("a/b/obj.o")).unwrap(), b"object code");
        assert_eq!(
            fs::read_to_string(dest.join("ccache.conf")).unwrap(),
            "max_size = 5G\n"
        );
        assert!(dest.join("tmp").is_dir());
    }

    #[test]
    fn test_extract_overwrites_existing_files() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        populate(&source);
        let archive = temp.path().join("g1-ccache.tar.gz");
        let archiver = TarGzArchiver::new();
        archiver.compress(&source, &archive).unwrap();

        let dest = temp.path().join("dest");
        fs::create_dir_all(dest.join("a/b")).unwrap();
        fs::write(dest.join("a/b/obj.o"), b"stale").unwrap();
        fs::write(dest.join("local-only.o"), b"keep me").unwrap();

        archiver.extract(&archive, &dest).unwrap();
        archiver.extract(&archive, &dest).unwrap();

        assert_eq!(fs::read(dest.join("a/b/obj.o")).unwrap(), b"object code");
        assert_eq!(fs::read(dest.join("local-only.o")).unwrap(), b"keep me");
    }

    #[test]
    fn test_extract_plain_tar() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("plain.tar");
        {
            let mut builder = Builder::new(File::create(&archive).unwrap());
            let data = b"plain";
            let mut header = tar::Header::new_gnu();
            header.set_path("x/plain.o").unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, &data[..]).unwrap();
            builder.finish().unwrap();
        }

        let dest = temp.path().join("dest");
        TarGzArchiver::new().extract(&archive, &dest).unwrap();
        assert_eq!(fs::read(dest.join("x/plain.o")).unwrap(), b"plain");
    }

    #[test]
    fn test_compress_missing_directory() {
        let temp = TempDir::new().unwrap();
        let err = TarGzArchiver::new()
            .compress(&temp.path().join("missing"), &temp.path().join("out.tar.gz"))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::MissingDirectory(_)));
        assert!(!temp.path().join("out.tar.gz").exists());
    }

    #[test]
    fn test_extract_corrupt_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bad.tar.gz");
        fs::write(&archive, [0x1f, 0x8b, 0x00, 0x01, 0x02]).unwrap();
        let err = TarGzArchiver::new()
            .extract(&archive, &temp.path().join("dest"))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Extract { .. }));
    }
}
