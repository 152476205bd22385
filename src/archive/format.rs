use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

use derive_more::Display;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

/// Container formats, identified by the archive file name's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ArchiveFormat {
    #[display("tar")]
    Tar,
    #[display("tar.gz")]
    TarGz,
    #[display("tar.zst")]
    TarZst,
}

/// Recognized suffixes, longest first so `.tar.gz` wins over `.tar`.
const SUFFIXES: &[(&str, ArchiveFormat)] = &[
    (".tar.zst", ArchiveFormat::TarZst),
    (".tar.gz", ArchiveFormat::TarGz),
    (".tzst", ArchiveFormat::TarZst),
    (".tgz", ArchiveFormat::TarGz),
    (".tar", ArchiveFormat::Tar),
];

const ZSTD_LEVEL: i32 = 3;

impl ArchiveFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        SUFFIXES
            .iter()
            .find(|(suffix, _)| name.len() > suffix.len() && name.ends_with(suffix))
            .map(|(_, format)| *format)
    }

    /// Canonical extension, without the leading dot
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarZst => "tar.zst",
        }
    }

    pub(super) fn writer(self, file: File) -> io::Result<ArchiveWriter> {
        let file = BufWriter::new(file);
        Ok(match self {
            ArchiveFormat::Tar => ArchiveWriter::Plain(file),
            ArchiveFormat::TarGz => {
                ArchiveWriter::Gzip(GzEncoder::new(file, Compression::default()))
            }
            ArchiveFormat::TarZst => ArchiveWriter::Zstd(zstd::Encoder::new(file, ZSTD_LEVEL)?),
        })
    }

    pub(super) fn reader(self, file: File) -> io::Result<Box<dyn Read>> {
        let file = BufReader::new(file);
        Ok(match self {
            ArchiveFormat::Tar => Box::new(file),
            ArchiveFormat::TarGz => Box::new(GzDecoder::new(file)),
            ArchiveFormat::TarZst => Box::new(zstd::Decoder::with_buffer(file)?),
        })
    }
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim_start_matches('.') {
            "tar" => Ok(ArchiveFormat::Tar),
            "tar.gz" | "tgz" => Ok(ArchiveFormat::TarGz),
            "tar.zst" | "tzst" => Ok(ArchiveFormat::TarZst),
            other => Err(format!("unsupported archive format '{other}'")),
        }
    }
}

/// Compressing sink the tar builder writes into.
pub(super) enum ArchiveWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
    Zstd(zstd::Encoder<'static, BufWriter<File>>),
}

impl ArchiveWriter {
    /// Writes the compression trailer and flushes everything to disk
    pub(super) fn finish(self) -> io::Result<()> {
        let mut file = match self {
            ArchiveWriter::Plain(file) => file,
            ArchiveWriter::Gzip(encoder) => encoder.finish()?,
            ArchiveWriter::Zstd(encoder) => encoder.finish()?,
        };
        file.flush()?;
        file.get_ref().sync_all()
    }
}

impl Write for ArchiveWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ArchiveWriter::Plain(file) => file.write(buf),
            ArchiveWriter::Gzip(encoder) => encoder.write(buf),
            ArchiveWriter::Zstd(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ArchiveWriter::Plain(file) => file.flush(),
            ArchiveWriter::Gzip(encoder) => encoder.flush(),
            ArchiveWriter::Zstd(encoder) => encoder.flush(),
        }
    }
}
