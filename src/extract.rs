// src/extract.rs

//! Archive extraction
//!
//! Downloaded sources are tarballs in one of a few compressions, selected by
//! filename suffix. Extraction always targets a cache staging directory, so
//! a partially extracted archive never becomes visible.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::info;
use xz2::read::XzDecoder;

use crate::error::{Error, Result};

/// Unpacks one archive into a directory
pub trait Extractor {
    fn extract(&self, archive: &Path, out_dir: &Path) -> Result<()>;
}

/// Extractor for tar archives, plain or compressed with gzip, xz or zstd
#[derive(Debug, Default)]
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    fn open(path: &Path) -> Result<Archive<Box<dyn Read>>> {
        let name = path.to_string_lossy();
        let file = File::open(path)?;

        let reader: Box<dyn Read> = if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Box::new(GzDecoder::new(file))
        } else if name.ends_with(".tar.xz") {
            Box::new(XzDecoder::new(file))
        } else if name.ends_with(".tar.zst") {
            let decoder = zstd::Decoder::new(file)
                .map_err(|e| Error::Download(format!("failed to create zstd decoder: {}", e)))?;
            Box::new(decoder)
        } else if name.ends_with(".tar") {
            Box::new(file)
        } else {
            return Err(Error::UnsupportedArchive(path.to_path_buf()));
        };

        Ok(Archive::new(reader))
    }
}

impl Extractor for ArchiveExtractor {
    fn extract(&self, archive: &Path, out_dir: &Path) -> Result<()> {
        info!("extracting {} to {}", archive.display(), out_dir.display());
        Self::open(archive)?.unpack(out_dir)?;
        Ok(())
    }
}
