use crate::error::{ExtractError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Adds single files to zip archives as deflated entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchivePacker;

impl ArchivePacker {
    pub fn new() -> Self {
        Self
    }

    /// Reads `source` into memory and stores it as `name_in_archive`.
    /// An existing archive is extended, otherwise a new one is created.
    /// Returns the number of bytes stored before compression.
    pub fn compress(&self, source: &Path, archive: &Path, name_in_archive: &str) -> Result<u64> {
        let content = fs::read(source).map_err(|e| ExtractError::Archive {
            message: format!("Cannot read {}: {}", source.display(), e),
        })?;

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut writer = if archive.exists() {
            let file = OpenOptions::new().read(true).write(true).open(archive)?;
            ZipWriter::new_append(file)?
        } else {
            if let Some(parent) = archive.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            ZipWriter::new(File::create(archive)?)
        };

        writer.start_file(name_in_archive, options)?;
        writer.write_all(&content)?;
        writer.finish()?;

        debug!(
            source = %source.display(),
            archive = %archive.display(),
            bytes = content.len(),
            "file archived"
        );
        Ok(content.len() as u64)
    }
}
