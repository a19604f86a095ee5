use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive already finished")]
    Finished,
}

pub trait ArtifactSink {
    /// Store one artifact; returns where it went (a path, or the entry name).
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<String, PackageError>;

    /// Flush anything buffered. Further `put`s may fail afterwards.
    fn finish(&mut self) -> Result<(), PackageError> {
        Ok(())
    }
}

pub struct DirSink {
    dir: PathBuf,
}

impl DirSink {
    pub fn create(dir: &Path) -> Result<Self, PackageError> {
        std::fs::create_dir_all(dir).map_err(|source| PackageError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }
}

impl ArtifactSink for DirSink {
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<String, PackageError> {
        let path = self.dir.join(name);
        std::fs::write(&path, bytes).map_err(|source| PackageError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path.display().to_string())
    }
}

pub struct ZipSink {
    path: PathBuf,
    writer: Option<ZipWriter<File>>,
}

impl ZipSink {
    pub fn create(path: &Path) -> Result<Self, PackageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| PackageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = File::create(path).map_err(|source| PackageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(ZipWriter::new(file)),
        })
    }
}

impl ArtifactSink for ZipSink {
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<String, PackageError> {
        let writer = self.writer.as_mut().ok_or(PackageError::Finished)?;
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        writer.start_file(name, options)?;
        writer.write_all(bytes).map_err(|source| PackageError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(name.to_string())
    }

    fn finish(&mut self) -> Result<(), PackageError> {
        if let Some(writer) = self.writer.take() {
            writer.finish()?;
            log::info!("wrote {}", self.path.display());
        }
        Ok(())
    }
}

/// Directory sink for a plain path, zip sink for a `.zip` path.
pub fn sink_for(output: &Path) -> Result<Box<dyn ArtifactSink>, PackageError> {
    let is_zip = output
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if is_zip {
        Ok(Box::new(ZipSink::create(output)?))
    } else {
        Ok(Box::new(DirSink::create(output)?))
    }
}
