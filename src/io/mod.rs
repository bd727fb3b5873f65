//! Export of image collections to directories of files.
//!
//! Every export writes into a fresh directory whose parent already exists.
//! Elements are written one file each, named `{prefix}-{index:05}.{ext}`,
//! where `index` is the element's position in the collection. Distributed
//! collections write from inside their partitions.

pub mod writers;

use crate::collection::images::Images;
use crate::core::config::ExportConfig;
use crate::core::error::{Error, ExportError, ExportResult, Result};
use crate::core::store::ElementStore;
use crate::core::types::Element;
use ndarray::{ArrayViewD, Axis};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// 8-bit PNG.
    Png,
    /// 16-bit TIFF.
    Tiff,
    /// Raw little-endian `f64`.
    Binary,
}

impl ExportFormat {
    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Tiff => "tif",
            ExportFormat::Binary => "bin",
        }
    }

    /// Format name used in errors.
    pub fn name(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Tiff => "tiff",
            ExportFormat::Binary => "binary",
        }
    }

    /// Check that elements of `dims` can be written in this format.
    pub fn check(self, dims: &[usize]) -> ExportResult<()> {
        match self {
            ExportFormat::Binary => Ok(()),
            _ if writers::is_raster(dims) => Ok(()),
            _ => Err(ExportError::UnsupportedDims {
                dims: dims.to_vec(),
                format: self.name(),
            }),
        }
    }

    fn write(self, element: ArrayViewD<'_, f64>, path: &Path) -> ExportResult<()> {
        match self {
            ExportFormat::Png => writers::write_png(element, path),
            ExportFormat::Tiff => writers::write_tiff(element, path),
            ExportFormat::Binary => writers::write_binary(element, path),
        }
    }
}

/// Export options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// File name prefix.
    pub prefix: String,
    /// Replace an existing output directory.
    pub overwrite: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            prefix: "image".to_string(),
            overwrite: false,
        }
    }
}

impl ExportOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the file name prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Allow replacing an existing directory.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Path of the file for element `index`.
    pub fn file_path(&self, directory: &Path, index: usize, format: ExportFormat) -> PathBuf {
        directory.join(format!(
            "{}-{:05}.{}",
            self.prefix,
            index,
            format.extension()
        ))
    }
}

impl From<&ExportConfig> for ExportOptions {
    fn from(config: &ExportConfig) -> Self {
        Self {
            prefix: config.prefix.clone(),
            overwrite: config.overwrite,
        }
    }
}

/// Create the output directory.
///
/// `path` must sit directly below an existing directory. An existing `path`
/// is removed first when `overwrite` is set and rejected otherwise.
pub fn prepare_directory(path: &Path, overwrite: bool) -> ExportResult<()> {
    let placed = match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => true,
        Some(parent) => parent.is_dir(),
        None => false,
    };
    if !placed {
        return Err(ExportError::DirectoryPlacement {
            path: path.to_path_buf(),
        });
    }

    if path.exists() {
        if !overwrite {
            return Err(ExportError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        log::debug!("Replacing existing output {}", path.display());
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
    }

    fs::create_dir(path)?;
    Ok(())
}

pub(crate) fn export(
    images: &Images,
    path: &Path,
    format: ExportFormat,
    options: &ExportOptions,
) -> Result<()> {
    format.check(images.dims())?;
    prepare_directory(path, options.overwrite)?;

    let written = match images.store() {
        ElementStore::Local(values) => {
            for (index, element) in values.axis_iter(Axis(0)).enumerate() {
                format.write(element, &options.file_path(path, index, format))?;
            }
            values.len_of(Axis(0))
        }
        ElementStore::Distributed(records) => {
            // keys may be sparse after filtering; files are numbered by rank
            let mut keys: Vec<usize> = records
                .run_partitions(|records| {
                    Ok(records.into_iter().map(|(k, _)| k).collect::<Vec<_>>())
                })?
                .concat();
            keys.sort_unstable();
            let ranks: HashMap<usize, usize> =
                keys.iter().enumerate().map(|(rank, key)| (*key, rank)).collect();

            records.try_for_each(|key, element: Element| {
                let index = ranks.get(&key).copied().unwrap_or(key);
                format
                    .write(element.view(), &options.file_path(path, index, format))
                    .map_err(Error::from)
            })?;
            keys.len()
        }
    };

    if format == ExportFormat::Binary {
        writers::write_binary_conf(path, images.dims())?;
    }

    log::debug!(
        "Wrote {} {} files to {}",
        written,
        format.name(),
        path.display()
    );
    Ok(())
}
