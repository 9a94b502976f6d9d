use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use chrono::{DateTime, Utc};
use walkdir::WalkDir;
use crate::error::BatchError;

/// One file picked up by a scan. Never mutated after `scan` returns.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub path: PathBuf,
    pub name: String,
    /// Lower-cased, without the leading dot. Empty when the file has none.
    pub extension: String,
    /// Ordering key, read once at scan time. Only set when ordering was requested.
    pub created: Option<DateTime<Utc>>,
}

impl BatchItem {
    /// File name without its extension.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }

    /// Extension with a leading dot, or an empty string.
    pub fn dotted_extension(&self) -> String {
        if self.extension.is_empty() {
            String::new()
        } else {
            format!(".{}", self.extension)
        }
    }
}

/// Case-insensitive set of accepted extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    extensions: BTreeSet<String>,
}

impl ExtensionFilter {
    /// Accepts `"jpg"`, `".JPG"` and friends; all are stored as `jpg`.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    pub fn matches(&self, extension: &str) -> bool {
        self.extensions.contains(&normalize_extension(extension))
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Key used to order scanned items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    /// Creation time where the platform records it, otherwise last modification.
    Created,
    Modified,
}

impl OrderBy {
    fn read(&self, metadata: &fs::Metadata) -> Option<DateTime<Utc>> {
        let time: Option<SystemTime> = match self {
            OrderBy::Created => metadata.created().or_else(|_| metadata.modified()).ok(),
            OrderBy::Modified => metadata.modified().ok(),
        };
        time.map(DateTime::<Utc>::from)
    }
}

/// What to scan and how to filter/order it.
#[derive(Debug, Clone)]
pub struct ScanParams {
    pub directory: PathBuf,
    pub filter: Option<ExtensionFilter>,
    pub order_by: Option<OrderBy>,
}

impl ScanParams {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            filter: None,
            order_by: None,
        }
    }

    pub fn with_filter(mut self, filter: ExtensionFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn ordered_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }
}

/// List the direct children of `params.directory` that are files and match
/// the filter, optionally sorted ascending by the ordering key.
///
/// Scan order is file-name order, so items with equal keys keep a
/// deterministic relative position (the sort is stable).
pub fn scan(params: &ScanParams) -> Result<Vec<BatchItem>, BatchError> {
    let directory = &params.directory;
    if !directory.is_dir() {
        return Err(BatchError::DirectoryNotFound {
            path: directory.clone(),
        });
    }

    let walker = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    let mut items = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "walk error"));
                return Err(BatchError::ReadDir {
                    path: directory.clone(),
                    source,
                });
            }
            Err(err) => {
                tracing::warn!("Skipping unreadable entry: {}", err);
                continue;
            }
        };

        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let extension = extension_of(path);
        if let Some(filter) = &params.filter {
            if !filter.matches(&extension) {
                continue;
            }
        }

        let created = match params.order_by {
            Some(order) => match fs::metadata(path) {
                Ok(metadata) => order.read(&metadata),
                Err(err) => {
                    tracing::warn!("Cannot read metadata for {}: {}", path.display(), err);
                    None
                }
            },
            None => None,
        };

        items.push(BatchItem {
            path: path.to_path_buf(),
            name: entry.file_name().to_string_lossy().to_string(),
            extension,
            created,
        });
    }

    if params.order_by.is_some() {
        items.sort_by_key(|item| item.created);
    }

    tracing::debug!("Scanned {}: {} matching files", directory.display(), items.len());
    Ok(items)
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}
