//! Sequential rename of images by creation date.
//!
//! Every matching image in a folder is moved into `<folder>/<prefix>/` as
//! `<prefix>_NNN.<ext>`, numbered in ascending creation order.

use std::fs;
use std::path::{Path, PathBuf};
use fs_extra::error::ErrorKind as MoveErrorKind;
use fs_extra::file::{move_file, CopyOptions};
use crate::batch::{run_batch, BatchOutcome, ItemOutcome, ItemProcessor, Position};
use crate::config::Config;
use crate::error::{BatchError, FailureCause};
use crate::report::ReportBuilder;
use crate::scanner::{BatchItem, OrderBy, ScanParams};

pub const REPORT_TITLE: &str = "Image Rename Report";

/// Minimum digits in the sequence number.
pub const MIN_INDEX_WIDTH: usize = 3;

const FORBIDDEN_PREFIX_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Zero-padded sequence number. Width is three digits, grown just enough to
/// fit `total` so large batches still sort correctly.
pub fn padded_index(index: usize, total: usize) -> String {
    let width = total.to_string().len().max(MIN_INDEX_WIDTH);
    format!("{:0width$}", index, width = width)
}

pub struct RenameProcessor {
    prefix: String,
    destination: PathBuf,
}

impl RenameProcessor {
    pub fn new(prefix: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            destination: destination.into(),
        }
    }

    pub fn target_name(&self, item: &BatchItem, position: Position) -> String {
        format!(
            "{}_{}{}",
            self.prefix,
            padded_index(position.index, position.total),
            item.dotted_extension()
        )
    }
}

impl ItemProcessor for RenameProcessor {
    fn noun(&self) -> &str {
        "images"
    }

    fn prepare(&mut self) -> Result<(), BatchError> {
        fs::create_dir_all(&self.destination).map_err(|source| BatchError::CreateDir {
            path: self.destination.clone(),
            source,
        })
    }

    fn process(&mut self, item: &BatchItem, position: Position) -> ItemOutcome {
        let new_name = self.target_name(item, position);
        let target = self.destination.join(&new_name);
        let change = format!("   '{}' -> '{}'", item.name, new_name);

        // Never clobber a file left by an earlier run.
        if target.exists() {
            return ItemOutcome::failure(
                format!("{} FAILED: {}", change, FailureCause::AlreadyExists),
                FailureCause::AlreadyExists,
            );
        }

        match move_item(&item.path, &target) {
            Ok(()) => ItemOutcome::success(change),
            Err(cause) => ItemOutcome::failure(format!("{} FAILED: {}", change, cause), cause),
        }
    }
}

// EXDEV / ERROR_NOT_SAME_DEVICE
#[cfg(windows)]
const CROSS_DEVICE_OS_ERROR: i32 = 17;
#[cfg(not(windows))]
const CROSS_DEVICE_OS_ERROR: i32 = 18;

/// Rename in place; only a move to another volume falls back to copy and
/// delete. A failed fallback leaves no partial copy behind.
fn move_item(source: &Path, target: &Path) -> Result<(), FailureCause> {
    let err = match fs::rename(source, target) {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    if err.raw_os_error() != Some(CROSS_DEVICE_OS_ERROR) {
        return Err(FailureCause::from_io(&err));
    }

    tracing::debug!("{} is on another volume, copying instead", target.display());
    match move_file(source, target, &CopyOptions::new()) {
        Ok(_) => Ok(()),
        Err(err) => {
            let clashed = matches!(err.kind, MoveErrorKind::AlreadyExists);
            if !clashed && source.exists() && target.exists() {
                if let Err(cleanup) = fs::remove_file(target) {
                    tracing::warn!("Could not remove partial copy {}: {}", target.display(), cleanup);
                }
            }
            Err(match err.kind {
                MoveErrorKind::NotFound => FailureCause::NotFound,
                MoveErrorKind::PermissionDenied => FailureCause::PermissionDenied,
                MoveErrorKind::AlreadyExists => FailureCause::AlreadyExists,
                MoveErrorKind::Io(ref io) => FailureCause::from_io(io),
                _ => FailureCause::Io(err.to_string()),
            })
        }
    }
}

/// Checks the prefix is usable both as a folder name and as a file-name stem.
pub fn validate_prefix(prefix: &str) -> Result<&str, BatchError> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(BatchError::InvalidInput("no prefix was provided".to_string()));
    }
    if prefix.contains(FORBIDDEN_PREFIX_CHARS) || prefix == "." || prefix == ".." {
        return Err(BatchError::InvalidInput(format!(
            "prefix '{}' contains characters not allowed in file names",
            prefix
        )));
    }
    Ok(prefix)
}

/// Rename every configured image type in `folder` using `prefix`.
pub fn rename_images(config: &Config, folder: &Path, prefix: &str) -> BatchOutcome {
    let prefix = match validate_prefix(prefix) {
        Ok(prefix) => prefix,
        Err(err) => return BatchOutcome::Cancelled(format!("Operation cancelled: {}", err)),
    };

    let destination = folder.join(prefix);

    let mut report = ReportBuilder::new(REPORT_TITLE);
    report
        .field("Folder analysed", folder.display())
        .field("Prefix used", format!("'{}'", prefix))
        .field("Destination folder", destination.display());

    let params = ScanParams::new(folder)
        .with_filter(config.image_filter())
        .ordered_by(OrderBy::Created);

    let mut processor = RenameProcessor::new(prefix, destination);
    run_batch(&params, &mut processor, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn item(name: &str, ext: &str) -> BatchItem {
        BatchItem {
            path: PathBuf::from(name),
            name: name.to_string(),
            extension: ext.to_string(),
            created: None,
        }
    }

    #[test]
    fn padding_is_three_digits_until_it_must_grow() {
        assert_eq!(padded_index(1, 2), "001");
        assert_eq!(padded_index(42, 999), "042");
        assert_eq!(padded_index(7, 1000), "0007");
        assert_eq!(padded_index(1000, 1000), "1000");
    }

    #[test]
    fn target_name_lowercases_extension() {
        let processor = RenameProcessor::new("Trip", "/tmp/Trip");
        let name = processor.target_name(&item("IMG.JPG", "jpg"), Position { index: 2, total: 5 });
        assert_eq!(name, "Trip_002.jpg");
    }

    #[test]
    fn prefix_validation() {
        assert_eq!(validate_prefix("  Trip  ").unwrap(), "Trip");
        assert!(validate_prefix("   ").is_err());
        assert!(validate_prefix("a/b").is_err());
        assert!(validate_prefix("..").is_err());
    }

    #[test]
    fn existing_target_is_a_failure_and_source_is_kept() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("Trip");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("Trip_001.jpg"), b"old").unwrap();
        let source = tmp.path().join("a.jpg");
        fs::write(&source, b"new").unwrap();

        let mut processor = RenameProcessor::new("Trip", &dest);
        let scanned = BatchItem {
            path: source.clone(),
            name: "a.jpg".to_string(),
            extension: "jpg".to_string(),
            created: None,
        };
        let outcome = processor.process(&scanned, Position { index: 1, total: 1 });

        assert_eq!(
            outcome,
            ItemOutcome::failure(
                "   'a.jpg' -> 'Trip_001.jpg' FAILED: already exists at destination",
                FailureCause::AlreadyExists
            )
        );
        assert!(source.exists());
        assert_eq!(fs::read(dest.join("Trip_001.jpg")).unwrap(), b"old");
    }

    #[test]
    fn empty_prefix_cancels_without_touching_disk() {
        let tmp = TempDir::new().unwrap();
        let outcome = rename_images(&Config::default(), tmp.path(), " ");
        assert_eq!(outcome.render(), "Operation cancelled: Invalid input: no prefix was provided");
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
