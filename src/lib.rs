//! batchdesk - desktop batch jobs with mailed plain-text reports

pub mod error;
pub mod logging;
pub mod config;
pub mod report;
pub mod scanner;
pub mod batch;
pub mod rename;
pub mod video;
pub mod cleanup;
pub mod mail;
pub mod session;
pub mod cli;

// Re-exports for easy access
pub use error::{BatchError, FailureCause};
pub use config::{Config, EncoderSettings, MailSettings, CleanupSettings};
pub use report::{ReportBuilder, SessionReport};
pub use scanner::{BatchItem, ExtensionFilter, OrderBy, ScanParams};
pub use batch::{run_batch, BatchOutcome, BatchResult, ItemOutcome, ItemProcessor, Position};
pub use rename::rename_images;
pub use video::{compress_videos, Encoder, EncodeOptions, EncodeStatus, FfmpegEncoder};
pub use cleanup::{purge_directory, Cleaner, CleanupTarget, PurgeOutcome, ServiceControl, TargetRoots};
pub use mail::{ConsoleMailer, Email, GmailMailer, MailError, Mailer};
pub use session::Session;
pub use cli::{Cli, Commands};

pub mod colors {
    use colored::Color;

    pub const SUCCESS: Color = Color::TrueColor { r: 77, g: 255, b: 157 };
    pub const HEADER: Color = Color::TrueColor { r: 157, g: 77, b: 255 };
    pub const PATH: Color = Color::TrueColor { r: 77, g: 195, b: 255 };
    pub const WARNING: Color = Color::TrueColor { r: 255, g: 217, b: 61 };
}

/// Current version of batchdesk
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
