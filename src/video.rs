//! Batch video compression through an external encoder (ffmpeg).

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use crate::batch::{run_batch, BatchOutcome, ItemOutcome, ItemProcessor, Position};
use crate::config::{Config, EncoderSettings};
use crate::error::{BatchError, FailureCause};
use crate::report::ReportBuilder;
use crate::scanner::{BatchItem, ScanParams};

pub const REPORT_TITLE: &str = "Video Conversion Report";

/// Diagnostic text kept from the encoder's stderr.
const DIAGNOSTIC_MAX_LINES: usize = 12;
const DIAGNOSTIC_MAX_CHARS: usize = 1500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOptions {
    pub codec: String,
    pub crf: u8,
    pub preset: String,
    pub overwrite: bool,
}

impl From<&EncoderSettings> for EncodeOptions {
    fn from(settings: &EncoderSettings) -> Self {
        Self {
            codec: settings.codec.clone(),
            crf: settings.crf,
            preset: settings.preset.clone(),
            overwrite: true,
        }
    }
}

/// Exit status plus whatever the encoder wrote to stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeStatus {
    pub code: Option<i32>,
    pub diagnostic: String,
}

impl EncodeStatus {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// External encoder collaborator. Blocks until the encode finishes.
pub trait Encoder {
    fn encode(&mut self, input: &Path, output: &Path, options: &EncodeOptions) -> io::Result<EncodeStatus>;
}

/// Runs the ffmpeg binary as a child process.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    /// Use the configured program when it exists, otherwise look for it on `PATH`.
    /// When neither works the configured value is kept and every item will fail
    /// with `NotFound`.
    pub fn locate(settings: &EncoderSettings) -> Self {
        if settings.program.is_file() {
            return Self::new(&settings.program);
        }

        let name = settings
            .program
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("ffmpeg"));

        match which::which(&name) {
            Ok(found) => {
                tracing::debug!("Using encoder found on PATH: {}", found.display());
                Self::new(found)
            }
            Err(err) => {
                tracing::warn!("Encoder {} not found: {}", settings.program.display(), err);
                Self::new(&settings.program)
            }
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(input: &Path, output: &Path, options: &EncodeOptions) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-i".into(),
            input.as_os_str().to_os_string(),
            "-vcodec".into(),
            options.codec.clone().into(),
            "-crf".into(),
            options.crf.to_string().into(),
            "-preset".into(),
            options.preset.clone().into(),
        ];
        if options.overwrite {
            args.push("-y".into());
        } else {
            args.push("-n".into());
        }
        args.push(output.as_os_str().to_os_string());
        args
    }
}

impl Encoder for FfmpegEncoder {
    fn encode(&mut self, input: &Path, output: &Path, options: &EncodeOptions) -> io::Result<EncodeStatus> {
        let args = Self::arguments(input, output, options);
        tracing::debug!("Running {} {:?}", self.program.display(), args);

        let out = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()?;

        Ok(EncodeStatus {
            code: out.status.code(),
            diagnostic: String::from_utf8_lossy(&out.stderr).to_string(),
        })
    }
}

/// Keep the tail of the encoder's stderr: ffmpeg prints the actual error last.
pub fn trim_diagnostic(raw: &str) -> String {
    let lines: Vec<&str> = raw.trim().lines().collect();
    let start = lines.len().saturating_sub(DIAGNOSTIC_MAX_LINES);
    let tail = lines[start..].join("\n");

    let count = tail.chars().count();
    if count <= DIAGNOSTIC_MAX_CHARS {
        return tail;
    }
    let kept: String = tail.chars().skip(count - DIAGNOSTIC_MAX_CHARS).collect();
    format!("...{}", kept)
}

pub struct VideoProcessor<E> {
    encoder: E,
    options: EncodeOptions,
    destination: PathBuf,
    output_extension: String,
}

impl<E: Encoder> VideoProcessor<E> {
    pub fn new(encoder: E, options: EncodeOptions, destination: impl Into<PathBuf>, output_extension: &str) -> Self {
        Self {
            encoder,
            options,
            destination: destination.into(),
            output_extension: output_extension.trim_start_matches('.').to_lowercase(),
        }
    }

    pub fn output_path(&self, item: &BatchItem) -> PathBuf {
        self.destination
            .join(format!("{}.{}", item.stem(), self.output_extension))
    }
}

impl<E: Encoder> ItemProcessor for VideoProcessor<E> {
    fn noun(&self) -> &str {
        "videos"
    }

    fn prepare(&mut self) -> Result<(), BatchError> {
        fs::create_dir_all(&self.destination).map_err(|source| BatchError::CreateDir {
            path: self.destination.clone(),
            source,
        })
    }

    fn process(&mut self, item: &BatchItem, _position: Position) -> ItemOutcome {
        let output = self.output_path(item);
        let output_name = output
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        if same_file(&item.path, &output) {
            let cause = FailureCause::Io("output would overwrite the source file".to_string());
            return failed(item, cause);
        }

        match self.encoder.encode(&item.path, &output, &self.options) {
            Ok(status) if status.success() => {
                ItemOutcome::success(format!("SUCCESS: '{}' -> '{}'", item.name, output_name))
            }
            Ok(status) => {
                let diagnostic = trim_diagnostic(&status.diagnostic);
                tracing::debug!("Encoder diagnostic for {}:\n{}", item.name, diagnostic);
                failed(
                    item,
                    FailureCause::ToolExit {
                        code: status.code,
                        diagnostic,
                    },
                )
            }
            Err(err) => failed(item, FailureCause::from_io(&err)),
        }
    }
}

/// The report line carries the cause; multi-line encoder output is indented under it.
fn failed(item: &BatchItem, cause: FailureCause) -> ItemOutcome {
    let reason = cause.to_string().replace('\n', "\n    ");
    ItemOutcome::failure(
        format!("FAILURE: '{}' could not be converted. Reason: {}", item.name, reason),
        cause,
    )
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Compress every configured video type in `source` into `destination`.
pub fn compress_videos<E: Encoder>(config: &Config, source: &Path, destination: &Path, encoder: E) -> BatchOutcome {
    let settings = &config.encoder;

    let mut report = ReportBuilder::new(REPORT_TITLE);
    report
        .field("Source folder", source.display())
        .field("Destination folder", destination.display())
        .field(
            "Settings",
            format!("codec={}, CRF={}, preset={}", settings.codec, settings.crf, settings.preset),
        );

    let params = ScanParams::new(source).with_filter(config.video_filter());
    let mut processor = VideoProcessor::new(
        encoder,
        EncodeOptions::from(settings),
        destination,
        &settings.output_extension,
    );
    run_batch(&params, &mut processor, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ffmpeg_arguments_follow_fixed_order() {
        let options = EncodeOptions {
            codec: "libx265".to_string(),
            crf: 28,
            preset: "medium".to_string(),
            overwrite: true,
        };
        let args = FfmpegEncoder::arguments(Path::new("in.mov"), Path::new("out/in.mp4"), &options);
        let args: Vec<String> = args.into_iter().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(
            args,
            vec!["-i", "in.mov", "-vcodec", "libx265", "-crf", "28", "-preset", "medium", "-y", "out/in.mp4"]
        );
    }

    #[test]
    fn diagnostic_keeps_the_tail() {
        let raw: String = (1..=30).map(|i| format!("line {}\n", i)).collect();
        let trimmed = trim_diagnostic(&raw);
        assert!(trimmed.starts_with("line 19"));
        assert!(trimmed.ends_with("line 30"));

        let long = "x".repeat(DIAGNOSTIC_MAX_CHARS + 10);
        let trimmed = trim_diagnostic(&long);
        assert!(trimmed.starts_with("..."));
        assert_eq!(trimmed.chars().count(), DIAGNOSTIC_MAX_CHARS + 3);
    }

    #[test]
    fn output_extension_is_forced() {
        struct Never;
        impl Encoder for Never {
            fn encode(&mut self, _: &Path, _: &Path, _: &EncodeOptions) -> io::Result<EncodeStatus> {
                unreachable!()
            }
        }

        let options = EncodeOptions::from(&EncoderSettings::default());
        let processor = VideoProcessor::new(Never, options, "/out", ".MP4");
        let item = BatchItem {
            path: PathBuf::from("/in/clip.MOV"),
            name: "clip.MOV".to_string(),
            extension: "mov".to_string(),
            created: None,
        };
        assert_eq!(processor.output_path(&item), PathBuf::from("/out/clip.mp4"));
    }

    #[test]
    fn missing_encoder_program_is_not_found() {
        struct Missing;
        impl Encoder for Missing {
            fn encode(&mut self, _: &Path, _: &Path, _: &EncodeOptions) -> io::Result<EncodeStatus> {
                Err(io::Error::new(io::ErrorKind::NotFound, "no ffmpeg"))
            }
        }

        let tmp = tempfile::TempDir::new().unwrap();
        let options = EncodeOptions::from(&EncoderSettings::default());
        let mut processor = VideoProcessor::new(Missing, options, tmp.path().join("out"), "mp4");
        let item = BatchItem {
            path: tmp.path().join("a.mov"),
            name: "a.mov".to_string(),
            extension: "mov".to_string(),
            created: None,
        };
        let outcome = processor.process(&item, Position { index: 1, total: 1 });
        assert_eq!(
            outcome,
            ItemOutcome::failure(
                "FAILURE: 'a.mov' could not be converted. Reason: not found",
                FailureCause::NotFound
            )
        );
    }

    #[test]
    fn encoder_output_is_kept_on_the_failure_line() {
        struct Broken;
        impl Encoder for Broken {
            fn encode(&mut self, _: &Path, _: &Path, _: &EncodeOptions) -> io::Result<EncodeStatus> {
                Ok(EncodeStatus {
                    code: Some(1),
                    diagnostic: "Stream #0: unknown codec\nmoov atom not found\n".to_string(),
                })
            }
        }

        let tmp = tempfile::TempDir::new().unwrap();
        let options = EncodeOptions::from(&EncoderSettings::default());
        let mut processor = VideoProcessor::new(Broken, options, tmp.path().join("out"), "mp4");
        let item = BatchItem {
            path: tmp.path().join("b.avi"),
            name: "b.avi".to_string(),
            extension: "avi".to_string(),
            created: None,
        };
        let outcome = processor.process(&item, Position { index: 1, total: 1 });
        assert_eq!(
            outcome.line(),
            "FAILURE: 'b.avi' could not be converted. Reason: external tool exited with status 1: \
             Stream #0: unknown codec\n    moov atom not found"
        );
    }
}
