use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use dirs;
use anyhow::{Result, Context};
use dialoguer::{theme::ColorfulTheme, Input};
use regex::Regex;
use colored::*;
use crate::colors;
use crate::scanner::ExtensionFilter;

const CONFIG_FILE_NAME: &str = ".batchdesk.json";
const APP_DIR_NAME: &str = ".batchdesk";
const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp", "heic", "avif",
];
pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];

/// Settings every task reads. Loaded once per session and passed explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where task reports are mailed
    pub recipient: String,
    /// Must match the authenticated mail account
    pub sender: String,

    pub image_extensions: Vec<String>,
    pub video_extensions: Vec<String>,

    pub encoder: EncoderSettings,
    pub mail: MailSettings,
    pub cleanup: CleanupSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    pub program: PathBuf,
    pub codec: String,
    pub crf: u8,
    pub preset: String,
    pub output_extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    /// OAuth client secrets downloaded from the Google Cloud console
    pub credentials_file: PathBuf,
    /// Cached access/refresh token, written after the first authorization
    pub token_file: PathBuf,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupSettings {
    /// Services stopped around the update-cache purge
    pub services: Vec<String>,
    pub service_settle_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recipient: String::new(),
            sender: String::new(),
            image_extensions: DEFAULT_IMAGE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            video_extensions: DEFAULT_VIDEO_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            encoder: EncoderSettings::default(),
            mail: MailSettings::default(),
            cleanup: CleanupSettings::default(),
        }
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        let program = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };
        Self {
            program: PathBuf::from(program),
            codec: "libx265".to_string(),
            crf: 28,
            preset: "medium".to_string(),
            output_extension: "mp4".to_string(),
        }
    }
}

impl Default for MailSettings {
    fn default() -> Self {
        let dir = app_dir();
        Self {
            credentials_file: dir.join("credentials.json"),
            token_file: dir.join("token.json"),
            scopes: vec!["https://www.googleapis.com/auth/gmail.send".to_string()],
        }
    }
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            services: vec!["wuauserv".to_string(), "bits".to_string()],
            service_settle_secs: 2,
        }
    }
}

/// `~/.batchdesk`, or `./.batchdesk` when no home directory is known.
pub fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Loose syntactic check of an email address.
pub fn is_valid_email(email: &str) -> bool {
    Regex::new(EMAIL_PATTERN)
        .map(|re| re.is_match(email.trim()))
        .unwrap_or(false)
}

impl Config {
    /// Get the path to the config file
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .context("Could not find home directory")?;
        Ok(home.join(CONFIG_FILE_NAME))
    }

    /// Get the path to the config backup file
    pub fn backup_path(path: &Path) -> PathBuf {
        path.with_extension("json.backup")
    }

    pub fn image_filter(&self) -> ExtensionFilter {
        ExtensionFilter::new(&self.image_extensions)
    }

    pub fn video_filter(&self) -> ExtensionFilter {
        ExtensionFilter::new(&self.video_extensions)
    }

    /// Load config from `path`. `Ok(None)` when the file does not exist yet.
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        match serde_json::from_str(&data) {
            Ok(config) => Ok(Some(config)),
            Err(e) => {
                // Config is corrupted, try backup
                eprintln!("{} Config corrupted, trying backup...", "⚠️".yellow());
                if let Ok(backup) = Self::load_backup(path) {
                    eprintln!("{} Restored from backup", "✅".green());
                    return Ok(Some(backup));
                }
                Err(anyhow::Error::new(e).context(format!("Failed to parse config file {}", path.display())))
            }
        }
    }

    /// Load config, or run the first-time wizard and save the result.
    pub fn load_or_setup(path: &Path) -> Result<Self> {
        if let Some(config) = Self::load_from(path)? {
            return Ok(config);
        }

        println!("{}", "=".repeat(60).color(colors::HEADER));
        println!("{}", "   🧰 BATCHDESK - FIRST TIME SETUP   ".bold());
        println!("{}", "=".repeat(60).color(colors::HEADER));
        println!();

        let config = Self::run_first_time_wizard()?;
        config.save_to(path)?;

        println!();
        println!("{} Setup complete! Your preferences are saved to {}", "✅".green(), path.display());
        println!();

        Ok(config)
    }

    fn load_backup(path: &Path) -> Result<Self> {
        let backup_path = Self::backup_path(path);
        if backup_path.exists() {
            let data = fs::read_to_string(&backup_path)
                .context("Failed to read backup file")?;
            serde_json::from_str(&data).context("Failed to parse backup file")
        } else {
            Err(anyhow::anyhow!("No backup file found"))
        }
    }

    /// Save config to disk with backup
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let backup_path = Self::backup_path(path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
        }

        // Create backup of existing config if it exists
        if path.exists() {
            fs::copy(path, &backup_path)
                .context("Failed to create backup")?;
        }

        // Write to temp file first
        let temp_path = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(self)
            .context("Failed to serialize config")?;
        fs::write(&temp_path, &data)
            .context("Failed to write temp config")?;

        // Atomically rename temp file to final location
        fs::rename(&temp_path, path)
            .context("Failed to finalize config")?;

        Ok(())
    }

    fn run_first_time_wizard() -> Result<Self> {
        let theme = ColorfulTheme::default();

        println!("{}", "1. REPORT RECIPIENT".bold());
        let recipient = prompt_email(&theme, "Email address that should receive task reports")?;
        println!("{} '{}' registered. Task reports will be sent there.", "✅".green(), recipient);
        println!();

        println!("{}", "2. SENDER ACCOUNT".bold());
        println!("The Gmail account you will authorize to send reports.");
        let sender = prompt_email(&theme, "Sender address")?;
        println!();

        println!(
            "{} Place your OAuth client file at {}",
            "💡".cyan(),
            MailSettings::default().credentials_file.display().to_string().color(colors::PATH)
        );

        Ok(Config {
            recipient,
            sender,
            ..Config::default()
        })
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("{}", "🔧 CURRENT CONFIGURATION".bold().color(colors::HEADER));
        println!();

        println!("{} Report recipient: {}", "•".cyan(), or_unset(&self.recipient));
        println!("{} Sender: {}", "•".cyan(), or_unset(&self.sender));
        println!("{} Image extensions: {}", "•".cyan(), self.image_extensions.join(", "));
        println!("{} Video extensions: {}", "•".cyan(), self.video_extensions.join(", "));

        println!();
        println!("{} Encoder: {}", "•".cyan(), self.encoder.program.display());
        println!("  - codec {}, CRF {}, preset {}, output .{}",
            self.encoder.codec, self.encoder.crf, self.encoder.preset, self.encoder.output_extension);

        println!();
        println!("{} Mail credentials: {}", "•".cyan(), self.mail.credentials_file.display());
        println!("{} Mail token: {}", "•".cyan(), self.mail.token_file.display());

        println!();
        println!("{} Update services: {}", "•".cyan(), self.cleanup.services.join(", "));
    }
}

fn or_unset(value: &str) -> String {
    if value.is_empty() {
        "(not set)".dimmed().to_string()
    } else {
        value.to_string()
    }
}

/// Ask until the user types something that looks like an email address.
pub fn prompt_email(theme: &ColorfulTheme, prompt: &str) -> Result<String> {
    let email: String = Input::with_theme(theme)
        .with_prompt(prompt)
        .validate_with(|input: &String| -> std::result::Result<(), &str> {
            if is_valid_email(input) {
                Ok(())
            } else {
                Err("Invalid email format, e.g. user@domain.com")
            }
        })
        .interact_text()?;
    Ok(email.trim().to_string())
}
