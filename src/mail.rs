//! Report delivery.
//!
//! `Mailer` is the one operation the tasks need: send a plaintext message.
//! `GmailMailer` talks to the Gmail REST API with an OAuth token cached on
//! disk; `ConsoleMailer` just prints, for `--no-mail` runs.

use std::fs;
use std::path::{Path, PathBuf};
use anyhow::Context;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use colored::*;
use dialoguer::{theme::ColorfulTheme, Input};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use crate::colors;
use crate::config::MailSettings;

const GMAIL_SEND_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";
const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const LOOPBACK_REDIRECT: &str = "http://localhost";
/// Refresh a little before the provider's deadline.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// A plaintext message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn new(to: &str, from: &str, subject: &str, body: &str) -> Self {
        Self {
            to: to.to_string(),
            from: from.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }

    /// RFC 822 message with CRLF line endings.
    pub fn to_rfc822(&self) -> String {
        let mut headers = vec![format!("To: {}", self.to)];
        if !self.from.is_empty() {
            headers.push(format!("From: {}", self.from));
        }
        headers.push(format!("Subject: {}", encode_header(&self.subject)));
        headers.push("MIME-Version: 1.0".to_string());
        headers.push("Content-Type: text/plain; charset=\"utf-8\"".to_string());
        headers.push("Content-Transfer-Encoding: 8bit".to_string());

        let body = self.body.replace("\r\n", "\n").replace('\n', "\r\n");
        format!("{}\r\n\r\n{}\r\n", headers.join("\r\n"), body)
    }

    /// URL-safe base64 of the RFC 822 form, as the Gmail API expects in `raw`.
    pub fn encoded(&self) -> String {
        URL_SAFE.encode(self.to_rfc822().as_bytes())
    }
}

/// Non-ASCII subjects go out as an RFC 2047 encoded word.
fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!(
            "=?utf-8?B?{}?=",
            base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
        )
    }
}

#[derive(Error, Debug)]
pub enum MailError {
    #[error("credentials file '{}' not found; download it from the Google Cloud console", .path.display())]
    MissingCredentials { path: PathBuf },

    #[error("mail provider API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("token storage error: {0}")]
    Storage(String),
}

impl MailError {
    pub fn category(&self) -> &'static str {
        match self {
            MailError::MissingCredentials { .. } => "missing-credentials",
            MailError::Api { .. } => "provider-api",
            MailError::Network(_) | MailError::Auth(_) | MailError::Storage(_) => "network/other",
        }
    }
}

impl From<ureq::Error> for MailError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => {
                let message = response
                    .into_string()
                    .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
                MailError::Api { status, message }
            }
            ureq::Error::Transport(transport) => MailError::Network(transport.to_string()),
        }
    }
}

/// Mail-delivery collaborator. Returns the provider's message id.
pub trait Mailer {
    fn send(&mut self, email: &Email) -> Result<String, MailError>;
}

/// Send and print the outcome. Failures are reported and swallowed so the
/// session keeps going. Returns whether the message went out.
pub fn deliver(mailer: &mut dyn Mailer, email: &Email) -> bool {
    println!("{} Sending '{}' to {}...", "📧".cyan(), email.subject, email.to.color(colors::PATH));
    match mailer.send(email) {
        Ok(id) => {
            println!("{} Email sent to '{}'. Message ID: {}", "✅".green(), email.to, id);
            true
        }
        Err(err @ MailError::MissingCredentials { .. }) => {
            println!("{} CONFIGURATION ERROR: {}", "❌".red(), err);
            false
        }
        Err(err @ MailError::Api { .. }) => {
            println!("{} Gmail API error: {}", "❌".red(), err);
            false
        }
        Err(err) => {
            println!("{} Unexpected error while sending the email: {}", "❌".red(), err);
            false
        }
    }
}

/// Prints the message instead of sending it.
#[derive(Debug, Default)]
pub struct ConsoleMailer {
    sent: usize,
}

impl Mailer for ConsoleMailer {
    fn send(&mut self, email: &Email) -> Result<String, MailError> {
        self.sent += 1;
        println!();
        println!("{}", "─".repeat(50).color(colors::PATH));
        println!("To: {}", email.to);
        println!("Subject: {}", email.subject.bold());
        println!();
        println!("{}", email.body);
        println!("{}", "─".repeat(50).color(colors::PATH));
        Ok(format!("console-{}", self.sent))
    }
}

// ─────────────────────────────────────────────────────────────
// Gmail
// ─────────────────────────────────────────────────────────────

/// `installed` (or `web`) section of the client secrets file.
#[derive(Debug, Clone, Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: String,
    #[serde(default = "default_auth_uri")]
    auth_uri: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Token cache persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub client_id: String,
    pub client_secret: String,
    pub token_uri: String,
}

impl StoredToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::seconds(EXPIRY_MARGIN_SECS) < expires_at,
            None => true,
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>, MailError> {
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(path).map_err(|e| MailError::Storage(e.to_string()))?;
        match serde_json::from_str(&data) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                tracing::warn!("Ignoring unreadable token file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create token directory")?;
        }
        let data = serde_json::to_string_pretty(self).context("Failed to serialize token")?;
        fs::write(path, data).with_context(|| format!("Failed to write token file {}", path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

pub struct GmailMailer {
    settings: MailSettings,
    agent: ureq::Agent,
    token: Option<StoredToken>,
}

impl GmailMailer {
    pub fn new(settings: MailSettings) -> Self {
        Self {
            settings,
            agent: ureq::Agent::new(),
            token: None,
        }
    }

    /// A valid access token: cached, refreshed, or freshly authorized.
    fn access_token(&mut self) -> Result<String, MailError> {
        if self.token.is_none() {
            self.token = StoredToken::load(&self.settings.token_file)?;
        }

        let now = Utc::now();
        let token = match self.token.take() {
            Some(token) if token.is_valid_at(now) => token,
            Some(token) if token.refresh_token.is_some() => {
                println!("Refreshing authentication token...");
                self.refresh(token)?
            }
            _ => {
                println!("Starting Google authorization for the first time...");
                self.authorize()?
            }
        };

        if let Err(err) = token.save(&self.settings.token_file) {
            tracing::warn!("{:#}", err);
        } else {
            tracing::debug!("Token saved to {}", self.settings.token_file.display());
        }

        let access = token.access_token.clone();
        self.token = Some(token);
        Ok(access)
    }

    fn refresh(&self, token: StoredToken) -> Result<StoredToken, MailError> {
        let refresh_token = token.refresh_token.clone().unwrap_or_default();
        let response: TokenResponse = self
            .agent
            .post(&token.token_uri)
            .send_form(&[
                ("client_id", token.client_id.as_str()),
                ("client_secret", token.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])?
            .into_json()
            .map_err(|e| MailError::Auth(e.to_string()))?;

        Ok(StoredToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(Some(refresh_token)),
            expires_at: response.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
            ..token
        })
    }

    fn load_secrets(&self) -> Result<ClientSecrets, MailError> {
        let path = &self.settings.credentials_file;
        if !path.exists() {
            return Err(MailError::MissingCredentials { path: path.clone() });
        }
        let data = fs::read_to_string(path).map_err(|e| MailError::Storage(e.to_string()))?;
        let file: ClientSecretsFile =
            serde_json::from_str(&data).map_err(|e| MailError::Auth(format!("bad credentials file: {}", e)))?;
        file.installed
            .or(file.web)
            .ok_or_else(|| MailError::Auth("credentials file has no 'installed' client".to_string()))
    }

    /// Installed-app consent: print the URL, read back the code the browser was
    /// redirected with, exchange it for tokens.
    fn authorize(&self) -> Result<StoredToken, MailError> {
        let secrets = self.load_secrets()?;
        let scopes = self.settings.scopes.join(" ");

        let url = Url::parse_with_params(
            &secrets.auth_uri,
            &[
                ("client_id", secrets.client_id.as_str()),
                ("redirect_uri", LOOPBACK_REDIRECT),
                ("response_type", "code"),
                ("scope", scopes.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| MailError::Auth(format!("bad auth_uri: {}", e)))?;

        println!();
        println!("{} Open this address in your browser and grant access:", "🔑".cyan());
        println!("   {}", url.as_str().color(colors::PATH));
        println!("   The browser ends on a 'localhost' page; copy the 'code' value from its address bar.");

        let pasted: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Authorization code (or the full redirected URL)")
            .interact_text()
            .map_err(|e| MailError::Auth(e.to_string()))?;
        let code = extract_code(&pasted)
            .ok_or_else(|| MailError::Auth("no authorization code was provided".to_string()))?;

        let response: TokenResponse = self
            .agent
            .post(&secrets.token_uri)
            .send_form(&[
                ("code", code.as_str()),
                ("client_id", secrets.client_id.as_str()),
                ("client_secret", secrets.client_secret.as_str()),
                ("redirect_uri", LOOPBACK_REDIRECT),
                ("grant_type", "authorization_code"),
            ])?
            .into_json()
            .map_err(|e| MailError::Auth(e.to_string()))?;

        Ok(StoredToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: response.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
            client_id: secrets.client_id,
            client_secret: secrets.client_secret,
            token_uri: secrets.token_uri,
        })
    }
}

/// Accepts a bare code or a pasted redirect URL containing `code=...`.
pub fn extract_code(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(url) = Url::parse(input) {
        return url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned());
    }
    Some(input.to_string())
}

impl Mailer for GmailMailer {
    fn send(&mut self, email: &Email) -> Result<String, MailError> {
        let token = self.access_token()?;
        tracing::debug!("Posting message '{}' to Gmail", email.subject);

        let response: SendResponse = self
            .agent
            .post(GMAIL_SEND_URL)
            .set("Authorization", &format!("Bearer {}", token))
            .send_json(serde_json::json!({ "raw": email.encoded() }))?
            .into_json()
            .map_err(|e| MailError::Network(e.to_string()))?;

        Ok(response.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rfc822_has_headers_and_crlf_body() {
        let email = Email::new("to@example.com", "from@example.com", "Report", "line 1\nline 2");
        let raw = email.to_rfc822();
        assert!(raw.starts_with("To: to@example.com\r\nFrom: from@example.com\r\nSubject: Report\r\n"));
        assert!(raw.ends_with("\r\n\r\nline 1\r\nline 2\r\n"));
    }

    #[test]
    fn encoded_message_round_trips_through_url_safe_base64() {
        let email = Email::new("a@b.io", "", "Ünïcode", "body");
        let decoded = URL_SAFE.decode(email.encoded()).unwrap();
        let text = String::from_utf8(decoded).unwrap();
        assert!(!text.contains("From:"));
        assert!(text.contains("Subject: =?utf-8?B?"));
    }

    #[test]
    fn token_validity_respects_margin() {
        let now = Utc::now();
        let mut token = StoredToken {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at: Some(now + Duration::seconds(30)),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
        };
        assert!(!token.is_valid_at(now));
        token.expires_at = Some(now + Duration::seconds(3600));
        assert!(token.is_valid_at(now));
        token.expires_at = None;
        assert!(token.is_valid_at(now));
    }

    #[test]
    fn token_file_round_trip_and_garbage_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("token.json");
        assert_eq!(StoredToken::load(&path).unwrap(), None);

        let token = StoredToken {
            access_token: "a".to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: None,
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
        };
        token.save(&path).unwrap();
        assert_eq!(StoredToken::load(&path).unwrap(), Some(token));

        fs::write(&path, "garbage").unwrap();
        assert_eq!(StoredToken::load(&path).unwrap(), None);
    }

    #[test]
    fn missing_credentials_is_reported_before_any_network_call() {
        let tmp = TempDir::new().unwrap();
        let settings = MailSettings {
            credentials_file: tmp.path().join("credentials.json"),
            token_file: tmp.path().join("token.json"),
            scopes: vec!["scope".to_string()],
        };
        let mut mailer = GmailMailer::new(settings);
        let err = mailer
            .send(&Email::new("a@b.io", "c@d.io", "s", "b"))
            .unwrap_err();
        assert!(matches!(err, MailError::MissingCredentials { .. }));
        assert_eq!(err.category(), "missing-credentials");
    }

    #[test]
    fn code_extraction() {
        assert_eq!(extract_code("  4/abc  "), Some("4/abc".to_string()));
        assert_eq!(
            extract_code("http://localhost/?state=x&code=4%2Fxyz&scope=s"),
            Some("4/xyz".to_string())
        );
        assert_eq!(extract_code("http://localhost/?error=access_denied"), None);
        assert_eq!(extract_code(""), None);
    }

    #[test]
    fn deliver_swallows_failures() {
        struct Broken;
        impl Mailer for Broken {
            fn send(&mut self, _: &Email) -> Result<String, MailError> {
                Err(MailError::Network("offline".to_string()))
            }
        }
        assert!(!deliver(&mut Broken, &Email::new("a@b.io", "", "s", "b")));
        assert!(deliver(&mut ConsoleMailer::default(), &Email::new("a@b.io", "", "s", "b")));
    }
}
