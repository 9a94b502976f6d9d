//! Interactive menu and the error boundary around every task.
//!
//! Tasks return report text; the session mails it. Anything that escapes a
//! task as an error is printed, mailed as a failure notice and the menu
//! carries on.

use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use crate::batch::BatchOutcome;
use crate::cleanup::{Cleaner, CleanupTarget, NetServiceControl, ServiceControl, TargetRoots};
use crate::colors;
use crate::config::Config;
use crate::error::BatchError;
use crate::mail::{deliver, Email, MailError, Mailer};
use crate::report::SessionReport;
use crate::{rename, video};

pub const CLEANUP_REPORT_TITLE: &str = "System Cleanup Report";
pub const TEST_MAIL_SUBJECT: &str = "Test Email";
pub const FAILURE_SUBJECT: &str = "CRITICAL ERROR in automation app";

/// Strip whitespace and one pair of surrounding quotes, as left behind by
/// dragging a folder into the console.
pub fn clean_path_input(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| {
            trimmed
                .strip_prefix(*q)
                .and_then(|rest| rest.strip_suffix(*q))
        })
        .unwrap_or(trimmed);
    PathBuf::from(unquoted.trim())
}

/// Coarse category of an error escaping a task, for the failure notice.
pub fn error_category(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if let Some(mail) = cause.downcast_ref::<MailError>() {
            return mail.category();
        }
        if cause.downcast_ref::<BatchError>().is_some() {
            return "batch";
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return "io";
        }
        if cause.downcast_ref::<dialoguer::Error>().is_some() {
            return "console";
        }
    }
    "unexpected"
}

pub fn failure_notice(action: &str, err: &anyhow::Error) -> String {
    format!(
        "The application hit a serious error while running '{}'.\n\n\
         The task could not be completed.\n\n\
         Technical detail:\n{}: {:#}",
        action,
        error_category(err),
        err
    )
}

pub fn test_mail_body(recipient: &str) -> String {
    format!(
        "Hello,\n\nThis is a test email to check that delivery to your address ('{}') works.\n\n\
         The test was a success!",
        recipient
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuChoice {
    Compress,
    Rename,
    Cleanup,
    TestMail,
    Exit,
}

const MENU: &[(MenuChoice, &str)] = &[
    (MenuChoice::Compress, "🎬 Compress the videos in a folder"),
    (MenuChoice::Rename, "🖼️  Rename images by date"),
    (MenuChoice::Cleanup, "🧹 System cleanup utilities"),
    (MenuChoice::TestMail, "📧 Send a test email"),
    (MenuChoice::Exit, "🚪 Exit"),
];

/// One user session: settings, a mail collaborator and a service controller.
pub struct Session<S: ServiceControl = NetServiceControl> {
    config: Config,
    mailer: Box<dyn Mailer>,
    cleaner: Cleaner<S>,
    theme: ColorfulTheme,
}

impl Session<NetServiceControl> {
    pub fn new(config: Config, mailer: Box<dyn Mailer>) -> Self {
        let cleaner = Cleaner::new(NetServiceControl, TargetRoots::detect(), &config.cleanup);
        Self::with_cleaner(config, mailer, cleaner)
    }
}

impl<S: ServiceControl> Session<S> {
    pub fn with_cleaner(config: Config, mailer: Box<dyn Mailer>, cleaner: Cleaner<S>) -> Self {
        Self {
            config,
            mailer,
            cleaner,
            theme: ColorfulTheme::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Send `body` to the configured recipient. Never fails.
    pub fn send(&mut self, subject: &str, body: &str) -> bool {
        let email = Email::new(&self.config.recipient, &self.config.sender, subject, body);
        deliver(self.mailer.as_mut(), &email)
    }

    /// Run one task behind the error boundary. Returns whether it finished.
    pub fn guarded<F>(&mut self, action: &str, task: F) -> bool
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        match task(self) {
            Ok(()) => true,
            Err(err) => {
                println!();
                println!("{}", "🔥 AN UNEXPECTED ERROR OCCURRED".bold().red());
                println!("   While running: {}", action);
                println!("   Detail: {:#}", err);
                tracing::error!("{} failed: {:?}", action, err);

                println!("{} Trying to send an error notification...", "📧".cyan());
                let notice = failure_notice(action, &err);
                self.send(FAILURE_SUBJECT, &notice);
                false
            }
        }
    }

    fn mail_outcome(&mut self, subject: &str, outcome: &BatchOutcome) {
        println!();
        println!("{}", "--- Task finished. Sending the report by email... ---".color(colors::HEADER));
        self.send(subject, &outcome.render());
    }

    pub fn compress(&mut self, source: &Path, destination: &Path) -> Result<()> {
        let encoder = video::FfmpegEncoder::locate(&self.config.encoder);
        let outcome = video::compress_videos(&self.config, source, destination, encoder);
        self.mail_outcome(video::REPORT_TITLE, &outcome);
        Ok(())
    }

    pub fn rename(&mut self, folder: &Path, prefix: &str) -> Result<()> {
        let outcome = rename::rename_images(&self.config, folder, prefix);
        self.mail_outcome(rename::REPORT_TITLE, &outcome);
        Ok(())
    }

    /// Purge one target, or every target when `None`, and mail the report.
    pub fn clean(&mut self, target: Option<CleanupTarget>) -> Result<()> {
        let mut report = SessionReport::new(CLEANUP_REPORT_TITLE);
        match target {
            Some(target) => report.record(self.cleaner.run(target)),
            None => report.record(self.cleaner.run_all()),
        }
        self.mail_session(report);
        Ok(())
    }

    fn mail_session(&mut self, report: SessionReport) {
        match report.finish() {
            Some(body) => {
                println!();
                println!("{}", "--- Cleanup finished. Sending the report by email... ---".color(colors::HEADER));
                self.send(CLEANUP_REPORT_TITLE, &body);
            }
            None => println!("{} No cleanup action was taken, so no report was sent.", "ℹ️".cyan()),
        }
    }

    pub fn test_mail(&mut self) -> Result<()> {
        let body = test_mail_body(&self.config.recipient);
        println!("Sending test email...");
        self.send(TEST_MAIL_SUBJECT, &body);
        Ok(())
    }

    fn prompt_path(&self, prompt: &str) -> Result<PathBuf> {
        let raw: String = Input::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .context("Failed to read folder path")?;
        Ok(clean_path_input(&raw))
    }

    fn compress_interactive(&mut self) -> Result<()> {
        let source = self.prompt_path("Folder with the original videos")?;
        let destination = self.prompt_path("Folder for the compressed videos")?;
        self.compress(&source, &destination)
    }

    fn rename_interactive(&mut self) -> Result<()> {
        let folder = self.prompt_path("Folder with the images to rename")?;
        let prefix: String = Input::with_theme(&self.theme)
            .with_prompt("Prefix for the new names (e.g. 'Trip')")
            .allow_empty(true)
            .interact_text()
            .context("Failed to read prefix")?;
        self.rename(&folder, &prefix)
    }

    /// Cleanup submenu. Every action taken here lands in one report, sent on
    /// the way back to the main menu.
    fn cleanup_interactive(&mut self) -> Result<()> {
        let mut report = SessionReport::new(CLEANUP_REPORT_TITLE);

        let mut items: Vec<String> = CleanupTarget::ALL
            .iter()
            .map(|target| {
                if target.is_privileged() {
                    format!("{} (Administrator)", target.label())
                } else {
                    target.label().to_string()
                }
            })
            .collect();
        items.push("🔥 Run ALL cleanups".to_string());
        items.push("↩️  Back to the main menu".to_string());
        let all_index = CleanupTarget::ALL.len();

        loop {
            println!();
            let choice = Select::with_theme(&self.theme)
                .with_prompt("System cleanup")
                .items(&items)
                .default(0)
                .interact()
                .context("Failed to read cleanup choice")?;

            if choice < all_index {
                report.record(self.cleaner.run(CleanupTarget::ALL[choice]));
            } else if choice == all_index {
                let confirm = Confirm::with_theme(&self.theme)
                    .with_prompt("Run every cleanup, including the Administrator ones?")
                    .default(false)
                    .interact()
                    .context("Failed to get confirmation")?;
                if confirm {
                    report.record(self.cleaner.run_all());
                }
            } else {
                break;
            }
        }

        self.mail_session(report);
        Ok(())
    }

    /// Main menu loop. Returns when the user picks Exit.
    pub fn run_menu(&mut self) -> Result<()> {
        let labels: Vec<&str> = MENU.iter().map(|(_, label)| *label).collect();

        loop {
            println!();
            println!("{}", "═".repeat(50).color(colors::HEADER));
            println!("{}", "   🤖 BATCHDESK AUTOMATION".bold().color(colors::HEADER));
            println!("{}", "═".repeat(50).color(colors::HEADER));
            println!("   Reports are sent to: {}", self.config.recipient.color(colors::PATH));
            println!();

            let index = Select::with_theme(&self.theme)
                .with_prompt("Choose an option")
                .items(&labels)
                .default(0)
                .interact()
                .context("Failed to read menu choice")?;

            let (choice, label) = MENU[index];
            match choice {
                MenuChoice::Compress => {
                    self.guarded(label, |s| s.compress_interactive());
                }
                MenuChoice::Rename => {
                    self.guarded(label, |s| s.rename_interactive());
                }
                MenuChoice::Cleanup => {
                    self.guarded(label, |s| s.cleanup_interactive());
                }
                MenuChoice::TestMail => {
                    self.guarded(label, |s| s.test_mail());
                }
                MenuChoice::Exit => {
                    println!("{} Thanks for using batchdesk. Goodbye!", "👋".cyan());
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use crate::cleanup::ServiceError;
    use crate::config::CleanupSettings;

    #[derive(Clone, Default)]
    struct Outbox(Rc<RefCell<Vec<Email>>>);

    impl Mailer for Outbox {
        fn send(&mut self, email: &Email) -> Result<String, MailError> {
            self.0.borrow_mut().push(email.clone());
            Ok("id".to_string())
        }
    }

    struct NoServices;

    impl ServiceControl for NoServices {
        fn stop(&mut self, _: &str) -> Result<(), ServiceError> {
            Ok(())
        }
        fn start(&mut self, _: &str) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    fn session(outbox: &Outbox, roots: TargetRoots) -> Session<NoServices> {
        let config = Config {
            recipient: "me@example.com".to_string(),
            sender: "bot@example.com".to_string(),
            ..Config::default()
        };
        let settings = CleanupSettings {
            services: vec![],
            service_settle_secs: 0,
        };
        let cleaner = Cleaner::new(NoServices, roots, &settings);
        Session::with_cleaner(config, Box::new(outbox.clone()), cleaner)
    }

    #[test]
    fn path_input_loses_quotes_and_whitespace() {
        assert_eq!(clean_path_input("  \"C:\\My Videos\"  "), PathBuf::from("C:\\My Videos"));
        assert_eq!(clean_path_input("'/tmp/pics'"), PathBuf::from("/tmp/pics"));
        assert_eq!(clean_path_input("/tmp/\"odd"), PathBuf::from("/tmp/\"odd"));
    }

    #[test]
    fn categories_follow_the_error_chain() {
        let err = anyhow::Error::new(BatchError::InvalidInput("x".to_string())).context("outer");
        assert_eq!(error_category(&err), "batch");
        let err = anyhow::Error::new(MailError::Api { status: 403, message: "no".to_string() });
        assert_eq!(error_category(&err), "provider-api");
        assert_eq!(error_category(&anyhow::anyhow!("boom")), "unexpected");
    }

    #[test]
    fn failed_task_mails_a_notice_and_session_survives() {
        let outbox = Outbox::default();
        let mut session = session(&outbox, TargetRoots { home: None, system_root: PathBuf::from("/nowhere") });

        let finished = session.guarded("Compress", |_| Err(anyhow::anyhow!("disk on fire")));
        assert!(!finished);
        assert!(session.guarded("Test", |s| s.test_mail()));

        let sent = outbox.0.borrow();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].subject, FAILURE_SUBJECT);
        assert!(sent[0].body.contains("unexpected: disk on fire"));
        assert_eq!(sent[1].subject, TEST_MAIL_SUBJECT);
        assert!(sent[1].body.contains("('me@example.com')"));
        assert_eq!(sent[1].from, "bot@example.com");
    }

    #[test]
    fn cleaning_a_missing_target_still_reports() {
        let outbox = Outbox::default();
        let tmp = tempfile::TempDir::new().unwrap();
        let mut session = session(
            &outbox,
            TargetRoots { home: Some(tmp.path().to_path_buf()), system_root: tmp.path().join("win") },
        );

        session.clean(Some(CleanupTarget::UserTemp)).unwrap();

        let sent = outbox.0.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, CLEANUP_REPORT_TITLE);
        assert!(sent[0].body.starts_with(CLEANUP_REPORT_TITLE));
        assert!(sent[0].body.contains("does not exist"));
    }

    #[test]
    fn rename_cancellation_is_still_mailed() {
        let outbox = Outbox::default();
        let mut session = session(&outbox, TargetRoots { home: None, system_root: PathBuf::from("/nowhere") });
        session
            .rename(Path::new("/definitely/not/here"), "Trip")
            .unwrap();

        let sent = outbox.0.borrow();
        assert_eq!(sent[0].subject, rename::REPORT_TITLE);
        assert!(sent[0].body.starts_with("Operation cancelled"));
    }
}
