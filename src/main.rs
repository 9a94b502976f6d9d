use std::path::Path;
use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::*;
use dialoguer::theme::ColorfulTheme;
use batchdesk::cli::{Cli, Commands};
use batchdesk::colors;
use batchdesk::config::{self, Config};
use batchdesk::logging::init_logging;
use batchdesk::mail::{ConsoleMailer, GmailMailer, Mailer};
use batchdesk::session::Session;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Disable colors if requested
    if cli.no_color {
        colored::control::set_override(false);
    }

    init_logging(cli.verbose)?;

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };
    tracing::debug!("Using config file {}", config_path.display());

    let command = cli.command.unwrap_or(Commands::Menu);
    let action = command.name();

    match command {
        Commands::Config => show_config(&config_path)?,

        Commands::Menu => {
            let mut session = open_session(&config_path, cli.email.as_deref(), cli.no_mail)?;
            Cli::print_banner();
            session.run_menu()?;
        }

        Commands::Compress(args) => {
            let mut session = open_session(&config_path, cli.email.as_deref(), cli.no_mail)?;
            session.guarded(action, |s| s.compress(&args.source, &args.destination));
        }

        Commands::Rename(args) => {
            let mut session = open_session(&config_path, cli.email.as_deref(), cli.no_mail)?;
            session.guarded(action, |s| s.rename(&args.folder, &args.prefix));
        }

        Commands::Clean(args) => {
            let mut session = open_session(&config_path, cli.email.as_deref(), cli.no_mail)?;
            let target = args.target.target();
            session.guarded(action, |s| s.clean(target));
        }

        Commands::TestMail => {
            let mut session = open_session(&config_path, cli.email.as_deref(), cli.no_mail)?;
            session.guarded(action, |s| s.test_mail());
        }
    }

    Ok(())
}

/// Prints the saved configuration, or the defaults when none exists yet.
fn show_config(config_path: &Path) -> Result<()> {
    match Config::load_from(config_path).context("Failed to load configuration")? {
        Some(config) => config.display(),
        None => {
            println!("{} No configuration at {} yet; showing defaults.", "ℹ️".cyan(), config_path.display());
            println!();
            Config::default().display();
        }
    }
    Ok(())
}

fn open_session(config_path: &Path, email: Option<&str>, no_mail: bool) -> Result<Session> {
    // Load or create config WITH CONTEXT
    let mut config = Config::load_or_setup(config_path).context("Failed to load configuration")?;

    if config.recipient.is_empty() && email.is_none() {
        config.recipient = config::prompt_email(&ColorfulTheme::default(), "Email address that should receive task reports")?;
        config.save_to(config_path)?;
    }

    // One-off recipient, never saved
    if let Some(email) = email {
        if !config::is_valid_email(email) {
            bail!("'{}' is not a valid email address", email);
        }
        config.recipient = email.trim().to_string();
    }

    let mailer: Box<dyn Mailer> = if no_mail {
        println!("{}", "📭 Mail disabled: reports are printed here instead".color(colors::WARNING));
        Box::new(ConsoleMailer::default())
    } else {
        Box::new(GmailMailer::new(config.mail.clone()))
    };

    Ok(Session::new(config, mailer))
}
