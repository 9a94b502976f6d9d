use clap::{Parser, Subcommand, Args, ValueEnum};
use std::path::PathBuf;
use colored::*;
use crate::cleanup::CleanupTarget;

#[derive(Parser, Debug)]
#[command(
    name = "batchdesk",
    about = "Desktop automation menu with mailed reports",
    version,
    long_about = "batchdesk runs small batch jobs on your desktop and emails\n\
                  a plain-text report when each one finishes.\n\n\
                  Tasks:\n\
                  • Compress every video in a folder with ffmpeg\n\
                  • Rename images by creation date (Trip_001.jpg, ...)\n\
                  • Purge Windows temp, prefetch and update caches\n\n\
                  Run without a command to open the interactive menu."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file (default: ~/.batchdesk.json)
    #[arg(long, global = true, env = "BATCHDESK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Send reports to this address for this run only
    #[arg(long, global = true)]
    pub email: Option<String>,

    /// Print reports instead of emailing them
    #[arg(long, global = true)]
    pub no_mail: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the interactive menu (default)
    Menu,

    /// Compress every video in a folder
    Compress(CompressArgs),

    /// Rename images by creation date
    Rename(RenameArgs),

    /// Purge a cache or temp folder
    Clean(CleanArgs),

    /// Send a test email to the configured recipient
    TestMail,

    /// Show configuration
    Config,
}

#[derive(Args, Debug)]
pub struct CompressArgs {
    /// Folder with the original videos
    pub source: PathBuf,

    /// Folder for the compressed videos (created if missing)
    pub destination: PathBuf,
}

#[derive(Args, Debug)]
pub struct RenameArgs {
    /// Folder with the images
    pub folder: PathBuf,

    /// Prefix for the new names; also the name of the output subfolder
    pub prefix: String,
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// What to clean
    #[arg(value_enum)]
    pub target: CleanTargetArg,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CleanTargetArg {
    /// Current user's temp folder
    UserTemp,
    /// %SystemRoot%\Temp
    WindowsTemp,
    /// %SystemRoot%\Prefetch
    Prefetch,
    /// Windows Update download cache (Administrator)
    UpdateCache,
    /// Everything above, in that order
    All,
}

impl CleanTargetArg {
    /// `None` means every target.
    pub fn target(self) -> Option<CleanupTarget> {
        match self {
            CleanTargetArg::UserTemp => Some(CleanupTarget::UserTemp),
            CleanTargetArg::WindowsTemp => Some(CleanupTarget::WindowsTemp),
            CleanTargetArg::Prefetch => Some(CleanupTarget::Prefetch),
            CleanTargetArg::UpdateCache => Some(CleanupTarget::UpdateCache),
            CleanTargetArg::All => None,
        }
    }
}

impl Cli {
    /// Print version information
    pub fn print_banner() {
        println!("🤖 batchdesk v{}", env!("CARGO_PKG_VERSION"));
        println!("{}", "Batch jobs with mailed reports".dimmed());
    }
}

impl Commands {
    /// Get the command name
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Menu => "menu",
            Commands::Compress(_) => "compress",
            Commands::Rename(_) => "rename",
            Commands::Clean(_) => "clean",
            Commands::TestMail => "test-mail",
            Commands::Config => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_command_means_menu() {
        let cli = Cli::try_parse_from(["batchdesk", "--no-mail"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.no_mail);
    }

    #[test]
    fn clean_targets_parse() {
        let cli = Cli::try_parse_from(["batchdesk", "clean", "update-cache", "-v"]).unwrap();
        match cli.command {
            Some(Commands::Clean(args)) => {
                assert_eq!(args.target.target(), Some(CleanupTarget::UpdateCache));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(cli.verbose);

        let cli = Cli::try_parse_from(["batchdesk", "clean", "all"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Clean(CleanArgs { target: CleanTargetArg::All }))));
    }

    #[test]
    fn rename_takes_folder_and_prefix() {
        let cli = Cli::try_parse_from(["batchdesk", "--email", "a@b.io", "rename", "/pics", "Trip"]).unwrap();
        assert_eq!(cli.email.as_deref(), Some("a@b.io"));
        match cli.command {
            Some(Commands::Rename(args)) => {
                assert_eq!(args.folder, PathBuf::from("/pics"));
                assert_eq!(args.prefix, "Trip");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn config_is_a_named_subcommand() {
        let cli = Cli::try_parse_from(["batchdesk", "config"]).unwrap();
        let command = cli.command.unwrap();
        assert!(matches!(command, Commands::Config));
        assert_eq!(command.name(), "config");
    }
}
