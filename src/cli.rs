use clap::{Parser, Subcommand, ValueEnum};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::config_set::Target;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "

License: MIT
Rust Edition: 2024"
);

#[derive(Parser)]
#[command(name = "bootcfg")]
#[command(about = "Crash-safe editor for key=value boot configuration files")]
#[command(long_about = "bootcfg reads and rewrites line-oriented key=value boot configuration
files such as /boot/config.txt, keeping comments, ordering and unrelated lines.

Every change is written under an exclusive lock and fsynced before bootcfg
returns. Files that are missing or empty are never written; create them with
'bootcfg ensure' first.

FILE FORMAT:
  name=value           Active setting
  #name=value          Disabled setting
  ### name: value      Annotation (always kept at the top of the file)

EXAMPLES:
  bootcfg get hdmi_mode                     Print a setting (0 when unset)
  bootcfg set hdmi_mode 4                   Set or add a setting
  bootcfg set overscan_left                 Disable a setting (#overscan_left=0)
  bootcfg -t all set hdmi_group 2           Apply to primary and both backups
  bootcfg -n set hdmi_mode 16               Preview the change only
  bootcfg set-comment screen_used yes       Write '### screen_used: yes'
  bootcfg remove-block                      Strip the NOOBS appended block
  bootcfg snapshot && bootcfg restore       Safe-mode backup and restore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_version = LONG_VERSION)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (default: $BOOTCFG_CONFIG, /etc/bootcfg/config.toml, ~/.bootcfg/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Dry run mode (compute and show changes without writing)
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,

    /// Which file(s) to operate on
    #[arg(short, long, value_enum, default_value_t = TargetArg::Primary, global = true)]
    target: TargetArg,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Number of context lines in dry-run previews
    #[arg(long, value_name = "NUM", default_value_t = 2, global = true)]
    context: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetArg {
    /// The boot config the firmware reads
    Primary,
    /// Backup for first-generation boards
    Pi1,
    /// Backup for second-generation boards
    Pi2,
    /// Primary and both backups
    All,
}

impl TargetArg {
    pub fn targets(self) -> Vec<Target> {
        match self {
            TargetArg::Primary => vec![Target::Primary],
            TargetArg::Pi1 => vec![Target::Pi1Backup],
            TargetArg::Pi2 => vec![Target::Pi2Backup],
            TargetArg::All => Target::ALL.to_vec(),
        }
    }

    /// Target for read-only queries; `all` reads the primary file.
    pub fn query_target(self) -> Target {
        match self {
            TargetArg::Pi1 => Target::Pi1Backup,
            TargetArg::Pi2 => Target::Pi2Backup,
            TargetArg::Primary | TargetArg::All => Target::Primary,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the file with a placeholder line if it does not exist
    Ensure,

    /// Set a setting, or disable it when VALUE is omitted
    #[command(long_about = "Set NAME to VALUE.

The first line for NAME (active or disabled) is replaced; if there is none,
NAME=VALUE is appended. Without VALUE the line is replaced by '#NAME=0' and
nothing is added when NAME has no line.")]
    Set {
        #[arg(value_name = "NAME")]
        name: String,
        #[arg(value_name = "VALUE")]
        value: Option<String>,
    },

    /// Print the value of a setting (0 when unset)
    Get {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Write '### NAME: VALUE' at the top of the file
    SetComment {
        #[arg(value_name = "NAME")]
        name: String,
        #[arg(value_name = "VALUE")]
        value: String,
    },

    /// Check whether '### NAME: VALUE' is present
    GetComment {
        #[arg(value_name = "NAME")]
        name: String,
        #[arg(value_name = "VALUE")]
        value: String,
    },

    /// Check whether any '### NAME:' annotation is present
    HasComment {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Remove a trailing block starting at a sentinel line
    #[command(long_about = "Remove the sentinel line and everything after it.

Defaults to the configured NOOBS sentinel
('# NOOBS Auto-generated Settings:').")]
    RemoveBlock {
        /// Sentinel line (exact match)
        #[arg(long, value_name = "LINE")]
        sentinel: Option<String>,
    },

    /// Copy the primary file to the safe-mode snapshot path
    Snapshot,

    /// Move the safe-mode snapshot back over the primary file
    Restore,

    /// Show whether a safe-mode snapshot exists
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that bootcfg runs on the expected hardware
    Check,

    /// Show or initialise the bootcfg configuration
    Config {
        /// Write the commented default configuration file
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file with --init
        #[arg(long, requires = "init")]
        force: bool,
    },
}

/// Options shared by every command
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub dry_run: bool,
    pub target: TargetArg,
    pub verbose: u8,
    pub context: usize,
}

#[derive(Debug)]
pub enum Args {
    Ensure,
    Set { name: String, value: Option<String> },
    Get { name: String },
    SetComment { name: String, value: String },
    GetComment { name: String, value: String },
    HasComment { name: String },
    RemoveBlock { sentinel: Option<String> },
    Snapshot,
    Restore,
    Status { json: bool },
    Check,
    Config { init: bool, force: bool },
}

/// Parse the process arguments.
///
/// `--help` and `--version` also come back as errors; print them and pick the
/// exit status with [`crate::exit_codes::for_parse_error`].
pub fn parse_args() -> Result<(GlobalArgs, Args), clap::Error> {
    parse_args_from(std::env::args_os())
}

pub fn parse_args_from<I, T>(argv: I) -> Result<(GlobalArgs, Args), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(argv).map(from_cli)
}

fn from_cli(cli: Cli) -> (GlobalArgs, Args) {
    let global = GlobalArgs {
        config: cli.config,
        dry_run: cli.dry_run,
        target: cli.target,
        verbose: cli.verbose,
        context: cli.context,
    };

    let args = match cli.command {
        Commands::Ensure => Args::Ensure,
        Commands::Set { name, value } => Args::Set { name, value },
        Commands::Get { name } => Args::Get { name },
        Commands::SetComment { name, value } => Args::SetComment { name, value },
        Commands::GetComment { name, value } => Args::GetComment { name, value },
        Commands::HasComment { name } => Args::HasComment { name },
        Commands::RemoveBlock { sentinel } => Args::RemoveBlock { sentinel },
        Commands::Snapshot => Args::Snapshot,
        Commands::Restore => Args::Restore,
        Commands::Status { json } => Args::Status { json },
        Commands::Check => Args::Check,
        Commands::Config { init, force } => Args::Config { init, force },
    };

    (global, args)
}
