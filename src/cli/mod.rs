use clap::{Parser, Subcommand};
use clap_complete::Shell;

pub mod commands;
pub mod ui;

use crate::app_config::AppType;

#[derive(Parser)]
#[command(
    name = "persona",
    version,
    about = "Switch provider profiles for the Claude and Codex CLIs",
    long_about = "Store named provider profiles (base URL, API key, model mappings) and switch the active one by rewriting the Claude / Codex settings files.\n\nRun without arguments to show the current status."
)]
pub struct Cli {
    /// Target CLI tool (defaults to claude where a single target is needed)
    #[arg(short, long, global = true, value_enum)]
    pub target: Option<AppType>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List providers
    #[command(alias = "ls")]
    List,

    /// Show details of one provider
    Show {
        /// Provider ID
        id: String,
    },

    /// Activate a provider (interactive when no ID is given)
    #[command(alias = "switch")]
    Use {
        /// Provider ID to activate
        id: Option<String>,

        /// Re-apply the active provider (or the general config) to the settings file
        #[arg(short, long, conflicts_with = "id")]
        update: bool,

        /// Print the settings that would be written without writing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Add a provider
    #[command(alias = "new")]
    Add(commands::provider::ProviderFields),

    /// Edit fields of a provider
    Edit {
        /// Provider ID to edit
        id: String,

        #[command(flatten)]
        fields: commands::provider::ProviderFields,
    },

    /// Remove a provider
    #[command(aliases = ["rm", "del", "delete"])]
    Remove {
        /// Provider ID to remove (interactive when omitted)
        id: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Test connectivity and latency of a provider
    #[command(alias = "test")]
    Ping {
        /// Provider ID to test (interactive when omitted)
        id: Option<String>,
    },

    /// Show active providers and the live settings
    #[command(aliases = ["info", "current"])]
    Status,

    /// Remove provider settings from the target and clear the active provider
    Reset,

    /// Show or edit the general config merged into every provider
    #[command(subcommand)]
    Env(commands::env::EnvCommand),

    /// Show or set the theme name
    Theme {
        /// Theme to use
        name: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Generate shell completions
pub fn generate_completions(shell: Shell) {
    use clap::CommandFactory;
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}
