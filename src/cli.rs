use crate::runtime::{self, RunOptions};
use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "waypost", version)]
#[command(
    about = "Edge gateway that buffers punch events and syncs them to a remote collector",
    long_about = "waypost harvests punch events from configured capture devices into a deduplicated local store, then uploads pending events to a remote endpoint under a connectivity-aware policy (batching, compression, reachability gating)."
)]
#[command(arg_required_else_help = true)]
#[command(after_long_help = "Examples:
  waypost run --config waypost.toml
  waypost run --config waypost.toml --once
  waypost status --config waypost.toml
  waypost completion zsh > ~/.zsh/completions/_waypost
  waypost man > waypost.1")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Run the harvest and sync loops",
        long_about = "Run the gateway: two independent loops harvest events from capture sources into the local store and upload pending events to the remote endpoint on the mode's intervals."
    )]
    #[command(after_long_help = "Examples:
  waypost run --config waypost.toml
  waypost run --config /etc/waypost/pier7.toml --log /var/log/waypost/cycles.ndjson
  waypost run --config waypost.toml --once")]
    Run {
        #[arg(
            long,
            value_name = "PATH",
            default_value = "waypost.toml",
            help = "Path to TOML configuration file"
        )]
        config: PathBuf,
        #[arg(long, help = "Run a single harvest and sync pass, then exit")]
        once: bool,
        #[arg(long, value_name = "PATH", help = "Write NDJSON cycle log to file")]
        log: Option<PathBuf>,
        #[arg(
            long,
            value_name = "PATH",
            help = "Path to event database (default: $XDG_STATE_HOME/waypost/events.db)"
        )]
        state_db: Option<PathBuf>,
    },
    #[command(about = "Show pending/synced counts for the local event store")]
    #[command(after_long_help = "Example:
  waypost status --config waypost.toml")]
    Status {
        #[arg(
            long,
            value_name = "PATH",
            default_value = "waypost.toml",
            help = "Path to TOML configuration file"
        )]
        config: PathBuf,
        #[arg(
            long,
            value_name = "PATH",
            help = "Path to event database (default: $XDG_STATE_HOME/waypost/events.db)"
        )]
        state_db: Option<PathBuf>,
    },
    #[command(
        about = "Generate shell completion script",
        long_about = "Generate shell completion script for your shell. Redirect output to your shell completion directory."
    )]
    #[command(arg_required_else_help = true)]
    #[command(after_long_help = "Examples:
  waypost completion bash > ~/.local/share/bash-completion/completions/waypost
  waypost completion zsh > ~/.zsh/completions/_waypost")]
    Completion {
        #[arg(value_enum, value_name = "SHELL", help = "Target shell")]
        shell: Shell,
    },
    #[command(
        about = "Generate a man page",
        long_about = "Generate a roff man page for waypost."
    )]
    #[command(after_long_help = "Examples:
  waypost man > waypost.1
  waypost man --output docs/waypost.1")]
    Man {
        #[arg(
            long,
            value_name = "PATH",
            help = "Write man page to file (stdout when omitted)"
        )]
        output: Option<PathBuf>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            once,
            log,
            state_db,
        } => runtime::execute(RunOptions {
            config,
            once,
            log,
            state_db,
        }),
        Commands::Status { config, state_db } => runtime::show_status(&config, state_db),
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Man { output } => {
            let man = clap_mangen::Man::new(Cli::command());
            match output {
                Some(path) => {
                    let mut bytes = Vec::new();
                    man.render(&mut bytes)?;
                    fs::write(path, bytes)?;
                }
                None => {
                    man.render(&mut io::stdout())?;
                }
            }
            Ok(())
        }
    }
}
