use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nodelink")]
#[command(about = "A peer-to-peer node speaking the nodelink wire protocol")]
pub struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Key management commands
    Key {
        #[command(subcommand)]
        command: KeyCommand,
    },
    /// Run a node until interrupted
    Serve {
        /// Address to listen on, overriding the configuration file
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Connect to a peer and measure round-trip times
    ///
    /// Examples:
    ///   nodelink ping 127.0.0.1:30001
    ///   nodelink ping 127.0.0.1:30001 --count 10
    Ping {
        /// Address of the peer (host:port)
        address: String,
        /// Number of pings to send
        #[arg(short = 'n', long, default_value_t = 4)]
        count: u32,
    },
}

#[derive(Subcommand)]
pub enum KeyCommand {
    /// Show the default key storage path
    Path,
    /// Generate a new identity (overwrites existing)
    Generate,
    /// Show current identity info
    Info,
}
