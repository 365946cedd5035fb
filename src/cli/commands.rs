//! CLI command definitions

use clap::{Parser, Subcommand};
use harvest::realtime::{Deployment, Topic};
use harvest::{AuthMode, Role};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Farm operations dashboard client", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Deployment whose endpoints to use: production or development
    #[arg(long = "env", env = "HARVEST_ENV", default_value = "development", global = true)]
    pub deployment: Deployment,

    /// Override the auth API base URL
    #[arg(long, env = "HARVEST_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Override the realtime WebSocket URL
    #[arg(long, env = "HARVEST_WS_URL", global = true)]
    pub ws_url: Option<String>,

    /// demo: fall back to an offline identity when the backend fails; strict: report the failure
    #[arg(long, env = "HARVEST_AUTH_MODE", default_value = "demo", global = true)]
    pub auth_mode: AuthMode,

    /// Directory holding the session token
    #[arg(long, env = "HARVEST_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and store the session token
    ///
    /// Examples:
    ///   harvest login -e farmer@demo.com -p demo123
    ///   harvest --auth-mode strict login -e admin@demo.com -p demo123
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    /// Create an account and log in as it
    Register {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// admin, farmer, drone_operator or security_staff
        #[arg(short, long, default_value = "farmer")]
        role: Role,
    },

    /// Forget the stored session
    Logout,

    /// Exchange the stored token for a fresh one
    Refresh,

    /// Show the current identity
    Whoami,

    /// Stream realtime updates until Ctrl-C
    ///
    /// Examples:
    ///   harvest watch
    ///   harvest watch drone_update system_alert
    Watch {
        /// Topics to follow (default: all)
        topics: Vec<Topic>,
    },

    /// Send one message on the realtime channel
    ///
    /// Examples:
    ///   harvest send drone_command '{"droneId": "DH-001", "command": "return_home"}'
    Send {
        /// Message type
        topic: String,

        /// JSON payload
        data: String,

        /// Seconds to wait for the connection
        #[arg(long, default_value = "10")]
        timeout: u64,
    },

    /// Show configuration and session state
    Status,
}
