//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Multi-tenant RPC gateway with certificate identity and scope-based
/// authorization
#[derive(Parser, Debug)]
#[command(name = "rpc-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "RPC_GATEWAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "RPC_GATEWAY_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "RPC_GATEWAY_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "RPC_GATEWAY_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "RPC_GATEWAY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default)
    Serve,

    /// Print the client identity of PEM certificates
    Identity {
        /// Certificate files (PEM); every certificate in each file is printed
        #[arg(required = true)]
        certs: Vec<PathBuf>,
    },

    /// Load and validate the configuration, then list clients and services
    CheckConfig,

    /// Show the decision for a method without starting the server
    Authorize {
        /// Fully-qualified method, e.g. `/orders.OrderService/Get`
        #[arg(short, long)]
        method: String,

        /// Client identity (hex serial); omit for an anonymous caller
        #[arg(short, long)]
        identity: Option<String>,
    },
}
