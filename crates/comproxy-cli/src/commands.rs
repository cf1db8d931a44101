//! CLI command definitions.

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the proxy server
    Serve {
        /// Address to listen on, overriding server.bind
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Show the effective configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Show how a request path would be served
    Check {
        /// Repository path, e.g. p/acme/widget.json
        path: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the configuration as YAML
    Show,
}
