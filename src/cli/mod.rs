//! Command-line interface for spellcheckd.

use clap::{Parser, Subcommand};

/// Spellcheckd - multi-user spell checking service
/// with password + TOTP authentication
#[derive(Parser)]
#[command(name = "spellcheckd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve,

    /// Create a user account from the command line
    CreateUser {
        /// Username (5-20 chars, A-Za-z0-9._)
        username: String,

        /// Password (8-20 chars, A-Za-z0-9._$%&*#@!)
        password: String,

        /// Grant the admin flag; there is no in-app promotion path
        #[arg(long)]
        admin: bool,
    },

    /// Create default config file
    Init,
}
