use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tokenward", version, about = "Tokenward operator tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the CLI version.
    Version,

    /// Generate a random signing key suitable for `JWT_KEY`.
    Keygen {
        /// Number of random bytes before base64 encoding.
        #[arg(long, default_value_t = 48)]
        bytes: usize,
    },

    /// Verify an access token with the configured key and print its claims.
    Inspect {
        /// The encoded access token.
        token: String,
    },
}
