// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use base64::Engine;
use clap::Parser;
use cli::{Cli, Commands};
use rand::RngCore;
use tokenward_core::auth::AccessTokenIssuer;
use tokenward_core::config::{AuthConfig, MIN_SIGNING_KEY_BYTES};

mod cli;
mod logging;

fn main() -> Result<()> {
    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<()> {
    logging::init()?;
    dotenvy::dotenv().ok();

    let args = Cli::parse();

    match &args.command {
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
        Commands::Keygen { bytes } => {
            println!("{}", keygen(*bytes)?);
        }
        Commands::Inspect { token } => {
            let config = AuthConfig::from_env()?;
            let issuer = AccessTokenIssuer::new(&config)?;
            let claims = issuer
                .verify(token)
                .ok_or_else(|| Error::Custom("token is invalid or expired".into()))?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
    }

    Ok(())
}

/// Base64 of `bytes` random bytes; the encoded key must satisfy the
/// minimum signing key length.
fn keygen(bytes: usize) -> Result<String> {
    let min_bytes = MIN_SIGNING_KEY_BYTES.div_ceil(4) * 3;
    if bytes < min_bytes {
        return Err(Error::Custom(format!(
            "--bytes must be at least {min_bytes} to yield a {MIN_SIGNING_KEY_BYTES}-byte key"
        )));
    }
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    let key = base64::engine::general_purpose::STANDARD.encode(buf);
    log::debug!("generated {}-character signing key", key.len());
    Ok(key)
}
