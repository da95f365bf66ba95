//! Interactive login that creates or refreshes the session file.

use std::path::Path;

use crate::auth::{ensure_authorized, whoami};
use crate::config::Config;
use crate::error::Result;
use crate::session::{get_client, session_exists, SessionLock};

pub async fn run(config: &Config) -> Result<()> {
    println!("[env] {} {} {}", config.api_id, config.masked_hash(), config.phone);

    config.validate()?;
    if let Some(warning) = config.phone_warning() {
        println!("{}", warning);
    }
    if session_exists(config) {
        tracing::info!("reusing session file {}", config.session_file());
    }

    let _lock = SessionLock::acquire(config.lock_file())?;
    let client = get_client(config).await?;

    let result = async {
        ensure_authorized(&client, config).await?;
        whoami(&client).await
    }
    .await;
    client.disconnect().await;

    let identity = result?;
    let session_file = config.session_file();
    let session_path = std::fs::canonicalize(&session_file)
        .unwrap_or_else(|_| Path::new(&session_file).to_path_buf());

    println!("[tg] authorized as: {}", identity);
    println!("[tg] session file created at: {}", session_path.display());
    Ok(())
}
