//! Interactive login: login code and optional two-factor password.

use std::io::{self, BufRead, Write};

use grammers_client::{Client, SignInError};
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};

/// Print `message` and read one line from `input`, without the newline.
pub fn prompt_from<R: BufRead, W: Write>(input: &mut R, output: &mut W, message: &str) -> Result<String> {
    write!(output, "{}", message)?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(Error::AuthorizationFailed("no input on stdin".to_string()));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Blocking console prompt.
pub fn prompt(message: &str) -> Result<String> {
    prompt_from(&mut io::stdin().lock(), &mut io::stdout(), message)
}

/// Name shown after login: the username, or the display name without one.
pub fn identity_label(username: Option<&str>, full_name: &str) -> String {
    match username.filter(|u| !u.is_empty()) {
        Some(username) => username.to_string(),
        None => full_name.to_string(),
    }
}

/// Make sure the client is logged in, asking the operator for the code
/// (and password) when the session is not authorized yet.
pub async fn ensure_authorized(client: &Client, config: &Config) -> Result<()> {
    let authorized = client
        .is_authorized()
        .await
        .map_err(|e| Error::AuthorizationFailed(e.to_string()))?;
    if authorized {
        info!("session already authorized");
        return Ok(());
    }

    println!("[tg] sending login code to {} ...", config.phone);
    let token = client
        .request_login_code(&config.phone, &config.api_hash)
        .await
        .map_err(|e| Error::AuthorizationFailed(format!("Failed to request code: {}", e)))?;

    let code = prompt("Enter the code you received: ")?;

    match client.sign_in(&token, code.trim()).await {
        Ok(_) => {}
        Err(SignInError::PasswordRequired(password_token)) => {
            let message = match password_token.hint() {
                Some(hint) if !hint.is_empty() => format!("Two-factor password (hint: {}): ", hint),
                _ => "Two-factor password: ".to_string(),
            };
            let password = prompt(&message)?;
            client
                .check_password(password_token, password.as_bytes())
                .await
                .map_err(|e| Error::AuthorizationFailed(format!("Failed to check password: {}", e)))?;
        }
        Err(e) => {
            return Err(Error::AuthorizationFailed(format!("Failed to sign in: {}", e)));
        }
    }

    info!("signed in");
    Ok(())
}

/// Identity of the logged-in account.
pub async fn whoami(client: &Client) -> Result<String> {
    let me = client.get_me().await?;
    Ok(identity_label(me.username(), &me.full_name()))
}
