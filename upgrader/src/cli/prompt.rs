//! Interactive credential prompts

use dialoguer::{theme::ColorfulTheme, Input, Password};

use crate::cli::CredentialArgs;
use crate::errors::UpgradeError;
use crate::models::device::Credentials;

fn prompt_error(what: &str, err: dialoguer::Error) -> UpgradeError {
    UpgradeError::ConfigError(format!("{} not given and prompting failed: {}", what, err))
}

/// Fill in whatever the command line left out by asking on the terminal
pub fn resolve_credentials(args: &CredentialArgs) -> Result<Credentials, UpgradeError> {
    let theme = ColorfulTheme::default();

    let username = match &args.username {
        Some(username) => username.clone(),
        None => Input::<String>::with_theme(&theme)
            .with_prompt("Username")
            .interact_text()
            .map_err(|e| prompt_error("username", e))?,
    };

    let password = match &args.password {
        Some(password) => password.clone(),
        None => Password::with_theme(&theme)
            .with_prompt("Password")
            .interact()
            .map_err(|e| prompt_error("password", e))?,
    };

    Ok(Credentials::new(username, password))
}
