//! authflow - terminal front-end for the authflow session core.
//!
//! Drives the same effects a UI would: restores the session at start-up,
//! logs in and out, and reports what a route guard would decide.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use authflow_core::config::APP_NAME;
use authflow_core::models::UserResponse;
use authflow_core::{
    ApiRequest, Config, CredentialStore, Effect, LoginForm, RouteAccess, RouteGuard,
    SessionController,
};

const USAGE: &str = "\
Usage: authflow <command>

Commands:
  login                 Log in (prompts for email and password)
  whoami                Show the current user
  logout                Log out and clear stored credentials
  status                Print the session state as JSON
  guard <access>        Print the guard decision for a route
                        (protected, anonymous-only, public)

Environment:
  AUTHFLOW_BASE_URL     API base URL
  AUTHFLOW_EMAIL        Email used by `login`
  AUTHFLOW_PASSWORD     Password used by `login`
  AUTHFLOW_LOG_DIR      Also write logs to a daily file in this directory
  RUST_LOG              Log filter (default: warn)";

/// Initialize the tracing subscriber for logging. The returned guard must
/// live until exit so buffered file output is flushed.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os("AUTHFLOW_LOG_DIR") {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, format!("{}.log", APP_NAME));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn parse_access(value: &str) -> Result<RouteAccess> {
    match value {
        "protected" => Ok(RouteAccess::Protected),
        "anonymous-only" | "anonymous" => Ok(RouteAccess::AnonymousOnly),
        "public" => Ok(RouteAccess::Public),
        other => bail!("Unknown route access '{}'\n\n{}", other, USAGE),
    }
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{}", label);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Email from the environment, then the last successful login, then a prompt.
fn read_email(config: &Config) -> Result<String> {
    if let Ok(email) = std::env::var("AUTHFLOW_EMAIL") {
        return Ok(email);
    }
    match config.last_email {
        Some(ref last) => {
            let entered = prompt(&format!("Email [{}]: ", last))?;
            Ok(if entered.is_empty() { last.clone() } else { entered })
        }
        None => prompt("Email: "),
    }
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var("AUTHFLOW_PASSWORD") {
        return Ok(password);
    }
    rpassword::prompt_password("Password: ").context("Failed to read password")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        return Ok(());
    };
    if matches!(command, "-h" | "--help" | "help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load()?;
    if let Ok(base_url) = std::env::var("AUTHFLOW_BASE_URL") {
        config.base_url = base_url;
    }
    info!(base_url = %config.base_url, "authflow starting");

    let store = Arc::new(CredentialStore::from_config(&config)?);
    let controller = SessionController::from_config(&config, store)?;
    let guard = RouteGuard::from_config(&config);

    controller.run(Effect::CheckAuth).await?;

    match command {
        "login" => {
            if let Some(user) = controller.state().user {
                println!("Already logged in as {}", user.display_name());
                return Ok(());
            }

            let form = LoginForm::new(read_email(&config)?, read_password()?);
            let email = form.email.trim().to_string();
            match controller.run(Effect::Login(form)).await {
                Ok(()) => {
                    config.last_email = Some(email);
                    config.save()?;
                    if let Some(user) = controller.state().user {
                        println!("Logged in as {}", user.display_name());
                    }
                }
                Err(e) => bail!("Login failed: {}", e.user_message()),
            }
        }
        "whoami" => {
            let state = controller.state();
            if state.user.is_none() {
                if let Some(error) = state.error {
                    eprintln!("{}", error);
                }
                bail!("Not logged in");
            }
            let response: UserResponse = controller
                .send(&ApiRequest::identity())
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("{}", serde_json::to_string_pretty(&response.user)?);
        }
        "logout" => {
            controller.run(Effect::Logout).await?;
            println!("Logged out");
        }
        "status" => {
            println!("{}", serde_json::to_string_pretty(&controller.state())?);
        }
        "guard" => {
            let access = match args.get(1) {
                Some(value) => parse_access(value)?,
                None => bail!("Missing route access\n\n{}", USAGE),
            };
            let decision = guard.decide(access, &controller.state());
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_access() {
        assert_eq!(parse_access("protected").unwrap(), RouteAccess::Protected);
        assert_eq!(parse_access("anonymous-only").unwrap(), RouteAccess::AnonymousOnly);
        assert_eq!(parse_access("public").unwrap(), RouteAccess::Public);
        assert!(parse_access("admin").is_err());
    }
}
