//! Command-line session client for the HRMS backend.
//!
//! The session lives in `~/.hrms-api/session/`, so a login in one
//! invocation is picked up by the next.
//!
//! ```sh
//! export HRMS_API_URL='https://hr.example.com/api/v1'
//! hrms-session login mai 'p4ssword'
//! hrms-session otp 123456
//! hrms-session me
//! hrms-session logout
//! ```

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use hrms_api::auth::{ApiClient, AuthService, FileStore, LoginStep, SessionConfig, TokenKind};
use hrms_api::ClientConfig;

const USAGE: &str = "\
Usage: hrms-session <command>

Commands:
  login <username> <password>   Sign in
  otp <code>                    Finish a sign-in that needs an OTP
  me                            Show the signed-in user
  logout                        End the session
  status                        Show what the local session holds";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{USAGE}");
        return Ok(());
    };

    let store = Arc::new(FileStore::new().context("Could not locate the session directory")?);
    let session_path = store.path().to_path_buf();
    let client = ApiClient::builder(ClientConfig::from_env()?)
        .with_session(SessionConfig::from_env()?)
        .with_store(store)
        .build()?;
    let auth = AuthService::new(client.clone());

    match (command.as_str(), &args[1..]) {
        ("login", [username, password]) => match auth.login(username, password).await? {
            LoginStep::Setup2fa {
                qr_code_url,
                secret,
            } => {
                println!("Two-step verification must be set up first.");
                println!("  Secret:  {secret}");
                println!("  QR code: {qr_code_url}");
                println!("Then confirm with the first code from your authenticator.");
            }
            LoginStep::OtpRequired => {
                println!("Enter the code from your authenticator: hrms-session otp <code>");
            }
            LoginStep::Authenticated { role, redirect_to } => {
                let role = role.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
                println!("Signed in (role {role}), landing page {redirect_to}");
            }
        },
        ("otp", [code]) => {
            let landing = auth.verify_otp(code).await?;
            println!("Signed in, landing page {landing}");
        }
        ("me", []) => {
            let Some(user) = auth.identity().await else {
                bail!("Not signed in");
            };
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        ("logout", []) => {
            auth.logout().await;
            println!("Signed out");
        }
        ("status", []) => {
            let credentials = client.credentials();
            let yes_no = |present: bool| if present { "yes" } else { "no" };
            println!("Session file:  {}", session_path.display());
            println!(
                "Access token:  {}",
                yes_no(credentials.get(TokenKind::Access).is_some())
            );
            println!(
                "Refresh token: {}",
                yes_no(credentials.get(TokenKind::Refresh).is_some())
            );
            println!(
                "Pending login: {}",
                auth.pending_username().as_deref().unwrap_or("-")
            );
            println!(
                "Cached role:   {}",
                credentials.cached_role().as_deref().unwrap_or("-")
            );
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}
