use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use easystorage_core::api::ApiClient;
use easystorage_core::auth::SessionStore;
use easystorage_core::config::Config;
use easystorage_core::router::{Navigation, RouteTable, Router};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check that the backend is up
    Health,
    /// Print the Google sign-in URL
    AuthUrl,
    /// Store a token and user id (as returned to /auth/callback)
    Login { token: String, user_id: String },
    /// Forget the stored session
    Logout,
    /// Show the current session
    Whoami,
    /// Submit a job; PAYLOAD is JSON, or @FILE to read it from a file
    Submit { payload: String },
    /// Show a job's status
    Status { job_id: String },
    /// Search media with key=value parameters
    Search {
        #[arg(value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },
    /// Download a media item's content
    Fetch {
        media_id: String,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Navigate to an app route and print where the guard lets you land
    Open { path: String },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{}`", s))?;
    if key.is_empty() {
        return Err(format!("empty key in `{}`", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_payload(raw: &str) -> Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload file {}", path))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).context("Payload is not valid JSON")
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run(command: Command) -> Result<()> {
    let config = Config::load()?;
    debug!(base_url = %config.api_base_url, storage = ?config.storage, "Config loaded");

    let session = SessionStore::open(config.open_storage()?)?;
    let client = ApiClient::new(&config, session.clone())?;
    let mut changes = session.subscribe();

    let result = dispatch(command, &client, &session).await;

    // A 401 anywhere ends the session; tell the user instead of reloading
    if changes.has_changed().unwrap_or(false) && !changes.borrow_and_update().is_authenticated() {
        eprintln!("Signed out.");
    }
    result
}

async fn dispatch(command: Command, client: &ApiClient, session: &SessionStore) -> Result<()> {
    match command {
        Command::Health => print_json(&client.check_health().await?),
        Command::AuthUrl => {
            let start = client.start_google_auth().await?;
            match start.redirect_url() {
                Some(url) => println!("{}", url),
                None => print_json(&start.0)?,
            }
            Ok(())
        }
        Command::Login { token, user_id } => {
            session.set_auth(&token, &user_id)?;
            println!("Logged in as {}", user_id);
            Ok(())
        }
        Command::Logout => session.logout(),
        Command::Whoami => {
            match session.user_id() {
                Some(user_id) if session.is_authenticated() => println!("{}", user_id),
                _ => println!("Not logged in"),
            }
            Ok(())
        }
        Command::Submit { payload } => {
            let payload = parse_payload(&payload)?;
            print_json(&client.submit_job(&payload).await?)
        }
        Command::Status { job_id } => print_json(&client.get_job_status(&job_id).await?),
        Command::Search { params } => print_json(&client.search_media(&params).await?),
        Command::Fetch { media_id, output } => {
            let content = client.get_media_content_blob(&media_id).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &content.bytes)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!(
                        "Wrote {} bytes ({}) to {}",
                        content.bytes.len(),
                        content.content_type.as_deref().unwrap_or("unknown type"),
                        path.display()
                    );
                }
                None => std::io::stdout().write_all(&content.bytes)?,
            }
            Ok(())
        }
        Command::Open { path } => {
            let router = Router::new(RouteTable::default(), session.clone());
            match router.navigate(&path) {
                Navigation::Proceed(target) => println!("{}", target),
                Navigation::Redirect(target) => println!("{} (redirected from {})", target, path),
            }
            Ok(())
        }
    }
}
