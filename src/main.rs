use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;

use schooldesk_client::api::auth::{token_subject, KeychainTokenStore, TokenKind, TokenStore};
use schooldesk_client::api::{ApiClient, LoginRequest};
use schooldesk_client::config::ClientConfig;

#[derive(Parser, Debug)]
#[command(name = "schooldesk", version, about = "Command-line client for the SchoolDesk API")]
struct Cli {
    /// Keychain service holding the session tokens
    #[arg(long, default_value = schooldesk_client::api::auth::SERVICE_NAME)]
    keychain_service: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session tokens in the keychain
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// End the session and forget the stored tokens
    Logout,
    /// Show whether a session is stored and whom it belongs to
    Status,
    /// Refresh the stored session now
    Refresh,
    Get { path: String },
    Delete { path: String },
    /// POST a JSON body
    Post { path: String, body: String },
    /// PUT a JSON body
    Put { path: String, body: String },
    /// PATCH a JSON body
    Patch { path: String, body: String },
    /// List students
    Students {
        #[arg(long)]
        search: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env()?;
    let store = Arc::new(KeychainTokenStore::new(&cli.keychain_service));
    let client = ApiClient::new(&config, store.clone()).on_auth_failure(Arc::new(|| {
        log::error!("Session expired; run `schooldesk login` again");
    }));

    match cli.command {
        Command::Login { email, password } => {
            let tokens = client.login(&LoginRequest { email, password }).await?;
            match token_subject(&tokens.access_token) {
                Ok(sub) => println!("Logged in as {}", sub),
                Err(_) => println!("Logged in"),
            }
        }
        Command::Logout => {
            client.logout().await?;
            println!("Logged out");
        }
        Command::Status => match store.get(TokenKind::Access)? {
            Some(token) => {
                let subject = token_subject(&token).unwrap_or_else(|e| format!("unknown ({})", e));
                println!("Authenticated as {}", subject);
            }
            None => println!("Not logged in"),
        },
        Command::Refresh => {
            client.refresh_session().await?;
            println!("Session refreshed");
        }
        Command::Get { path } => print_json(&client.get::<Value>(&path).await?)?,
        Command::Delete { path } => print_json(&client.delete::<Value>(&path).await?)?,
        Command::Post { path, body } => {
            let body = parse_json_arg(&body)?;
            print_json(&client.post::<_, Value>(&path, &body).await?)?
        }
        Command::Put { path, body } => {
            let body = parse_json_arg(&body)?;
            print_json(&client.put::<_, Value>(&path, &body).await?)?
        }
        Command::Patch { path, body } => {
            let body = parse_json_arg(&body)?;
            print_json(&client.patch::<_, Value>(&path, &body).await?)?
        }
        Command::Students { search } => {
            let students = client.students().list(search.as_deref()).await?;
            for student in students {
                println!("{}\t{} {}", student.id, student.first_name, student.last_name);
            }
        }
    }

    Ok(())
}

fn parse_json_arg(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("Body is not valid JSON: {}", e))
}

fn print_json(value: &Value) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
