use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "cms-admin")]
#[command(about = "Management CLI for the CMS runtime", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the runlevel and session counters
    Status,
    /// List registered sessions
    Sessions,
    /// Terminate one session
    KillSession {
        /// Session id
        id: String,
    },
    /// Terminate every session of a user
    KillUser {
        /// Fully qualified user name, e.g. /ou1/editor
        user: String,
    },
    /// Send a message to logged in users
    Broadcast {
        content: String,
        /// Treat the content as HTML (it is sanitized)
        #[arg(long)]
        html: bool,
        /// Show the message on every poll until it expires
        #[arg(long)]
        repeat: bool,
        /// Only this session
        #[arg(long)]
        session: Option<String>,
        /// Only the sessions of this user
        #[arg(long, conflicts_with = "session")]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", cli.url)),
        Commands::Sessions => client.get(format!("{}/admin/sessions", cli.url)),
        Commands::KillSession { id } => client.delete(format!("{}/admin/sessions/{}", cli.url, id)),
        Commands::KillUser { user } => client
            .post(format!("{}/admin/sessions/kill-user", cli.url))
            .json(&json!({ "user": user })),
        Commands::Broadcast {
            content,
            html,
            repeat,
            session,
            user,
        } => client
            .post(format!("{}/admin/broadcast", cli.url))
            .json(&json!({
                "content": content,
                "mode": if html { "html" } else { "plain" },
                "repeat": repeat,
                "session": session,
                "user": user,
            })),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
