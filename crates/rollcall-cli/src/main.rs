use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

// D-Bus proxy — `#[zbus::proxy]` generates `AttendanceProxy` (async) from
// this trait; it must mirror the daemon's interface exactly.
#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn start_session(&self, faculty_email: &str, class_id: &str) -> zbus::Result<String>;
    async fn process_frame(&self, session_id: &str, frame: &[u8]) -> zbus::Result<String>;
    async fn poll_session(&self, session_id: &str) -> zbus::Result<String>;
    async fn stop_session(&self, session_id: &str) -> zbus::Result<String>;
    async fn list_stale(&self, older_than_secs: u64) -> zbus::Result<String>;
    async fn today_summary(&self, faculty_email: &str) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "rollcall live attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a live attendance session for a class
    Start {
        /// Faculty email taking the lecture
        #[arg(short, long)]
        faculty: String,
        /// Class id as "<branch>_<semester>" (e.g. CSE_4)
        #[arg(short, long)]
        class: String,
    },
    /// Send one image file to a session as a camera frame
    Frame {
        session: String,
        image: PathBuf,
    },
    /// Show a session's recognized students so far
    Poll { session: String },
    /// Stop a session, reconcile against the roster, persist attendance
    Stop { session: String },
    /// List sessions idle for longer than the given number of seconds
    Stale {
        #[arg(default_value_t = 900)]
        older_than_secs: u64,
    },
    /// Today's Present/Absent totals for a faculty member
    Summary { faculty: String },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("connecting to the session bus — is rollcalld running?")?;
    let proxy = AttendanceProxy::new(&conn).await?;

    let reply = match cli.command {
        Commands::Start { faculty, class } => proxy.start_session(&faculty, &class).await?,
        Commands::Frame { session, image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading frame image {}", image.display()))?;
            proxy.process_frame(&session, &bytes).await?
        }
        Commands::Poll { session } => proxy.poll_session(&session).await?,
        Commands::Stop { session } => proxy.stop_session(&session).await?,
        Commands::Stale { older_than_secs } => proxy.list_stale(older_than_secs).await?,
        Commands::Summary { faculty } => proxy.today_summary(&faculty).await?,
        Commands::Status => proxy.status().await?,
    };

    // Daemon replies are JSON; re-render them readably when possible.
    match serde_json::from_str::<serde_json::Value>(&reply) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{reply}"),
    }
    Ok(())
}
