use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::error;

use social_recipe_import::jobs::SqliteJobStore;
use social_recipe_import::{
    build_orchestrator, AppConfig, Job, JobStatus, JobStatusView, JobStore, Orchestrator,
    Platform, Target,
};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "social-recipe-import")]
#[command(about = "Import recipes from Instagram and TikTok posts into Tandoor or Mealie")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a post and follow the job until it finishes
    Import {
        /// Post URL
        url: String,
        /// Platform of the post (detected from the URL when omitted)
        #[arg(long, value_enum)]
        platform: Option<Platform>,
        /// Recipe manager to publish to
        #[arg(long, value_enum)]
        target: Target,
    },
    /// List all jobs, newest first
    List,
    /// Show the status of one job
    Status { id: String },
    /// Delete a job record
    Delete { id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the command succeeded.
async fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::open(&config.database_path)?);

    match cli.command {
        Commands::Import {
            url,
            platform,
            target,
        } => {
            let platform = platform
                .or_else(|| Platform::detect(&url))
                .ok_or("Cannot tell the platform from the URL, pass --platform")?;
            let orchestrator = build_orchestrator(&config, store)?;
            let id = orchestrator.submit(&url, platform, target)?;
            println!("Job {id} submitted");
            follow(&orchestrator, &id).await
        }
        Commands::List => {
            for job in store.list()? {
                print_job(&job);
            }
            Ok(true)
        }
        Commands::Status { id } => match store.get(&id)? {
            Some(job) => {
                print_status(&JobStatusView::from(&job));
                if let Some(result) = job.result.filter(|_| job.status == JobStatus::Failed) {
                    println!("{result}");
                }
                Ok(true)
            }
            None => {
                eprintln!("Job {id} not found");
                Ok(false)
            }
        },
        Commands::Delete { id } => {
            if store.delete(&id)? {
                println!("Deleted job {id}");
                Ok(true)
            } else {
                eprintln!("Job {id} not found");
                Ok(false)
            }
        }
    }
}

/// Print progress changes until the job reaches a terminal state.
async fn follow(
    orchestrator: &Orchestrator,
    id: &str,
) -> Result<bool, Box<dyn std::error::Error>> {
    let mut last: Option<(u8, String)> = None;
    loop {
        let status = orchestrator
            .status(id)?
            .ok_or_else(|| format!("Job {id} disappeared"))?;

        let current = (status.progress, status.message.clone());
        if last.as_ref() != Some(&current) {
            print_status(&status);
            last = Some(current);
        }
        if status.status.is_terminal() {
            return Ok(status.status == JobStatus::Completed);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn print_status(status: &JobStatusView) {
    println!("[{:>3}%] {:<10} {}", status.progress, status.status, status.message);
    if let Some(url) = &status.result_url {
        println!("        {url}");
    }
}

fn print_job(job: &Job) {
    println!(
        "{}  {}  {:<10} {:>3}%  {} -> {}  {}",
        job.id,
        job.created_at.format("%Y-%m-%d %H:%M:%S"),
        job.status,
        job.progress,
        job.platform,
        job.target,
        job.url
    );
}
