use crate::infra::build_service;
use crate::server;
use clap::{Args, Parser, Subcommand};
use loan_desk::config::AppConfig;
use loan_desk::error::AppError;
use loan_desk::intake::Upload;
use loan_desk::telemetry;
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "loan-desk",
    about = "Screen, score and explain loan application documents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run documents through the pipeline locally and print the batch report
    Process(ProcessArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct ProcessArgs {
    /// PDF application documents to process, in order
    #[arg(required = true)]
    pub(crate) files: Vec<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Process(args) => {
            // Collaborator clients block; keep them off the runtime workers.
            tokio::task::spawn_blocking(move || process_files(args))
                .await
                .map_err(|err| AppError::Io(std::io::Error::other(err)))?
        }
    }
}

fn process_files(args: ProcessArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let service = build_service(&config)?;

    let uploads = args
        .files
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            std::fs::read(path).map(|bytes| Upload::new(name, bytes))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let report = service.process_upload_batch(&uploads);
    let summary = service.summary()?;

    let output = json!({ "report": report, "summary": summary });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
