mod actions;
mod config;
mod filter;
mod git;
mod github;
mod metadata;
mod version;

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use actions::ResourceError;

/// CI resource that turns GitHub pull request comments and reviews into
/// versions, materializes them and reports back to the pull request.
///
/// Requests are read as JSON from stdin; responses are written to stdout.
#[derive(Parser, Debug)]
#[command(name = "pr-comment-resource", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every matching comment and review version
    Check,
    /// Fetch one version into a directory
    In {
        /// Destination directory
        path: PathBuf,
    },
    /// Update a pull request from a previously fetched version
    Out {
        /// Build directory containing the fetched version
        path: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), ResourceError> {
    match command {
        Command::Check => {
            let request: actions::check::CheckRequest = read_request()?;
            let github = github::GitHubClient::from_source(&request.source)?;
            let versions = actions::check::run(&request.source, &github).await?;
            write_response(&versions)
        }
        Command::In { path } => {
            let request: actions::input::InRequest = read_request()?;
            let github = github::GitHubClient::from_source(&request.source)?;
            let git = git::GitClient::new(
                &request.source,
                path.join(request.params.source_path()),
            );
            let response = actions::input::run(&request, &path, &github, &git).await?;
            write_response(&response)
        }
        Command::Out { path } => {
            let request: actions::output::OutRequest = read_request()?;
            let github = github::GitHubClient::from_source(&request.source)?;
            let env = |name: &str| std::env::var(name).ok();
            let response = actions::output::run(&request, &path, &github, &env).await?;
            write_response(&response)
        }
    }
}

fn read_request<T: DeserializeOwned>() -> Result<T, ResourceError> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|source| ResourceError::Io {
            context: "failed to read request from stdin".to_string(),
            source,
        })?;
    debug!(bytes = input.len(), "read request");
    parse_request(&input)
}

fn parse_request<T: DeserializeOwned>(input: &str) -> Result<T, ResourceError> {
    serde_json::from_str(input).map_err(|source| ResourceError::Json {
        context: "invalid request".to_string(),
        source,
    })
}

fn write_response<T: Serialize>(response: &T) -> Result<(), ResourceError> {
    let json = serde_json::to_string_pretty(response).map_err(|source| ResourceError::Json {
        context: "failed to serialize response".to_string(),
        source,
    })?;
    println!("{json}");
    Ok(())
}
