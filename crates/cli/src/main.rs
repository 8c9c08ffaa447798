mod cmd;
mod util;

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use argp::FromArgs;
use preview_pages_core::config::Config;
use preview_pages_github::GitHub;
use preview_pages_jobs::JobContext;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::util::native_path;

#[derive(FromArgs, PartialEq, Debug)]
/// Collects preview builds of branches and pull requests and keeps their PR comments current.
struct TopLevel {
    #[argp(subcommand)]
    command: SubCommand,
    #[argp(option, short = 'c', default = "PathBuf::from(\"config.yml\")", from_str_fn(native_path))]
    /// configuration file (default: config.yml)
    config: PathBuf,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand)]
enum SubCommand {
    Collect(cmd::collect::Args),
    Comment(cmd::comment::Args),
    Run(cmd::run::Args),
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    let args: TopLevel = argp::parse_args_or_exit(argp::DEFAULT);
    let config = load_config(&args.config)?;
    let github = GitHub::new(&config.github, &config.repository)
        .await
        .context("Failed to create GitHub client")?;
    let ctx = JobContext { config: Arc::new(config.preview), forge: github };

    match args.command {
        SubCommand::Collect(c_args) => cmd::collect::run(&ctx, c_args).await,
        SubCommand::Comment(c_args) => cmd::comment::run(&ctx, c_args).await,
        SubCommand::Run(c_args) => cmd::run::run(&ctx, c_args).await,
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let file = BufReader::new(
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
    );
    serde_yaml::from_reader(file).with_context(|| format!("Failed to parse {}", path.display()))
}
