use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_ingest::app::{App, PrepareOptions};
use kira_ingest::config::{ConfigLoader, ResolvedConfig};
use kira_ingest::domain::{DatasetName, DatasetVariant};
use kira_ingest::download::HttpDownloader;
use kira_ingest::error::IngestError;
use kira_ingest::output::{JsonOutput, OutputMode, TextOutput};
use kira_ingest::store::Store;
use kira_ingest::uniprot::UniprotSequenceClient;

#[derive(Parser)]
#[command(name = "kira-ingest")]
#[command(about = "Download and prepare protein datasets as keyed JSON-lines records")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download sources and generate records for a dataset")]
    Prepare(PrepareArgs),
    #[command(about = "List prepared datasets")]
    List,
    #[command(about = "Show prepared dataset info")]
    Info(InfoArgs),
}

#[derive(Args)]
struct PrepareArgs {
    dataset: DatasetName,

    #[arg(long)]
    variant: Option<DatasetVariant>,

    #[arg(long)]
    max_batch_size: Option<usize>,

    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct InfoArgs {
    dataset: DatasetName,

    #[arg(long)]
    variant: Option<DatasetVariant>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<IngestError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &IngestError) -> u8 {
    match error {
        IngestError::DatasetNotFound(_)
        | IngestError::ConfigRead(_)
        | IngestError::ConfigParse(_)
        | IngestError::InvalidConfig(_) => 2,
        err if err.is_remote() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Commands::Prepare(PrepareArgs {
        max_batch_size: Some(size),
        ..
    }) = &cli.command
    {
        config.sequences.max_batch_size = *size;
    }
    let app = build_app(config)?;

    match cli.command {
        Commands::Prepare(args) => {
            let options = PrepareOptions {
                variant: args.variant,
                force: args.force,
            };
            match output_mode {
                OutputMode::NonInteractive => {
                    let result = app.prepare(args.dataset, options, &JsonOutput)?;
                    JsonOutput::print_prepare(&result).into_diagnostic()?;
                }
                OutputMode::Interactive => {
                    let result = app.prepare(args.dataset, options, &TextOutput)?;
                    TextOutput::print_prepare(&result);
                }
            }
        }
        Commands::List => match output_mode {
            OutputMode::NonInteractive => {
                JsonOutput::print_list(&app.list(&JsonOutput)?).into_diagnostic()?;
            }
            OutputMode::Interactive => TextOutput::print_list(&app.list(&TextOutput)?),
        },
        Commands::Info(args) => match output_mode {
            OutputMode::NonInteractive => {
                let result = app.info(args.dataset, args.variant, &JsonOutput)?;
                JsonOutput::print_info(&result).into_diagnostic()?;
            }
            OutputMode::Interactive => {
                TextOutput::print_info(&app.info(args.dataset, args.variant, &TextOutput)?);
            }
        },
    }
    Ok(())
}

fn build_app(
    config: ResolvedConfig,
) -> Result<App<HttpDownloader, UniprotSequenceClient>, IngestError> {
    let store = Store::new(config.data_dir.clone());
    let downloader =
        HttpDownloader::new(config.download_dir.clone(), config.sequences.retry_policy())?;
    let fetcher = UniprotSequenceClient::new(&config.sequences)?;
    Ok(App::new(store, config, downloader, fetcher))
}
