use std::io::IsTerminal;
use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use phenopacket_ingest::app::{
    App, DownloadOptions, ExtractOptions, PipelineOptions, ProgressSink, ProgressSinkKind,
    TransformOptions,
};
use phenopacket_ingest::config::ConfigLoader;
use phenopacket_ingest::error::IngestError;
use phenopacket_ingest::extract::ExtractPolicy;
use phenopacket_ingest::output::{JsonOutput, OutputMode};
use phenopacket_ingest::registry::GithubHttpClient;
use phenopacket_ingest::store::Store;
use phenopacket_ingest::tui::Tui;

#[derive(Parser)]
#[command(name = "phenopacket-ingest")]
#[command(about = "Ingest phenopacket-store releases into Biolink KGX nodes and edges")]
#[command(version, author)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "JSON manifest (defaults to ./phenopacket-ingest.json when present)"
    )]
    config: Option<String>,

    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download the phenopacket-store release archive")]
    Download(DownloadArgs),
    #[command(about = "Extract the archive into a JSONL file")]
    Extract(ExtractArgs),
    #[command(about = "Transform the JSONL file into KGX nodes and edges")]
    Transform(TransformArgs),
    #[command(about = "Post-process the KGX output (no-op)")]
    Postprocess,
    #[command(about = "Run download, extract, transform and postprocess")]
    Pipeline(PipelineArgs),
}

#[derive(Args, Clone, Default)]
struct DownloadArgs {
    #[arg(long)]
    force: bool,

    #[arg(long)]
    no_cache: bool,

    #[arg(long, help = "Release tag to fetch instead of the latest release")]
    release: Option<String>,
}

#[derive(Args, Clone, Default)]
struct ExtractArgs {
    #[arg(long, help = "Re-extract even when the JSONL file exists")]
    force: bool,

    #[arg(long, help = "Abort on the first entry that is not a valid phenopacket")]
    strict: bool,
}

#[derive(Args, Clone, Default)]
struct TransformArgs {
    #[arg(long)]
    output_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    row_limit: Option<usize>,

    #[arg(long, help = "Alias of --row-limit that takes precedence over it")]
    limit: Option<usize>,
}

#[derive(Args, Clone, Default)]
struct PipelineArgs {
    #[command(flatten)]
    download: DownloadArgs,

    #[arg(long, help = "Re-extract even when the archive did not change")]
    force_extract: bool,

    #[arg(long)]
    strict: bool,

    #[command(flatten)]
    transform: TransformArgs,
}

impl DownloadArgs {
    fn options(&self) -> DownloadOptions {
        DownloadOptions {
            force: self.force,
            no_cache: self.no_cache,
        }
    }
}

impl ExtractArgs {
    fn options(&self) -> ExtractOptions {
        ExtractOptions {
            force: self.force,
            policy: if self.strict {
                ExtractPolicy::Abort
            } else {
                ExtractPolicy::Skip
            },
        }
    }
}

impl TransformArgs {
    fn options(&self) -> TransformOptions {
        TransformOptions {
            output_dir: self.output_dir.clone(),
            row_limit: self.limit.or(self.row_limit),
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<IngestError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &IngestError) -> u8 {
    match error {
        IngestError::ArchiveNotFound(_) | IngestError::JsonlNotFound(_) => 2,
        IngestError::GithubHttp(_)
        | IngestError::GithubStatus { .. }
        | IngestError::ReleaseResolution(_)
        | IngestError::DownloadHttp(_)
        | IngestError::DownloadStatus { .. } => 3,
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
    let output_mode = if cli.non_interactive || !std::io::stdout().is_terminal() {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Commands::Download(DownloadArgs {
        release: Some(tag), ..
    })
    | Commands::Pipeline(PipelineArgs {
        download: DownloadArgs {
            release: Some(tag), ..
        },
        ..
    }) = &cli.command
    {
        config.download.release_tag = Some(tag.parse()?);
    }

    let store = Store::new()?;
    let cache_root = store.cache_root().to_path_buf();
    let mut client = GithubHttpClient::new(config.download.timeout)?;
    if let Ok(api_base) = std::env::var("GITHUB_API_URL") {
        client = client.with_api_base(api_base.trim_end_matches('/'));
    }
    let app = App::new(store, client, config);

    match cli.command {
        Commands::Download(args) => {
            let options = args.options();
            let result = run_step(
                ProgressSinkKind::Download,
                &cache_root,
                output_mode,
                move |sink| app.download(options, sink),
            )?;
            let line = format!("download: {} ({})", result.release_tag, result.action);
            report(output_mode, &result, &line)
        }
        Commands::Extract(args) => {
            let options = args.options();
            let result = run_step(
                ProgressSinkKind::Extract,
                &cache_root,
                output_mode,
                move |sink| app.extract(options, sink),
            )?;
            let written = result.summary.as_ref().map_or(0, |s| s.written);
            report(
                output_mode,
                &result,
                &format!("extract: {} ({}, {written} records)", result.output, result.action),
            )
        }
        Commands::Transform(args) => {
            let options = args.options();
            let result = run_step(
                ProgressSinkKind::Transform,
                &cache_root,
                output_mode,
                move |sink| app.transform(options, sink),
            )?;
            let summary = &result.summary;
            let line = format!(
                "transform: {} records -> {} nodes, {} edges",
                summary.records, summary.nodes, summary.edges
            );
            report(output_mode, &result, &line)
        }
        Commands::Postprocess => {
            let result = app.postprocess(&JsonOutput)?;
            report(output_mode, &result, "postprocess: noop")
        }
        Commands::Pipeline(args) => {
            let options = PipelineOptions {
                download: args.download.options(),
                extract: ExtractArgs {
                    force: args.force_extract,
                    strict: args.strict,
                }
                .options(),
                transform: args.transform.options(),
            };
            let result = run_step(
                ProgressSinkKind::Pipeline,
                &cache_root,
                output_mode,
                move |sink| app.pipeline(options, sink),
            )?;
            let summary = &result.transform.summary;
            let line = format!(
                "pipeline: release {} -> {} records -> {} nodes, {} edges",
                result.download.release_tag, summary.records, summary.nodes, summary.edges
            );
            report(output_mode, &result, &line)
        }
    }
}

fn run_step<R, F>(
    kind: ProgressSinkKind,
    cache_root: &Utf8Path,
    output_mode: OutputMode,
    step: F,
) -> miette::Result<R>
where
    F: FnOnce(&dyn ProgressSink) -> Result<R, IngestError> + Send + 'static,
    R: Send + 'static,
{
    match output_mode {
        OutputMode::NonInteractive => Ok(step(&JsonOutput)?),
        OutputMode::Interactive => Tui::new(kind, cache_root).run(step),
    }
}

fn report<T: Serialize>(output_mode: OutputMode, result: &T, line: &str) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print(result).into_diagnostic(),
        OutputMode::Interactive => {
            println!("\x1b[32m✔ {line}\x1b[0m");
            Ok(())
        }
    }
}
