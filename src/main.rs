use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use archdraw::{
    read_prompt, read_request, read_text, validate_and_repair, write_response, write_text_file,
    AnthropicClient, AnthropicConfig, DiagramService, ExportConfig, PipelineConfig, RenderFormat,
    Request, Response, StageConfig, ValidationReport,
};

#[derive(Parser)]
#[command(name = "archdraw")]
#[command(author, version, about = "Turn architecture descriptions into draw.io diagrams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a diagram from a description
    Generate {
        /// Architecture description
        #[arg(short, long, conflicts_with = "input")]
        prompt: Option<String>,

        /// File holding the description (stdin when neither is given)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Document file name
        #[arg(long)]
        filename: Option<String>,

        /// Rendered image format (png, pdf, svg, jpg)
        #[arg(long, default_value = "png")]
        format: RenderFormat,

        /// Only write the document, do not run the renderer
        #[arg(long)]
        no_render: bool,

        #[command(flatten)]
        service: ServiceArgs,
    },

    /// Serve one JSON request and print the JSON response
    Request {
        /// Request file (stdin when omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,

        #[command(flatten)]
        service: ServiceArgs,
    },

    /// Validate and repair an existing document without calling the backend
    Validate {
        /// Document to check
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the repaired document
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Args)]
struct ServiceArgs {
    /// Output directory (defaults to the download directory)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Generator attempts before giving up
    #[arg(long, default_value = "3")]
    max_attempts: u32,

    /// Skip the backend fixer pass
    #[arg(long)]
    skip_fixer: bool,

    /// Per-call backend timeout in seconds
    #[arg(long, default_value = "120")]
    timeout_secs: u64,

    /// Model name (overrides ARCHDRAW_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// draw.io executable (overrides DRAWIO_BIN)
    #[arg(long)]
    drawio_bin: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            prompt,
            input,
            filename,
            format,
            no_render,
            service,
        } => {
            setup_logging(service.verbose);
            let prompt = match prompt {
                Some(prompt) => prompt,
                None => read_prompt(input.as_deref())?,
            };
            let request = Request {
                input: prompt,
                filename,
                format,
                render: !no_render,
            };
            serve(build_service(service)?, request).await
        }
        Commands::Request { file, service } => {
            setup_logging(service.verbose);
            let request = read_request(file.as_deref())?;
            serve(build_service(service)?, request).await
        }
        Commands::Validate {
            input,
            output,
            json,
            verbose,
        } => {
            setup_logging(verbose);
            validate_document(input, output, json)
        }
    }
}

fn setup_logging(verbose: bool) {
    let default_filter = if verbose { "archdraw=debug,info" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn build_service(args: ServiceArgs) -> Result<DiagramService> {
    let mut api_config = AnthropicConfig::from_env()?;
    if let Some(model) = args.model {
        api_config.model = model;
    }
    info!("Using model {}", api_config.model);
    let client = AnthropicClient::new(api_config)?;

    let pipeline = PipelineConfig {
        max_attempts: args.max_attempts.max(1),
        use_fixer: !args.skip_fixer,
        stage: StageConfig {
            timeout: Duration::from_secs(args.timeout_secs.max(1)),
        },
    };

    let mut export = ExportConfig::default();
    if let Some(out_dir) = args.out_dir {
        export.out_dir = out_dir;
    }
    if let Some(bin) = args.drawio_bin {
        export.renderer = bin;
    }

    Ok(DiagramService::new(Arc::new(client), pipeline, export))
}

async fn serve(service: DiagramService, request: Request) -> Result<ExitCode> {
    let response = service.handle(request).await;
    write_response(&response, std::io::stdout().lock())?;

    Ok(match response {
        Response::Success { .. } => ExitCode::SUCCESS,
        Response::Failure { .. } => ExitCode::FAILURE,
    })
}

fn validate_document(input: PathBuf, output: Option<PathBuf>, json: bool) -> Result<ExitCode> {
    let candidate = read_text(Some(&input))?;
    let repaired = validate_and_repair(&candidate)
        .with_context(|| format!("Failed to validate {:?}", input))?;

    if let Some(path) = &output {
        write_text_file(path, &repaired.xml)?;
        info!("Repaired document written to {:?}", path);
    }

    let report = ValidationReport::from_repaired(&repaired);
    if json {
        serde_json::to_writer_pretty(std::io::stdout().lock(), &report)
            .context("Failed to write JSON")?;
        println!();
    } else {
        print!("{}", report.format());
    }

    Ok(if repaired.has_content() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
