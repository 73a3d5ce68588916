use clap::{Parser, Subcommand};
use folio_ingest::config::{self, IngestConfig, Overrides};
use folio_ingest::imaging::{OutputFormat, RustBackend};
use folio_ingest::ingest::{
    self, IngestError, IngestOptions, SourceImage, UploadResult, media_type_for_path,
};
use folio_ingest::output;
use folio_ingest::storage::open_store;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Environment variable holding the log filter (e.g. `folio_ingest=debug`).
const LOG_ENV: &str = "FOLIO_LOG";

/// Flags that override `[images]` in the config file.
#[derive(clap::Args, Clone, Default)]
struct ImageArgs {
    /// Maximum output width in pixels
    #[arg(long)]
    max_width: Option<u32>,

    /// Maximum output height in pixels
    #[arg(long)]
    max_height: Option<u32>,

    /// Encoding quality, 1-100 (out-of-range values are clamped)
    #[arg(long)]
    quality: Option<u32>,

    /// Output format: jpeg or avif
    #[arg(long, value_parser = parse_format)]
    format: Option<OutputFormat>,
}

impl ImageArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            max_width: self.max_width,
            max_height: self.max_height,
            quality: self.quality,
            format: self.format,
        }
    }
}

fn parse_format(name: &str) -> Result<OutputFormat, String> {
    OutputFormat::parse(name).ok_or_else(|| format!("unknown format '{name}' (expected jpeg or avif)"))
}

#[derive(Parser)]
#[command(name = "folio-ingest")]
#[command(about = "Resize, re-encode and upload images for the portfolio")]
#[command(long_about = "\
Resize, re-encode and upload images for the portfolio

Every image goes through the same pipeline:

  validate → decode → resize → encode → upload → public URL

Images are scaled down (never up) to fit the configured bounds, re-encoded
as JPEG or AVIF, and stored under a fresh key of the form

  images/<name>-<unix-millis>-<random>.jpg

Existing objects are never overwritten.

Environment:
  FOLIO_STORAGE_TOKEN   Bearer token for the http storage backend
  FOLIO_LOG             Log filter, e.g. 'debug' or 'folio_ingest=trace'

Run 'folio-ingest gen-config' to generate a documented folio.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct IngestArgs {
    /// Image files or directories (walked recursively)
    paths: Vec<PathBuf>,

    /// Also read one image from standard input
    #[arg(long)]
    stdin: bool,

    /// File name for the stdin image (used for the key and media type)
    #[arg(long, requires = "stdin", default_value = "stdin")]
    name: String,

    /// Media type for the stdin image (default: inferred from --name)
    #[arg(long, requires = "stdin")]
    media_type: Option<String>,

    /// Print one JSON object per image instead of progress lines
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    image: ImageArgs,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Image files or directories (walked recursively)
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    #[command(flatten)]
    image: ImageArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Validate, resize, encode and upload images, printing their public URLs
    Ingest(IngestArgs),
    /// Validate and decode images and show the planned size, without uploading
    Check(CheckArgs),
    /// Print the public URL for a stored key
    Url {
        /// Remote key, e.g. images/dawn-1718000000000-k3x9qa.jpg
        key: String,
    },
    /// Print a stock folio.toml with all options documented
    GenConfig,
}

/// One unit of work for the pool: a file on disk or an image piped on stdin.
enum Input {
    File(PathBuf),
    Stdin { name: String, media_type: String },
}

impl Input {
    fn display_name(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Stdin { name, .. } => name.clone(),
        }
    }

    /// Read the payload, refusing anything over `max_bytes` before buffering it.
    fn load(self, max_bytes: u64) -> Result<SourceImage, IngestError> {
        match self {
            Self::File(path) => SourceImage::from_path(&path, max_bytes),
            Self::Stdin { name, media_type } => {
                SourceImage::from_reader(name, media_type, std::io::stdin().lock(), max_bytes)
            }
        }
    }
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::Ingest(args) => {
            let config = config::load_config_with_overrides(&cli.config, &args.image.overrides())?;
            let mut inputs: Vec<Input> = expand_paths(&args.paths)?
                .into_iter()
                .map(Input::File)
                .collect();
            if args.stdin {
                let media_type = args
                    .media_type
                    .clone()
                    .unwrap_or_else(|| media_type_for_path(Path::new(&args.name)));
                inputs.push(Input::Stdin {
                    name: args.name.clone(),
                    media_type,
                });
            }
            if inputs.is_empty() {
                return Err("no input images (pass paths or --stdin)".into());
            }
            run_ingest(&config, inputs, args.json)
        }
        Command::Check(args) => {
            let config = config::load_config_with_overrides(&cli.config, &args.image.overrides())?;
            run_check(&config, &args.paths)
        }
        Command::Url { key } => {
            let config = config::load_config(&cli.config)?;
            folio_ingest::naming::validate_key(&key)?;
            let store = open_store(&config.storage, None)?;
            println!("{}", store.public_url(&key));
            Ok(ExitCode::SUCCESS)
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_ingest(
    config: &IngestConfig,
    inputs: Vec<Input>,
    json: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    init_thread_pool(&config.processing);
    let token = std::env::var(config::TOKEN_ENV).ok();
    let store = open_store(&config.storage, token)?;
    let backend = RustBackend::new();
    let options = IngestOptions::from_config(config);
    tracing::info!(
        inputs = inputs.len(),
        store = store.name(),
        bounds = %options.bounds,
        format = %options.format,
        "starting ingestion"
    );

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            if !json {
                println!("{}", output::format_event(&event));
            }
        }
    });

    let results: Vec<(String, Result<UploadResult, IngestError>)> = inputs
        .into_par_iter()
        .map_with(tx, |tx, input| {
            let name = input.display_name();
            let result = input
                .load(options.max_source_bytes)
                .and_then(|source| ingest::ingest(&backend, &*store, &source, &options, Some(&*tx)));
            (name, result)
        })
        .collect();
    printer
        .join()
        .map_err(|_| "progress printer thread panicked")?;

    if !json {
        println!();
    }
    let mut failed = 0;
    for (name, result) in &results {
        match result {
            Ok(upload) => output::print_result(name, upload, json),
            Err(e) => {
                failed += 1;
                output::print_failure(name, e, json);
            }
        }
    }
    if !json {
        println!();
        println!("{}", output::format_summary(results.len() - failed, failed));
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_check(config: &IngestConfig, paths: &[PathBuf]) -> Result<ExitCode, Box<dyn std::error::Error>> {
    init_thread_pool(&config.processing);
    let backend = RustBackend::new();
    let options = IngestOptions::from_config(config);

    let files = expand_paths(paths)?;
    let plans: Vec<_> = files
        .into_par_iter()
        .map(|path| {
            let name = path.display().to_string();
            let plan = Input::File(path)
                .load(options.max_source_bytes)
                .and_then(|source| ingest::plan(&backend, &source, &options));
            (name, plan)
        })
        .collect();

    let mut failed = 0;
    for (name, plan) in &plans {
        match plan {
            Ok(plan) => println!("{}", output::format_plan(plan)),
            Err(e) => {
                failed += 1;
                println!("{}", output::format_failure(name, e));
            }
        }
    }
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Expand directories into the files beneath them, in file-name order.
fn expand_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry?;
                if entry.file_type().is_file() && !is_hidden(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Logs go to stderr so stdout stays clean for URLs and `--json`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Never more threads than cores; `max_processes` can only lower the count.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
