//! tekcheck CLI - static validation of Tekton documents

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use tekcheck::config::{parse_params, Settings};
use tekcheck::{exit_code, FixSuggestion, TekError, ValidationReport, Validator};

#[derive(Parser)]
#[command(name = "tekcheck")]
#[command(about = "Static validation of Tekton Pipelines, PipelineRuns and Tasks")]
#[command(version)]
struct Cli {
    /// Log resolution and validation progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.config/tekcheck/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate one or more Pipeline, PipelineRun or Task files
    Validate(ValidateArgs),
}

#[derive(Args)]
struct ValidateArgs {
    /// Files to validate
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Runtime parameter substituted for $(params.<key>) (repeatable)
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Pipelines-as-Code value substituted for {{ key }} (repeatable)
    #[arg(long = "pac-param", value_name = "KEY=VALUE")]
    pac_params: Vec<String>,

    /// Directory searched for Tasks and Pipelines referenced by name
    #[arg(long)]
    task_dir: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Print the document with parameters substituted and tasks inlined
    #[arg(long)]
    print_resolved: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match cli.command {
        Commands::Validate(args) => match validate(args, cli.config.as_deref()).await {
            Ok(code) => code,
            Err(e) => {
                print_error(&e);
                e.exit_code()
            }
        },
    };
    std::process::exit(code);
}

/// `warn` by default, `debug` with --verbose; RUST_LOG wins over both.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_settings(config: Option<&Path>) -> Result<Settings, TekError> {
    let settings = match config {
        Some(path) if !path.exists() => {
            return Err(TekError::Config {
                reason: format!("config file {} does not exist", path.display()),
            })
        }
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    Ok(settings.with_env())
}

async fn validate(args: ValidateArgs, config: Option<&Path>) -> Result<i32, TekError> {
    let mut settings = load_settings(config)?;
    if let Some(dir) = args.task_dir {
        settings.task_dir = Some(dir);
    }
    let runtime_params = parse_params(&args.params)?;
    let pac_params = parse_params(&args.pac_params)?;
    for (key, value) in &runtime_params {
        tracing::info!(%key, %value, "Using runtime parameter");
    }

    let validator = Validator::from_settings(&settings)
        .with_runtime_params(runtime_params)
        .with_pac_params(pac_params)
        .with_print_resolved(args.print_resolved);

    let mut code = 0;
    for (path, result) in validator.validate_files(&args.files).await {
        let printed = match args.format {
            OutputFormat::Text => print_text(&path, &result),
            OutputFormat::Json => print_json(&path, &result),
        };
        if let Err(e) = printed {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            code = code.max(1);
        }
        code = code.max(exit_code(&result));
    }
    Ok(code)
}

fn print_text(path: &Path, result: &Result<ValidationReport, TekError>) -> anyhow::Result<()> {
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} {}", path.display().to_string().bold(), "failed".red());
            print_error(e);
            return Ok(());
        }
    };

    let kind = report.kind.as_deref().unwrap_or("document");
    if report.is_valid() {
        println!(
            "{} {} is a valid {} ({} tasks)",
            "✓".green(),
            report.file_path,
            kind,
            report.task_count
        );
    } else {
        println!(
            "{} {} has {} error(s)",
            "✗".red(),
            report.file_path,
            report.len()
        );
        for error in report.errors() {
            println!("  {} {}", "✗".red(), error);
            if let Some(suggestion) = error.suggestion() {
                println!("    {} {}", "Fix:".yellow(), suggestion);
            }
        }
    }

    if let Some(resolved) = &report.resolved {
        let yaml = serde_yaml::to_string(resolved)
            .with_context(|| format!("serializing resolved document for {}", report.file_path))?;
        println!("---\n{}", yaml.trim_end());
    }
    Ok(())
}

fn print_json(path: &Path, result: &Result<ValidationReport, TekError>) -> anyhow::Result<()> {
    let value = match result {
        Ok(report) => {
            let mut value = report.to_json();
            if let Some(resolved) = &report.resolved {
                value["resolved"] = serde_json::to_value(resolved)
                    .context("converting resolved document to JSON")?;
            }
            value
        }
        Err(e) => serde_json::json!({
            "file": path.display().to_string(),
            "valid": false,
            "fatal": e.to_string(),
            "exit_code": e.exit_code(),
        }),
    };
    println!("{}", serde_json::to_string(&value).context("serializing report")?);
    Ok(())
}

fn print_error(e: &TekError) {
    eprintln!("{} {}", "Error:".red().bold(), e);
    if let Some(suggestion) = e.fix_suggestion() {
        eprintln!("  {} {}", "Fix:".yellow(), suggestion);
    }
}
