//! Veil CLI - runs the secret-state analysis over a contract AST

mod config;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use ariadne::{Color, Label, Report, ReportKind, Source};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use veil_analysis::{analyse, Analysis, AnalysisError};
use veil_ast::Ast;

use config::Config;

#[derive(Parser)]
#[command(name = "veil")]
#[command(about = "Secret-state analysis for privacy-annotated contracts", long_about = None)]
struct Cli {
    /// Config file (defaults to ./veil.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse an AST and print one line per contract
    Check {
        /// The annotated AST as JSON
        file: PathBuf,
        /// Original contract source, for error snippets
        #[arg(short, long)]
        source: Option<PathBuf>,
        /// Report style advisories too
        #[arg(long)]
        pedantic: bool,
    },
    /// Print the per-function indicator summary as JSON
    Indicators {
        file: PathBuf,
        /// Pretty print the output
        #[arg(short, long)]
        pretty: bool,
    },
    /// Write the AST back out with the analysis annotations on it
    Annotate {
        file: PathBuf,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut config = match Config::discover(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    init_logging(&config);

    match cli.command {
        Commands::Check {
            file,
            source,
            pedantic,
        } => {
            config.analysis.pedantic |= pedantic;
            cmd_check(&file, source.as_deref(), &config)
        }
        Commands::Indicators { file, pretty } => cmd_indicators(&file, pretty, &config),
        Commands::Annotate { file, output } => cmd_annotate(&file, output.as_deref(), &config),
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_level.as_deref().unwrap_or("warn"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_file(file: &Path) -> String {
    match fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {}", file.display(), e);
            process::exit(1);
        }
    }
}

/// Load and analyse, or report the failure and exit
fn run(file: &Path, source: Option<&Path>, config: &Config) -> Analysis {
    let json = read_file(file);
    let ast = match Ast::from_json_str(&json) {
        Ok(ast) => ast,
        Err(e) => {
            eprintln!("✗ {} - [{}] {}", file.display(), e.code(), e);
            process::exit(1);
        }
    };
    debug!(nodes = ast.len(), file = %file.display(), "ingested");
    match analyse(ast, config.analysis.clone()) {
        Ok(analysis) => analysis,
        Err(e) => {
            match source {
                Some(path) => report_analysis_error(&read_file(path), path, &e),
                None => print_analysis_error(file, &e),
            }
            process::exit(1);
        }
    }
}

fn cmd_check(file: &Path, source: Option<&Path>, config: &Config) {
    let analysis = run(file, source, config);
    for warning in analysis.warnings() {
        match warning.src {
            Some(src) => eprintln!("warning[{}] at {}: {}", warning.code, src, warning.message),
            None => eprintln!("warning[{}]: {}", warning.code, warning.message),
        }
    }

    let summary = analysis.summary();
    for contract in &summary.contracts {
        let secrets = summary
            .secret_states
            .iter()
            .filter(|s| s.contract == contract.name)
            .count();
        let proving = contract
            .functions
            .iter()
            .filter(|f| f.requirements.zk_snark_verification_required)
            .count();
        println!(
            "✓ {} - {} functions ({} proved), {} secret states",
            contract.name,
            contract.functions.len(),
            proving,
            secrets
        );
    }
}

fn cmd_indicators(file: &Path, pretty: bool, config: &Config) {
    let summary = run(file, None, config).summary();
    let json = if pretty {
        serde_json::to_string_pretty(&summary)
    } else {
        serde_json::to_string(&summary)
    };
    match json {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error encoding summary: {}", e);
            process::exit(1);
        }
    }
}

fn cmd_annotate(file: &Path, output: Option<&Path>, config: &Config) {
    let annotated = run(file, None, config).annotated_json();
    let json = match serde_json::to_string_pretty(&annotated) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error encoding annotated AST: {}", e);
            process::exit(1);
        }
    };
    match output {
        Some(out_path) => {
            if let Err(e) = fs::write(out_path, json) {
                eprintln!("Error writing {}: {}", out_path.display(), e);
                process::exit(1);
            }
            println!("Annotated AST written to {}", out_path.display());
        }
        None => println!("{}", json),
    }
}

fn print_analysis_error(file: &Path, error: &AnalysisError) {
    eprintln!("✗ {} - [{}] {}", file.display(), error.code(), error);
    if let Some(src) = error.src() {
        eprintln!("  at {}", src);
    }
    for reason in error.reasons() {
        eprintln!("  {} ({})", reason.text, reason.src);
    }
}

fn report_analysis_error(source: &str, file: &Path, error: &AnalysisError) {
    let name = file.to_string_lossy().to_string();
    let Some(src) = error.src() else {
        print_analysis_error(file, error);
        return;
    };
    let clamp = |offset: usize| offset.min(source.len());
    let mut report = Report::build(ReportKind::Error, name.clone(), clamp(src.start))
        .with_code(error.code())
        .with_message(error.to_string())
        .with_label(
            Label::new((name.clone(), clamp(src.start)..clamp(src.end())))
                .with_message(error.to_string())
                .with_color(Color::Red),
        );
    for reason in error.reasons().iter().filter(|r| !r.src.is_dummy()) {
        report = report.with_label(
            Label::new((name.clone(), clamp(reason.src.start)..clamp(reason.src.end())))
                .with_message(&reason.text)
                .with_color(Color::Yellow),
        );
    }
    if report
        .finish()
        .eprint((name, Source::from(source)))
        .is_err()
    {
        print_analysis_error(file, error);
    }
}
