#![forbid(unsafe_code)]

//! draftcanvas CLI - turn LLM diagram responses into canvas elements.
//!
//! # Commands
//!
//! - `parse`: Run the full pipeline and print renderer-ready elements
//! - `extract`: Print the JSON array payload found in a response
//! - `check`: Report diagnostics and fail when nothing is renderable

use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dc_core::{DebugConfig, Diagnostic, DiagnosticCounts, ParserConfig, RenderElement};
use dc_parser::{CanvasParseResult, CanvasParser, extract_array_payload, parse_evidence_json};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

/// draftcanvas CLI - turn LLM diagram responses into canvas elements.
#[derive(Debug, Parser)]
#[command(
    name = "draftcanvas",
    version,
    about = "Turn LLM diagram responses into canvas elements",
    long_about = "Extracts the JSON element array from a model response, repairs common\n\
        formatting damage, validates and sanitizes every element, and emits\n\
        Excalidraw-compatible primitives."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging (can be repeated for more detail: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log informational and warning diagnostics (same as CANVAS_DEBUG=1)
    #[arg(long, global = true)]
    debug: bool,

    /// TOML file with parser settings
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a response and print its canvas elements as JSON.
    Parse {
        /// Input file path, "-" for stdin, or inline response text.
        #[arg(default_value = "-")]
        input: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Print a parse summary instead of the elements
        #[arg(long, conflicts_with = "scene")]
        summary: bool,

        /// Wrap the elements in an Excalidraw scene document
        #[arg(long)]
        scene: bool,

        /// Output file path. If omitted, writes to stdout.
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Print the JSON array payload found in a response.
    Extract {
        /// Input file path, "-" for stdin, or inline response text.
        #[arg(default_value = "-")]
        input: String,

        /// Output file path. If omitted, writes to stdout.
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Check a response and report diagnostics.
    Check {
        /// Input file path, "-" for stdin, or inline response text.
        #[arg(default_value = "-")]
        input: String,

        /// Output as JSON (structured diagnostics)
        #[arg(long)]
        json: bool,

        /// Exit with non-zero status on warnings or dropped elements
        #[arg(long)]
        strict: bool,
    },
}

/// Result of checking a response.
#[derive(Debug, Serialize)]
struct CheckReport {
    passed: bool,
    renderable: bool,
    element_count: usize,
    source_count: usize,
    dropped_count: usize,
    strategy: Option<&'static str>,
    counts: DiagnosticCounts,
    diagnostics: Vec<Diagnostic>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref(), cli.debug)?;
    init_tracing(cli.verbose, cli.quiet, config.debug.enabled);
    debug!(?config, "Loaded parser config");

    match cli.command {
        Command::Parse {
            input,
            pretty,
            summary,
            scene,
            output,
        } => cmd_parse(&input, config, pretty, summary, scene, output.as_deref()),

        Command::Extract { input, output } => cmd_extract(&input, output.as_deref()),

        Command::Check {
            input,
            json,
            strict,
        } => cmd_check(&input, config, json, strict),
    }
}

fn init_tracing(verbose: u8, quiet: bool, debug: bool) {
    let filter = tracing_filter(verbose, quiet, debug);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .try_init();
}

fn tracing_filter(verbose: u8, quiet: bool, debug: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match (verbose, debug) {
        (0, false) => "warn",
        (0 | 1, _) => "info",
        (2, _) => "debug",
        _ => "trace",
    }
}

/// Settings precedence: `--debug`, then `CANVAS_DEBUG`, then the config file,
/// then built-in defaults.
fn load_config(path: Option<&str>, force_debug: bool) -> Result<ParserConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .context(format!("Failed to read config: {path}"))?;
            let mut config: ParserConfig =
                toml::from_str(&text).context(format!("Invalid config: {path}"))?;
            let env_flag = std::env::var(DebugConfig::ENV_VAR).ok();
            if let Some(debug) = DebugConfig::from_flag(env_flag.as_deref()) {
                config.debug = debug;
            }
            config
        }
        None => ParserConfig::from_env(),
    };
    if force_debug {
        config.debug = DebugConfig::enabled();
    }
    Ok(config)
}

fn load_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        Ok(buffer)
    } else if Path::new(input).exists() {
        std::fs::read_to_string(input).context(format!("Failed to read file: {input}"))
    } else {
        // Treat as inline response text
        Ok(input.to_string())
    }
}

fn write_output(output: Option<&str>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content).context(format!("Failed to write to: {path}"))?;
            info!("Wrote output to: {path}");
        }
        None => {
            let mut stdout = io::stdout();
            stdout
                .write_all(content.as_bytes())
                .and_then(|()| stdout.write_all(b"\n"))
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(text)
}

// =============================================================================
// Command: parse
// =============================================================================

fn cmd_parse(
    input: &str,
    config: ParserConfig,
    pretty: bool,
    summary: bool,
    scene: bool,
    output: Option<&str>,
) -> Result<()> {
    let source = load_input(input)?;
    let parsed = CanvasParser::new(config).parse(&source);

    debug!(
        "Parsed: elements={}, source={}, dropped={}, strategy={:?}",
        parsed.elements.len(),
        parsed.source_count,
        parsed.dropped_count,
        parsed.strategy.map(|strategy| strategy.as_str())
    );

    let rendered = if summary {
        let value: serde_json::Value = serde_json::from_str(&parse_evidence_json(&parsed))?;
        to_json(&value, pretty)?
    } else if scene {
        to_json(&scene_document(&parsed.elements), pretty)?
    } else {
        to_json(&parsed.elements, pretty)?
    };

    write_output(output, &rendered)?;

    info!(
        "Produced {} elements from {} items",
        parsed.elements.len(),
        parsed.source_count
    );

    Ok(())
}

fn scene_document(elements: &[RenderElement]) -> serde_json::Value {
    json!({
        "type": "excalidraw",
        "version": 2,
        "source": "draftcanvas",
        "elements": elements,
        "appState": {
            "viewBackgroundColor": "#ffffff",
            "gridSize": null,
        },
        "files": {},
    })
}

// =============================================================================
// Command: extract
// =============================================================================

fn cmd_extract(input: &str, output: Option<&str>) -> Result<()> {
    let source = load_input(input)?;
    let extracted = extract_array_payload(&source).context("No element array in response")?;

    debug!(
        "Extracted: bytes={}, match={}, decoded={}",
        extracted.payload.len(),
        extracted.matched.as_str(),
        extracted.decoded
    );

    write_output(output, &extracted.payload)
}

// =============================================================================
// Command: check
// =============================================================================

fn cmd_check(input: &str, config: ParserConfig, json_output: bool, strict: bool) -> Result<()> {
    let source = load_input(input)?;
    let parsed = CanvasParser::new(config).parse(&source);
    let report = check_report(parsed, strict);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_check_report(&report);
    }

    if !report.passed {
        std::process::exit(1);
    }

    Ok(())
}

fn check_report(parsed: CanvasParseResult, strict: bool) -> CheckReport {
    let counts = parsed.counts();
    let renderable = !parsed.elements.is_empty();
    let clean = counts.warnings == 0 && parsed.dropped_count == 0;

    CheckReport {
        passed: renderable && (!strict || clean),
        renderable,
        element_count: parsed.elements.len(),
        source_count: parsed.source_count,
        dropped_count: parsed.dropped_count,
        strategy: parsed.strategy.map(|strategy| strategy.as_str()),
        counts,
        diagnostics: parsed.diagnostics,
    }
}

fn print_check_report(report: &CheckReport) {
    if report.passed {
        println!("✓ {} canvas elements", report.element_count);
    } else if report.renderable {
        println!("✗ Response needed repairs");
    } else {
        println!("✗ Nothing renderable");
    }

    println!("  Items: {}", report.source_count);
    println!("  Dropped: {}", report.dropped_count);
    if let Some(strategy) = report.strategy {
        println!("  Strategy: {strategy}");
    }

    let notable: Vec<&Diagnostic> = report
        .diagnostics
        .iter()
        .filter(|diag| diag.is_error() || diag.is_warning())
        .collect();
    if !notable.is_empty() {
        println!("\nDiagnostics:");
        for diag in notable {
            let element = diag
                .element_index
                .map(|index| format!(" #{index}"))
                .unwrap_or_default();
            println!(
                "  [{} {}{}] {}",
                diag.severity.as_str(),
                diag.stage.as_str(),
                element,
                diag.message
            );
        }
    }
}
