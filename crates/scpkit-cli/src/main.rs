//! scpkit - SCP schema and profile tooling
//!
//! Thin command-line shell over the library crates: write starter schema
//! documents, validate profiles against a schema, and normalize profiles
//! to a canonical full dump.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use scpkit_model::{SchemaDoc, Tree};
use scpkit_wire::{load_document, parse_document, to_xml_with_header, DocumentHeader};

#[derive(Parser, Debug)]
#[command(name = "scpkit")]
#[command(about = "System Configuration Profile schema and document tooling")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a starter schema document
    Template {
        /// Output path for the schema TOML
        #[arg(short, long, default_value = "schema.toml")]
        out: PathBuf,
    },
    /// Parse a profile against a schema and report problems
    Validate {
        /// Schema document (TOML or JSON)
        #[arg(short, long)]
        schema: PathBuf,
        /// Profile XML to validate
        profile: PathBuf,
    },
    /// Re-render a profile as a canonical full dump
    Normalize {
        /// Schema document (TOML or JSON)
        #[arg(short, long)]
        schema: PathBuf,
        /// Profile XML to normalize
        profile: PathBuf,
        /// Stamp a fresh export timestamp instead of preserving the input's
        #[arg(long)]
        restamp: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Template { out } => {
            SchemaDoc::sample()
                .to_file(&out)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Wrote starter schema to {}", out.display());
        }
        Command::Validate { schema, profile } => {
            let report = load_profile(&schema, &profile)?;
            if report.is_clean() {
                println!("OK: {} attributes applied", report.applied);
            } else {
                println!(
                    "{} attributes applied, {} problems:",
                    report.applied,
                    report.skipped.len()
                );
                for problem in &report.skipped {
                    println!("  - {}", problem);
                }
                bail!("profile did not validate cleanly");
            }
        }
        Command::Normalize {
            schema,
            profile,
            restamp,
        } => {
            let content = std::fs::read_to_string(&profile)
                .with_context(|| format!("reading {}", profile.display()))?;
            let document = parse_document(&content)?;
            let header = if restamp {
                DocumentHeader::stamped(document.model.clone(), document.service_tag.clone())
            } else {
                document.header()
            };

            let schema_doc =
                SchemaDoc::from_file(&schema).with_context(|| format!("loading {}", schema.display()))?;
            let mut tree = Tree::new();
            let root = schema_doc.build(&mut tree)?;
            let report = load_document(&mut tree, root, &document)?;
            if !report.is_clean() {
                info!(skipped = report.skipped.len(), "some attributes were skipped");
            }

            let Some(fragment) = tree.render(root, true, false) else {
                bail!("{} renders to an empty document", profile.display());
            };
            println!("{}", to_xml_with_header(&fragment, &header)?);
        }
    }

    Ok(())
}

fn load_profile(schema: &PathBuf, profile: &PathBuf) -> Result<scpkit_wire::LoadReport> {
    let schema_doc =
        SchemaDoc::from_file(schema).with_context(|| format!("loading {}", schema.display()))?;
    let mut tree = Tree::new();
    let root = schema_doc.build(&mut tree)?;
    let content = std::fs::read_to_string(profile)
        .with_context(|| format!("reading {}", profile.display()))?;
    let document = parse_document(&content)?;
    let report = load_document(&mut tree, root, &document)?;
    Ok(report)
}
