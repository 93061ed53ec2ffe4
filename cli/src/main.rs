use anyhow::{bail, Context, Result};
use archivist_core::{
    run_filtered, DocId, DocumentAttributes, ResultOrder, SearchEngine, SearchFilter, TagRef,
};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use time::macros::format_description;
use time::Date;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct ArchiveDoc {
    id: DocId,
    text: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    subcategory: Option<String>,
    #[serde(default)]
    date: Option<Date>,
    #[serde(default)]
    tags: Vec<TagRef>,
    #[serde(default)]
    amount: Option<f64>,
}

#[derive(Parser)]
#[command(name = "archivist")]
#[command(about = "Query a document archive with BM25 ranking and structured filters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a corpus from JSON/JSONL files and run one query against it
    Search {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Free-text query; omit to list by structured filters only
        #[arg(long)]
        query: Option<String>,
        /// Category filter (exact match)
        #[arg(long)]
        category: Option<String>,
        /// Required tags; a document must hold every one
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Inclusive start of the date range (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        from: Option<Date>,
        /// Inclusive end of the date range (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        to: Option<Date>,
        /// Maximum number of results
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Index a corpus and print its statistics
    Stats {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
    },
}

fn parse_date(s: &str) -> Result<Date, String> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(s, &format).map_err(|e| format!("invalid date {s:?}: {e}"))
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            input,
            query,
            category,
            tags,
            from,
            to,
            limit,
        } => {
            let (engine, attrs) = load_corpus(&input)?;
            let filter = SearchFilter {
                query,
                category,
                date_from: from,
                date_to: to,
                tags,
                limit,
                order: ResultOrder::DateDesc,
            };
            let hits = run_filtered(&engine, &attrs, &filter)?;
            if hits.is_empty() {
                println!("no matches");
                return Ok(());
            }
            for hit in hits {
                match hit.score {
                    Some(score) => println!("{:>12}  score {:.4}", hit.doc_id, score),
                    None => println!("{:>12}", hit.doc_id),
                }
            }
            Ok(())
        }
        Commands::Stats { input } => {
            let (engine, _) = load_corpus(&input)?;
            let stats = engine.stats();
            println!("documents: {}", stats.documents);
            println!("terms:     {}", stats.terms);
            Ok(())
        }
    }
}

/// Load every document from a JSON array file, a JSONL file, or a
/// directory walked for both, then build the in-memory index.
fn load_corpus(input: &Path) -> Result<(SearchEngine, HashMap<DocId, DocumentAttributes>)> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("input path {} does not exist", input.display());
    }

    let mut documents: Vec<ArchiveDoc> = Vec::new();
    for file in files {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file, &mut documents)?;
        } else {
            read_json(&file, &mut documents)?;
        }
    }
    tracing::info!(num_docs = documents.len(), "corpus loaded");

    let ids: Vec<DocId> = documents.iter().map(|d| d.id).collect();
    let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
    let engine = SearchEngine::with_defaults();
    engine.add_documents(&ids, &texts)?;

    let attrs = documents
        .into_iter()
        .map(|d| {
            (
                d.id,
                DocumentAttributes {
                    category: d.category,
                    subcategory: d.subcategory,
                    date: d.date,
                    tags: d.tags.into_iter().map(TagRef::into_name).collect(),
                    amount: d.amount,
                },
            )
        })
        .collect();
    Ok((engine, attrs))
}

fn read_jsonl(file: &Path, out: &mut Vec<ArchiveDoc>) -> Result<()> {
    let f = File::open(file).with_context(|| format!("open {}", file.display()))?;
    let reader = BufReader::new(f);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(())
}

fn read_json(file: &Path, out: &mut Vec<ArchiveDoc>) -> Result<()> {
    let f = File::open(file).with_context(|| format!("open {}", file.display()))?;
    let reader = BufReader::new(f);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                out.push(serde_json::from_value(v)?);
            }
        }
        serde_json::Value::Object(_) => {
            out.push(serde_json::from_value(json)?);
        }
        _ => bail!("{}: expected a JSON object or array", file.display()),
    }
    Ok(())
}
