use anyhow::{bail, Context, Result};
use boc_core::features::{bag_of_concepts, bag_of_words};
use boc_core::persist::{load_data_source, load_json, save_index, save_json};
use boc_core::store::{ConceptCorpusBuilder, PageSource, SledConceptStore};
use boc_core::{ConceptRanker, CorpusConfig, FeatureConfig, RankerConfig, TermIndex, TermIndexOptions, Tokenizer};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "boc-indexer")]
#[command(about = "Build term indexes and concept stores, rank concepts, export features", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Model {
    Bow,
    Boc,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every text file under a directory into a term index snapshot
    Terms {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Drop terms found in fewer than this share of documents
        #[arg(long)]
        min_frequency: Option<f64>,
        /// Drop terms found in more than this share of documents
        #[arg(long)]
        max_frequency: Option<f64>,
        /// Fold case of terms and document keys
        #[arg(long, default_value_t = false)]
        fold_case: bool,
        #[arg(long, default_value_t = false)]
        no_stem: bool,
    },
    /// Build a concept store from JSONL pages ({"name", "text", "links"?})
    Concepts {
        /// Input path (file or directory of .jsonl files)
        #[arg(long)]
        input: PathBuf,
        /// Output store directory
        #[arg(long)]
        output: PathBuf,
        /// Corpus settings (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        no_stem: bool,
    },
    /// Rank the concepts of a text and print them as JSON
    Query {
        #[arg(long)]
        store: PathBuf,
        /// Text to rank; read from --file when absent
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value_t = 10)]
        k: usize,
        /// Ranker settings (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Export a labelled feature matrix
    Features {
        /// Labels file: {"path": "label" | null}
        #[arg(long)]
        labels: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = Model::Bow)]
        model: Model,
        /// Concept store, required for --model boc
        #[arg(long)]
        store: Option<PathBuf>,
        /// Feature settings (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Ranker settings for --model boc (JSON)
        #[arg(long)]
        ranker_config: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct QueryOutput {
    terms: Vec<String>,
    results: Vec<QueryHit>,
}

#[derive(Serialize)]
struct QueryHit {
    page_id: u32,
    name: String,
    weight: f64,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Terms { input, output, min_frequency, max_frequency, fold_case, no_stem } => {
            build_terms(&input, &output, min_frequency, max_frequency, fold_case, no_stem)
        }
        Commands::Concepts { input, output, config, no_stem } => build_concepts(&input, &output, config.as_deref(), no_stem),
        Commands::Query { store, text, file, title, k, config } => {
            let text = match (text, file) {
                (Some(text), _) => text,
                (None, Some(file)) => fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?,
                (None, None) => bail!("either --text or --file is required"),
            };
            query(&store, &text, title.as_deref(), k, config.as_deref())
        }
        Commands::Features { labels, output, model, store, config, ranker_config } => {
            features(&labels, &output, model, store.as_deref(), config.as_deref(), ranker_config.as_deref())
        }
    }
}

fn config_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(p) => load_json(p).with_context(|| format!("loading config {}", p.display())),
        None => Ok(T::default()),
    }
}

fn tokenizer(no_stem: bool) -> Tokenizer {
    if no_stem { Tokenizer::plain() } else { Tokenizer::default() }
}

fn collect_files(input: &Path, extension: Option<&str>) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if !p.is_file() {
                continue;
            }
            let matches = match extension {
                Some(want) => p.extension().and_then(|s| s.to_str()) == Some(want),
                None => true,
            };
            if matches {
                files.push(p.to_path_buf());
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

fn build_terms(
    input: &Path,
    output: &Path,
    min_frequency: Option<f64>,
    max_frequency: Option<f64>,
    fold_case: bool,
    no_stem: bool,
) -> Result<()> {
    let tokenizer = tokenizer(no_stem);
    let mut index = TermIndex::with_options(TermIndexOptions { fold_case, ..TermIndexOptions::default() });

    let files = collect_files(input, None);
    for file in &files {
        let text = match fs::read_to_string(file) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %file.display(), error = %e, "unreadable document, skipping");
                continue;
            }
        };
        let key = file.strip_prefix(input).unwrap_or(file).display().to_string();
        for term in tokenizer.terms(&text) {
            index.add_term_occurrence(&term, &key);
        }
    }
    tracing::info!(files = files.len(), terms = index.term_count(), documents = index.document_count(), "ingested documents");

    let mut extra = serde_json::Map::new();
    extra.insert("source".into(), serde_json::json!(input.display().to_string()));
    if min_frequency.is_some() || max_frequency.is_some() {
        let (min, max) = (min_frequency.unwrap_or(0.0), max_frequency.unwrap_or(1.0));
        let removed = index.prune(min, max);
        tracing::info!(removed, "pruned term index");
        extra.insert("min_frequency".into(), serde_json::json!(min));
        extra.insert("max_frequency".into(), serde_json::json!(max));
    }

    save_index(output, &index, extra)?;
    Ok(())
}

fn build_concepts(input: &Path, output: &Path, config: Option<&Path>, no_stem: bool) -> Result<()> {
    let config: CorpusConfig = config_or_default(config)?;
    let mut builder = ConceptCorpusBuilder::new(config, tokenizer(no_stem));

    let added = ingest_pages(&collect_files(input, Some("jsonl")), &mut builder);
    tracing::info!(added, "ingested concept pages");

    let corpus = builder.build();
    SledConceptStore::import(output, &corpus)?;
    tracing::info!(output = %output.display(), "concept store build complete");
    Ok(())
}

/// Feed every JSONL page line to `builder`. Unreadable files and malformed
/// lines are skipped with a warning. Returns how many pages were added.
fn ingest_pages(files: &[PathBuf], builder: &mut ConceptCorpusBuilder) -> usize {
    let mut added = 0;
    for file in files {
        let f = match File::open(file) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(path = %file.display(), error = %e, "unreadable page dump, skipping");
                continue;
            }
        };
        for (n, line) in BufReader::new(f).split(b'\n').enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(path = %file.display(), line = n + 1, error = %e, "read failed, skipping rest of file");
                    break;
                }
            };
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<PageSource>(&line) {
                Ok(source) => {
                    if builder.add_source(&source).is_some() {
                        added += 1;
                    }
                }
                Err(e) => tracing::warn!(path = %file.display(), line = n + 1, error = %e, "malformed page, skipping"),
            }
        }
    }
    added
}

fn query(store: &Path, text: &str, title: Option<&str>, k: usize, config: Option<&Path>) -> Result<()> {
    let config: RankerConfig = config_or_default(config)?;
    let store = SledConceptStore::open(store)?;
    let ranker = ConceptRanker::new(&store, store.tokenizer()?, config);

    let output = match ranker.word_concepts(text, title)? {
        Some(found) => QueryOutput {
            terms: found.terms,
            results: found
                .results
                .into_iter()
                .take(k)
                .map(|r| QueryHit { page_id: r.page_id, name: r.page_name, weight: r.weight })
                .collect(),
        },
        None => QueryOutput { terms: Vec::new(), results: Vec::new() },
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn features(
    labels: &Path,
    output: &Path,
    model: Model,
    store: Option<&Path>,
    config: Option<&Path>,
    ranker_config: Option<&Path>,
) -> Result<()> {
    let data = load_data_source(labels).with_context(|| format!("loading labels {}", labels.display()))?;
    let config: FeatureConfig = config_or_default(config)?;

    let features = match model {
        Model::Bow => bag_of_words(&data, &Tokenizer::default(), &config)?,
        Model::Boc => {
            let Some(store) = store else { bail!("--store is required for --model boc") };
            let store = SledConceptStore::open(store)?;
            let ranker = ConceptRanker::new(&store, store.tokenizer()?, config_or_default(ranker_config)?);
            bag_of_concepts(&data, &ranker, &config)?
        }
    };
    save_json(output, &features)?;
    tracing::info!(output = %output.display(), positives = features.positives(), "feature export complete");
    Ok(())
}
