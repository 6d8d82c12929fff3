//! # Ragline
//!
//! Embedding, vector reindexing, retrieval and bilingual mirroring for RAG collections.
//!
//! Usage:
//!   ragline reindex --chunks data/processed/chunks.json     # Full reindex of the configured collection
//!   ragline reindex --chunks chunks.json --strategy blue-green
//!   ragline vectorize --chunks chunks.json                  # Embed once, save chunks.vectors.json
//!   ragline reindex --chunks chunks.json --vectors chunks.vectors.json
//!   ragline reindex --chunks chunks.json --vectors chunks.vectors.json --resume-from 300
//!   ragline mirror --chunks chunks.json --target es         # Translate, embed and upsert
//!   ragline search "how do I pay my water bill" -k 3 --language es
//!   ragline serve --port 8001                               # POST /embed, POST /search, GET /health

mod context;
mod server;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use ragline_core::config::RaglineConfig;
use ragline_core::error::RaglineError;
use ragline_core::traits::EmbeddingBackend;
use ragline_core::types::EmbedIntent;
use ragline_knowledge::chunk_store::translated_path;
use ragline_knowledge::{
    ChunkStore, EmbedRequest, MirrorOptions, SearchRequest, TranslationFailurePolicy, VectorSet, vectors_path,
};
use ragline_store::{ReindexOptions, ReindexStrategy};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::context::AppContext;

#[derive(Parser)]
#[command(
    name = "ragline",
    version,
    about = "🧭 Ragline — embedding, reindexing and retrieval for RAG collections"
)]
struct Cli {
    /// Config file (default: ~/.ragline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Rebuild a collection from a chunk file with the configured backend
    Reindex {
        /// JSON array of {id, content, metadata}
        #[arg(long)]
        chunks: String,
        /// Target collection (default: vector_store.collection)
        #[arg(long)]
        collection: Option<String>,
        /// in-place or blue-green (default: reindex.strategy)
        #[arg(long)]
        strategy: Option<String>,
        /// Continue an in-place reindex from this committed offset
        #[arg(long)]
        resume_from: Option<usize>,
        /// Pre-computed vectors from `ragline vectorize` (skips embedding)
        #[arg(long)]
        vectors: Option<String>,
        /// Write the report as JSON
        #[arg(long)]
        report: Option<String>,
    },
    /// Embed a chunk file and save the vectors for later reindexing
    Vectorize {
        #[arg(long)]
        chunks: String,
        /// Output file (default: <chunks>.vectors.json next to the input)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Translate source-language chunks and upsert them into the same collection
    Mirror {
        #[arg(long)]
        chunks: String,
        #[arg(long)]
        collection: Option<String>,
        /// Source language (default: translation.source_language)
        #[arg(long)]
        source: Option<String>,
        /// Target language (default: translation.target_language)
        #[arg(long)]
        target: Option<String>,
        /// Leave chunks whose translation failed out of the index
        #[arg(long)]
        skip_failed: bool,
        /// Save translated chunks as chunks_<lang>.json next to the input
        #[arg(long)]
        save_translations: bool,
        #[arg(long)]
        report: Option<String>,
    },
    /// Nearest-neighbour search
    Search {
        query: String,
        #[arg(short, long)]
        k: Option<usize>,
        /// Only return records with this metadata.language
        #[arg(short, long)]
        language: Option<String>,
        #[arg(long)]
        collection: Option<String>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Embed texts and print the vectors as JSON
    Embed {
        #[arg(required = true)]
        texts: Vec<String>,
        /// Embed as stored content instead of as a query
        #[arg(long)]
        document: bool,
        #[arg(long)]
        no_normalize: bool,
    },
    /// Print a collection's count and first record
    Verify {
        #[arg(long)]
        collection: Option<String>,
        /// Fail unless the collection holds exactly this many records
        #[arg(long)]
        expected: Option<usize>,
    },
    /// Check the embedding backend
    Health,
    /// List known embedding backends and models
    Models,
    /// Serve the query contract over HTTP
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn load_config(path: Option<&str>) -> Result<RaglineConfig> {
    let config = match path {
        Some(p) => RaglineConfig::load_from(&expand_path(p))?,
        None => RaglineConfig::load()?,
    };
    Ok(config)
}

fn write_report<T: Serialize>(path: Option<&str>, report: &T) -> Result<()> {
    if let Some(path) = path {
        let path = expand_path(path);
        std::fs::write(&path, serde_json::to_string_pretty(report)?)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("   Report: {}", path.display());
    }
    Ok(())
}

fn load_chunks(path: &str) -> Result<(PathBuf, ChunkStore)> {
    let path = expand_path(path);
    let store = ChunkStore::load(&path)?;
    Ok((path, store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "ragline=debug,ragline_core=debug,ragline_providers=debug,ragline_store=debug,ragline_knowledge=debug,tower_http=debug"
    } else {
        "ragline=info,ragline_core=info,ragline_providers=info,ragline_store=info,ragline_knowledge=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    if let Commands::Init { force } = cli.command {
        let path = cli
            .config
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(RaglineConfig::default_path);
        if path.exists() && !force {
            println!("⚠️  {} already exists (use --force to overwrite).", path.display());
            return Ok(());
        }
        RaglineConfig::default().save_to(&path)?;
        println!("✅ Wrote default config to {}", path.display());
        return Ok(());
    }

    if let Commands::Models = cli.command {
        print_models();
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    config.validate_for(matches!(cli.command, Commands::Mirror { .. }))?;
    let ctx = AppContext::new(config);
    let default_collection = ctx.config().vector_store.collection.clone();

    match cli.command {
        Commands::Init { .. } | Commands::Models => {}

        Commands::Reindex {
            chunks,
            collection,
            strategy,
            resume_from,
            vectors,
            report,
        } => {
            let collection = collection.unwrap_or(default_collection);
            let strategy: ReindexStrategy = strategy
                .as_deref()
                .unwrap_or(&ctx.config().reindex.strategy)
                .parse()?;
            let (chunks_path, chunks) = load_chunks(&chunks)?;
            let options = ReindexOptions { strategy, resume_from };

            let indexer = ctx.indexer().await?;
            let (vectors_file, vector_set) = match vectors.as_deref() {
                Some(p) => {
                    let p = expand_path(p);
                    let set = VectorSet::load(&p)?;
                    (Some(p), set)
                }
                None => (None, indexer.vectorize(chunks.chunks()).await?),
            };
            let skipped = chunks.iter().filter(|c| vector_set.get(&c.id).is_none()).count();

            match indexer
                .reindex_from_vectors(&collection, chunks.chunks(), &vector_set, &options)
                .await
            {
                Ok(result) => {
                    println!("✅ Reindexed '{}'", result.collection);
                    println!("   Records:   {} ({} upserted in {} batches)", result.count, result.upserted, result.batches);
                    println!("   Backend:   {} ({} dims)", indexer.backend().identifier(), result.dimension);
                    if skipped > 0 {
                        println!("   ⚠️  Skipped {skipped} chunks with no vector");
                    }
                    if let Some(id) = &result.sample_id {
                        println!("   Sample id: {id}");
                    }
                    write_report(report.as_deref(), &result)?;
                }
                Err(RaglineError::PartialUpsert { committed, source, .. }) => {
                    let saved = match vectors_file {
                        Some(p) => p,
                        None => {
                            let p = vectors_path(&chunks_path);
                            vector_set.save(&p)?;
                            p
                        }
                    };
                    eprintln!("❌ Reindex stopped after {committed} committed records: {source}");
                    eprintln!(
                        "   Resume with: ragline reindex --chunks {} --collection {collection} --vectors {} --resume-from {committed}",
                        chunks_path.display(),
                        saved.display()
                    );
                    std::process::exit(1);
                }
                Err(RaglineError::SwapFailed {
                    staging,
                    restored,
                    source,
                    ..
                }) => {
                    eprintln!("❌ Blue/green swap into '{collection}' failed: {source}");
                    eprintln!("   Verified data is kept in '{staging}' (live collection restored: {restored})");
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Vectorize { chunks, output } => {
            let (path, chunks) = load_chunks(&chunks)?;
            let output = output.as_deref().map(expand_path).unwrap_or_else(|| vectors_path(&path));
            let vectors = ctx.indexer().await?.vectorize(chunks.chunks()).await?;
            vectors.save(&output)?;
            println!(
                "✅ Embedded {} chunks with {} ({} dims)",
                vectors.len(),
                vectors.model(),
                vectors.dimension().unwrap_or(0)
            );
            println!("   Saved: {}", output.display());
        }

        Commands::Mirror {
            chunks,
            collection,
            source,
            target,
            skip_failed,
            save_translations,
            report,
        } => {
            let collection = collection.unwrap_or(default_collection);
            let (path, chunks) = load_chunks(&chunks)?;
            let mut options = MirrorOptions::from_config(&ctx.config().translation);
            if let Some(source) = source {
                options.source_language = source;
            }
            if let Some(target) = target {
                options.target_language = target;
            }
            if skip_failed {
                options.on_failure = TranslationFailurePolicy::Skip;
            }
            if save_translations {
                options.output = Some(translated_path(&path, &options.target_language));
            }

            let result = ctx.mirror().await?.run(&collection, &chunks, &options).await?;
            println!(
                "✅ Mirrored {} → {} into '{}'",
                result.source_language, result.target_language, result.collection
            );
            println!("   Translated: {}/{}", result.translated, result.total);
            println!("   Indexed:    {} (collection holds {})", result.indexed, result.collection_count);
            for f in &result.fallbacks {
                println!("   ⚠️  {} kept source text: {}", f.id, f.message);
            }
            for f in &result.skipped {
                println!("   ⏭️  {} skipped: {}", f.id, f.message);
            }
            if let Some(out) = &result.output {
                println!("   Saved:      {}", out.display());
            }
            write_report(report.as_deref(), &result)?;
        }

        Commands::Search {
            query,
            k,
            language,
            collection,
            json,
        } => {
            let service = ctx.service().await?;
            let response = service
                .search(SearchRequest {
                    query_text: query,
                    k,
                    language_filter: language,
                    collection,
                })
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("🔎 {} results from '{}'", response.count, response.collection);
                for (i, hit) in response.results.iter().enumerate() {
                    let lang = hit.metadata.get("language").and_then(|v| v.as_str()).unwrap_or("-");
                    let preview: String = hit.document.chars().take(100).collect();
                    println!("{:>3}. [{:.4}] {} ({lang})", i + 1, hit.distance, hit.id);
                    println!("     {preview}");
                }
            }
        }

        Commands::Embed {
            texts,
            document,
            no_normalize,
        } => {
            let service = ctx.service().await?;
            let response = service
                .embed(EmbedRequest {
                    texts,
                    normalize: Some(!no_normalize),
                    input_type: Some(if document { EmbedIntent::Document } else { EmbedIntent::Query }),
                })
                .await?;
            println!("{}", serde_json::to_string(&response)?);
        }

        Commands::Verify { collection, expected } => {
            let collection = collection.unwrap_or(default_collection);
            let report = ctx.manager().await?.verify(&collection, expected).await?;
            println!("🔍 '{}' holds {} records", report.collection, report.count);
            if let Some(sample) = &report.sample {
                println!("   First id:  {}", sample.id);
                if let Some(doc) = &sample.document {
                    let preview: String = doc.chars().take(100).collect();
                    println!("   Document:  {preview}");
                }
                if let Some(embedding) = &sample.embedding {
                    println!("   Dimension: {}", embedding.len());
                }
            }
        }

        Commands::Health => {
            let report = ctx.service().await?.health().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_healthy() {
                std::process::exit(1);
            }
        }

        Commands::Serve { host, port } => {
            let mut server = ctx.config().server.clone();
            if let Some(host) = host {
                server.host = host;
            }
            if let Some(port) = port {
                server.port = port;
            }
            let service = ctx.service().await?;
            server::start(service, &server).await?;
        }
    }

    Ok(())
}

fn print_models() {
    println!("🧮 Embedding backends\n");
    for provider in ragline_providers::registry::all_embedding_providers() {
        println!("{} ({})", provider.name, provider.base_url);
        for model in provider.models {
            println!(
                "   {:<55} {:>5} dims  batch ≤{:<4}{}",
                model.id,
                model.dimension,
                model.max_batch,
                if model.multilingual { " multilingual" } else { "" }
            );
        }
    }
    println!("local (static token vectors from embedding.model_path)");
    println!("hashing (embedding.dimension buckets, no model)");
    println!("\n🌐 Translation providers: {}", ragline_providers::registry::all_chat_provider_names().join(", "));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "ragline", "reindex", "--chunks", "c.json", "--strategy", "blue-green", "--resume-from", "5",
        ])
        .unwrap();
        match cli.command {
            Commands::Reindex { strategy, resume_from, vectors, .. } => {
                assert_eq!(strategy.as_deref(), Some("blue-green"));
                assert_eq!(resume_from, Some(5));
                assert!(vectors.is_none());
            }
            _ => panic!("expected reindex"),
        }

        let cli = Cli::try_parse_from(["ragline", "vectorize", "--chunks", "c.json", "-o", "v.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Vectorize { output: Some(_), .. }));

        let cli = Cli::try_parse_from(["ragline", "-v", "search", "water bill", "-k", "3", "-l", "es"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Search { k: Some(3), .. }));
        assert!(Cli::try_parse_from(["ragline", "embed"]).is_err());
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("/tmp/x.json"), std::path::Path::new("/tmp/x.json"));
        assert!(expand_path("~/x.json").ends_with("x.json"));
    }
}
