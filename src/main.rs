use recollect::cli::{Cli, Commands, ConfigAction};
use recollect::config::Config;
use recollect::embedding::{
    read_chunks_jsonl, remove_chunks, BatchProcessor, EmbeddingProvider, FastEmbedProvider,
    KeywordIndex,
};
use recollect::error::{RecollectError, Result};
use recollect::identity::{AliasTable, PEOPLE_TEMPLATE};
use recollect::query::{QueryClassifier, QueryPreprocessor};
use recollect::retrieval::{
    open_vector_index, HybridSearcher, RetrievalContext, SearchRequest, SearchResponse,
    SearchStatus,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Search {
            query,
            top_k,
            no_recency,
            rerank,
            no_rerank,
            candidates,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            let mut request = SearchRequest::new(query)
                .with_top_k(top_k.unwrap_or(config.retrieval.top_k))
                .with_recency_boost(!no_recency);
            if let Some(enabled) = Commands::rerank_override(rerank, no_rerank) {
                request = request.with_reranker(enabled);
            }
            if let Some(candidates) = candidates {
                request = request.with_rerank_candidates(candidates);
            }
            cmd_search(config, request, json)?;
        }
        Commands::Index { input } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_index(config, &input)?;
        }
        Commands::Remove { ids } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_remove(config, &ids)?;
        }
        Commands::Stats => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_stats(config)?;
        }
        Commands::Classify { query } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_classify(config, &query)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "recollect=debug" } else { "recollect=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| RecollectError::Io {
        source: e,
        context: "Failed to start async runtime".to_string(),
    })
}

fn cmd_search(config: Config, request: SearchRequest, json: bool) -> Result<()> {
    let context = RetrievalContext::open(&config)?;
    let searcher = HybridSearcher::new(context, config.retrieval.clone())?;

    let response = runtime()?.block_on(searcher.search(&request));

    if json {
        let output = serde_json::to_string_pretty(&response).map_err(|e| RecollectError::Json {
            source: e,
            context: "Failed to serialize search results".to_string(),
        })?;
        println!("{}", output);
    } else {
        print_response(&response);
        for event in searcher.degradation_events() {
            println!("  fallback: {} -> {} ({})", event.component, event.fallback, event.error);
        }
    }

    Ok(())
}

fn print_response(response: &SearchResponse) {
    if response.query.was_expanded() {
        println!("Query: {} (expanded: {})", response.query.raw, response.query.expanded);
    } else {
        println!("Query: {}", response.query.raw);
    }
    println!("Type: {}", response.query.kind);

    match &response.status {
        SearchStatus::Ok => {}
        SearchStatus::Empty => {
            println!("No matching chunks found");
            return;
        }
        SearchStatus::Degraded { signal, reason } => {
            println!("⚠ {} search unavailable ({}), results from one signal", signal, reason);
        }
        SearchStatus::NoSignal { keyword, vector } => {
            println!("✗ No retrieval signal available");
            println!("  keyword: {}", keyword);
            println!("  vector: {}", vector);
            return;
        }
    }

    println!();
    for (rank, hit) in response.hits.iter().enumerate() {
        let marker = if hit.protected { " [protected]" } else { "" };
        println!(
            "{:>2}. {} (score {:.4}, rrf {:.4}){}",
            rank + 1,
            hit.chunk.display_name(),
            hit.final_score(),
            hit.rrf_score,
            marker
        );
        println!("    {}", hit.chunk.id);
        println!("    {}", hit.chunk.preview(160).replace('\n', " "));
    }
}

fn cmd_index(config: Config, input: &Path) -> Result<()> {
    let chunks = read_chunks_jsonl(input)?;
    println!("Indexing {} chunks from {}", chunks.len(), input.display());

    let keyword_index = Arc::new(KeywordIndex::new(config.storage.keyword_index_dir())?);
    let vector_index = Arc::new(open_vector_index(&config)?);
    let provider: Arc<dyn EmbeddingProvider> =
        Arc::new(FastEmbedProvider::new(&config.embedding.model)?);

    let processor = BatchProcessor::new(
        provider,
        vector_index,
        keyword_index,
        config.embedding.batch_size,
    );
    let result = runtime()?.block_on(processor.process(chunks))?;

    println!(
        "✓ Indexed {} chunks ({} failed) in {}ms",
        result.processed, result.failed, result.duration_ms
    );
    Ok(())
}

fn cmd_remove(config: Config, ids: &[String]) -> Result<()> {
    let keyword_index = KeywordIndex::new(config.storage.keyword_index_dir())?;
    let vector_index = open_vector_index(&config)?;

    let removed = remove_chunks(&keyword_index, &vector_index, ids)?;
    println!("✓ Removed {} of {} chunks", removed, ids.len());
    Ok(())
}

fn cmd_stats(config: Config) -> Result<()> {
    let keyword_index = KeywordIndex::new(config.storage.keyword_index_dir())?;
    let vector_index = open_vector_index(&config)?;
    let aliases = AliasTable::load(&config.identity.people_file)?;

    println!("Data directory: {}", config.storage.data_dir.display());
    println!("  Keyword index: {} chunks", keyword_index.count());
    println!(
        "  Vector index:  {} chunks ({}D, {})",
        vector_index.len(),
        vector_index.dimension(),
        config.embedding.model
    );
    println!(
        "  Identities:    {} people, {} aliases",
        aliases.canonical_names().len(),
        aliases.len()
    );
    if config.retrieval.reranker_enabled {
        println!("  Reranker:      {}", config.retrieval.reranker_model);
    } else {
        println!("  Reranker:      {} (off unless --rerank)", config.retrieval.reranker_model);
    }

    Ok(())
}

fn cmd_classify(config: Config, query: &str) -> Result<()> {
    let aliases = Arc::new(AliasTable::load(&config.identity.people_file)?);
    let expanded = QueryPreprocessor::new(aliases.clone()).expand(query);
    let kind = QueryClassifier::new(aliases)?.classify(&expanded);

    println!("Query:    {}", query);
    println!("Expanded: {}", expanded);
    println!("Type:     {}", kind);
    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            let text = toml::to_string_pretty(&config)?;
            println!("{}", text);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            let config_dir = path
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| RecollectError::Config("Config path has no parent".to_string()))?;
            std::fs::create_dir_all(&config_dir).map_err(|e| RecollectError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", config_dir),
            })?;

            // Save default config
            let mut config = Config::default();
            config.identity.people_file = config_dir.join("people.toml");
            config.save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());

            let people_path = config.identity.people_file.clone();
            if people_path.exists() && !force {
                println!("  People file kept: {}", people_path.display());
            } else {
                std::fs::write(&people_path, PEOPLE_TEMPLATE).map_err(|e| RecollectError::Io {
                    source: e,
                    context: format!("Failed to write people file: {:?}", people_path),
                })?;
                println!("✓ People file installed at: {}", people_path.display());
            }
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    let mut config = if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'recollect config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        config
    } else if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)?
    } else {
        Config::load(&path)?
    };

    config.expand_paths()?;
    Ok(config)
}
