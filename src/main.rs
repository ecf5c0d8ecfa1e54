use reelseek::benchmark::BenchmarkHarness;
use reelseek::builder::IndexBuilder;
use reelseek::catalogue::Catalogue;
use reelseek::cli::{Cli, Commands, ConfigAction};
use reelseek::config::Config;
use reelseek::embedding::client_from_config;
use reelseek::error::{ReelseekError, Result};
use reelseek::query::QueryEngine;
use reelseek::store::{EmbeddedStore, VectorStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    run(cli).inspect_err(|e| {
        if e.is_transient() {
            tracing::error!("The embedding service did not respond, try again in a few minutes");
        }
    })
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Build { catalogue, field } => {
            let config = load_config(cli.config)?;
            cmd_build(&config, catalogue, field)?;
        }
        Commands::Query {
            query,
            index,
            top_k,
            catalogue,
            json,
        } => {
            let config = load_config(cli.config)?;
            cmd_query(&config, &query, index, top_k, catalogue, json)?;
        }
        Commands::Bench { output, json } => {
            let config = load_config(cli.config)?;
            cmd_bench(&config, output, json)?;
        }
        Commands::Collections => {
            let config = load_config(cli.config)?;
            cmd_collections(&config)?;
        }
        Commands::Filter { term } => {
            let config = load_config(cli.config)?;
            cmd_filter(&config, &term)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "reelseek=debug" } else { "reelseek=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_build(config: &Config, catalogue: Option<PathBuf>, field: Option<String>) -> Result<()> {
    let path = expand_path(catalogue.as_deref().unwrap_or(&config.catalogue.path))?;
    let field = field.unwrap_or_else(|| config.catalogue.text_field.clone());
    let catalogue = Catalogue::load(&path, &field)?;
    let registry = config.registry()?;
    let client = client_from_config(&config.embedding)?;

    let store = open_store(config)?;
    let report = {
        let builder = IndexBuilder::new(
            &client,
            store.clone(),
            config.embedding.batch_size,
            config.embedding.requests_per_minute,
        );
        builder.build(&catalogue, &field, &registry)?
    };
    close_store(store);

    println!(
        "✓ Built {} collections over {} rows ({}ms)",
        report.collections.len(),
        report.rows,
        report.duration_ms
    );
    for built in &report.collections {
        println!(
            "  - {} [{}]: {} entities in {}ms",
            built.collection, built.index, built.inserted, built.duration_ms
        );
    }

    Ok(())
}

fn cmd_query(
    config: &Config,
    query: &str,
    index: Option<String>,
    top_k: Option<usize>,
    catalogue: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let registry = config.registry()?;
    let index_config = match index {
        Some(key) => registry
            .find(&key)
            .ok_or_else(|| ReelseekError::Config(format!("No index configuration named '{}'", key)))?,
        None => registry
            .configs()
            .next()
            .ok_or_else(|| ReelseekError::Config("No index configurations".to_string()))?,
    };
    let k = top_k.unwrap_or(config.store.default_top_k);

    // Titles are optional; the stored text alone is enough to answer
    let catalogue_path = expand_path(catalogue.as_deref().unwrap_or(&config.catalogue.path))?;
    let catalogue = match Catalogue::load(&catalogue_path, &config.catalogue.text_field) {
        Ok(catalogue) => Some(catalogue),
        Err(e) => {
            tracing::warn!("Catalogue unavailable, titles will be omitted: {}", e);
            None
        }
    };

    let client = client_from_config(&config.embedding)?;
    let store = open_store(config)?;
    let results = {
        let engine = QueryEngine::new(&client, store.clone());

        if let Some(catalogue) = &catalogue {
            match engine.built_from(index_config) {
                Ok(Some(fingerprint)) if fingerprint != catalogue.fingerprint() => {
                    tracing::warn!(
                        "{} was built from a different catalogue version, run 'reelseek build' to refresh it",
                        index_config.collection_name()
                    );
                }
                _ => {}
            }
        }

        engine.query(query, index_config, k)?
    };
    close_store(store);

    let title_of = |row_id: u64| -> String {
        catalogue
            .as_ref()
            .and_then(|c| c.row(row_id))
            .map(|row| row.title.clone())
            .unwrap_or_default()
    };

    if json {
        let output: Vec<serde_json::Value> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "row_id": r.row_id,
                    "score": r.score,
                    "title": title_of(r.row_id),
                    "stored_text": r.stored_text,
                })
            })
            .collect();
        let rendered = serde_json::to_string_pretty(&output).map_err(|e| ReelseekError::Json {
            source: e,
            context: "Failed to serialize results".to_string(),
        })?;
        println!("{}", rendered);
    } else if results.is_empty() {
        println!("No results found for: {}", query);
    } else {
        println!("Results for {:?} on {}:", query, index_config.label());
        for (rank, r) in results.iter().enumerate() {
            println!(
                "{:>2}. [{}] {:.4}  {}  {}",
                rank + 1,
                r.row_id,
                r.score,
                title_of(r.row_id),
                r.stored_text
            );
        }
    }

    Ok(())
}

fn cmd_bench(config: &Config, output: Option<PathBuf>, json: bool) -> Result<()> {
    let catalogue_path = expand_path(&config.catalogue.path)?;
    let catalogue = Catalogue::load(&catalogue_path, &config.catalogue.text_field)?;
    let registry = config.registry()?;
    let client = client_from_config(&config.embedding)?;

    let store = open_store(config)?;
    let report = {
        let engine = QueryEngine::new(&client, store.clone());
        let harness = BenchmarkHarness::new(&engine, &catalogue, config.benchmark.top_k);
        let configs: Vec<_> = registry.configs().collect();
        harness.run(&config.benchmark.queries, configs.iter().copied())
    };
    close_store(store);

    let output = match output {
        Some(path) => path,
        None if json => expand_path(&config.benchmark.output)?.with_extension("json"),
        None => expand_path(&config.benchmark.output)?,
    };
    if json {
        report.write_json(&output)?;
    } else {
        report.write_csv(&output)?;
    }

    println!("Benchmark {} ({} rows)", report.run_id, report.rows.len());
    for summary in report.summary() {
        println!(
            "  {:<16} queries: {}  failures: {}  mean: {:.3}s  max: {:.3}s",
            summary.index, summary.queries, summary.failures, summary.mean_seconds, summary.max_seconds
        );
    }
    println!("✓ Report written to {}", output.display());

    Ok(())
}

fn cmd_collections(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let collections = store.list_collections()?;
    close_store(store);

    if collections.is_empty() {
        println!("No collections. Run 'reelseek build' first.");
        return Ok(());
    }

    for info in collections {
        let index = info
            .index
            .as_ref()
            .map(|i| i.label())
            .unwrap_or_else(|| "no index".to_string());
        println!(
            "{}  [{}]  {} entities, dim {}, created {}",
            info.schema.name, index, info.count, info.schema.dimension, info.created_at
        );
    }

    Ok(())
}

fn cmd_filter(config: &Config, term: &str) -> Result<()> {
    let path = expand_path(&config.catalogue.path)?;
    let catalogue = Catalogue::load(&path, &config.catalogue.text_field)?;

    let rows = catalogue.filter_by_term(term);
    println!("{} of {} rows match {:?}", rows.len(), catalogue.len(), term);
    for row in rows {
        println!("  [{}] {}", row.id, row.title);
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let rendered = toml::to_string_pretty(&config)?;
            println!("{}", rendered);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Index configurations: {}", config.indexes.len());
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

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Path => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };
            println!("{}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'reelseek config init' to create one."
        );
        return Config::load_defaults();
    }

    Config::load(&path)
}

fn open_store(config: &Config) -> Result<Arc<EmbeddedStore>> {
    let path = expand_path(&config.store.path)?;
    Ok(Arc::new(EmbeddedStore::connect(&path)?))
}

fn close_store(store: Arc<EmbeddedStore>) {
    match Arc::try_unwrap(store) {
        Ok(store) => store.disconnect(),
        Err(_) => tracing::debug!("Store still shared, leaving connections to drop"),
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| ReelseekError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| ReelseekError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
