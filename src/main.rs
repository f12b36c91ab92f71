use std::path::Path;

use clap::Parser;
use kdam::{Bar, BarExt};
use papersift::{
    Catalog,
    ChunkStore,
    ConfigDb,
    DataDir,
    DirectoryCatalog,
    Error,
    Library,
    ModelManager,
    PlainTextExtractor,
    Result,
    Settings,
    indexer::Progress,
    recovered::parse_query_list,
    settings,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, CollectionAction, Command, ConfigAction};

const LOG_ENV_VAR: &str = "PAPERSIFT_LOG";

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var(LOG_ENV_VAR) {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }
    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;
    let model = cli.model.as_deref();

    match cli.command {
        Command::Collection { action } => match action {
            CollectionAction::Add { path, name } => {
                collection_add(&config_db, &path, &name)?;
            }
            CollectionAction::Remove { name } => {
                collection_remove(&config_db, &data_dir, model, &name)?;
            }
            CollectionAction::List { json } => {
                collection_list(&config_db, json)?;
            }
            CollectionAction::Show { name, json } => {
                collection_show(&config_db, &name, json)?;
            }
        },
        Command::Index(args) => {
            cmd_index(&config_db, &data_dir, model, &args.collections)?;
        }
        Command::Search(args) => {
            cmd_search(&config_db, &data_dir, model, &args)?;
        }
        Command::Grep(args) => {
            cmd_grep(&config_db, &data_dir, model, &args)?;
        }
        Command::Show(args) => {
            cmd_show(&config_db, &data_dir, model, &args.key)?;
        }
        Command::Config { action } => match action {
            ConfigAction::Get { key } => config_get(&config_db, &key)?,
            ConfigAction::Set { key, value } => {
                config_set(&config_db, &key, &value)?;
            }
            ConfigAction::List { json } => {
                config_list(&config_db, model, json)?;
            }
        },
        Command::Status(args) => {
            cmd_status(&config_db, &data_dir, model, args.json)?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn resolve_settings(config_db: &ConfigDb, model: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::resolve(config_db)?;
    if let Some(model) = model {
        settings.model = model.to_string();
    }
    Ok(settings)
}

/// Run `f` against a library over the data directory's chunk store.
fn with_library<T>(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    model: Option<&str>,
    f: impl FnOnce(&mut Library<'_>) -> Result<T>,
) -> Result<T> {
    let settings = resolve_settings(config_db, model)?;
    let store = ChunkStore::open(&data_dir.chunks_db())?;
    let catalog = DirectoryCatalog::new(config_db);
    let mut embedder = ModelManager::with_model_id(settings.model.clone());
    let mut library = Library::new(
        store,
        settings,
        &catalog,
        &PlainTextExtractor,
        &mut embedder,
    );
    f(&mut library)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn collection_add(config_db: &ConfigDb, path: &Path, name: &str) -> Result<()> {
    if !path.is_dir() {
        return Err(Error::Config(format!(
            "path is not a directory: {}",
            path.display()
        )));
    }

    let abs_path = path.canonicalize().map_err(|e| {
        Error::Config(format!("cannot resolve path {}: {e}", path.display()))
    })?;

    if config_db.get_collection(name)?.is_some() {
        return Err(Error::Config(format!("collection '{name}' already exists")));
    }

    config_db.set_collection(name, &abs_path.to_string_lossy())?;
    println!("Added collection '{name}' -> {}", abs_path.display());
    Ok(())
}

fn collection_remove(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    model: Option<&str>,
    name: &str,
) -> Result<()> {
    if !config_db.remove_collection(name)? {
        return Err(Error::NotFound {
            kind: "collection",
            name: name.to_string(),
        });
    }

    let remaining: Vec<String> = config_db
        .list_collections()?
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    let removed =
        with_library(config_db, data_dir, model, |library| library.prune(&remaining))?;

    println!("Removed collection '{name}' ({removed} documents dropped)");
    Ok(())
}

#[derive(Serialize)]
struct CollectionEntry {
    name: String,
    path: String,
    documents: usize,
}

fn collection_list(config_db: &ConfigDb, json: bool) -> Result<()> {
    let catalog = DirectoryCatalog::new(config_db);
    let entries = config_db
        .list_collections()?
        .into_iter()
        .map(|(name, path)| {
            let documents = catalog.count_documents(&name)?;
            Ok(CollectionEntry {
                name,
                path,
                documents,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if json {
        print_json(&entries)?;
    } else if entries.is_empty() {
        println!("No collections registered.");
    } else {
        for entry in &entries {
            println!("{}\t{}\t{} documents", entry.name, entry.path, entry.documents);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct CollectionItem {
    key: String,
    title: String,
}

fn collection_show(config_db: &ConfigDb, name: &str, json: bool) -> Result<()> {
    let items: Vec<CollectionItem> = DirectoryCatalog::new(config_db)
        .list_documents(&[name.to_string()])?
        .into_iter()
        .map(|document| CollectionItem {
            key: document.key,
            title: document.title,
        })
        .collect();

    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("Collection '{name}' has no documents.");
        return Ok(());
    }
    for item in &items {
        println!("{}\t{}", item.key, item.title);
    }
    Ok(())
}

fn cmd_index(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    model: Option<&str>,
    collections: &[String],
) -> Result<()> {
    let collections = if collections.is_empty() {
        config_db
            .list_collections()?
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    } else {
        collections.to_vec()
    };

    if collections.is_empty() {
        eprintln!("No collections to index.");
        return Ok(());
    }

    let mut bar: Option<Bar> = None;
    let summary = with_library(config_db, data_dir, model, |library| {
        library.reindex(&collections, &mut |progress| match progress {
            Progress::Document { total, .. } => {
                let bar = bar.get_or_insert_with(|| {
                    kdam::tqdm!(total = *total, desc = "Indexing", unit = "doc")
                });
                bar.set_postfix(progress.to_string());
                if let Err(e) = bar.update(1) {
                    tracing::debug!("progress bar update failed: {e}");
                }
            }
            Progress::Complete(_) => {
                if let Some(bar) = bar.as_mut()
                    && let Err(e) = bar.refresh()
                {
                    tracing::debug!("progress bar refresh failed: {e}");
                }
            }
        })
    })?;

    eprintln!();
    eprintln!("{summary}");
    Ok(())
}

fn cmd_search(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    model: Option<&str>,
    args: &cli::SearchArgs,
) -> Result<()> {
    let queries = match args.queries.as_slice() {
        [single] if single.trim_start().starts_with('[') => {
            parse_query_list(single, single).into_inner()
        }
        _ => args.queries.clone(),
    };

    let hits = with_library(config_db, data_dir, model, |library| {
        library.semantic_search(&queries, &args.collections, args.count)
    })?;

    if args.json {
        return print_json(&hits);
    }
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for hit in &hits {
        println!("{:.4}\t{}", hit.distance, hit.id);
        println!("    {}", snippet(&hit.text, 160));
    }
    Ok(())
}

fn cmd_grep(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    model: Option<&str>,
    args: &cli::GrepArgs,
) -> Result<()> {
    let matches = with_library(config_db, data_dir, model, |library| {
        library.fulltext_search(
            &args.queries,
            &args.collections,
            args.ignore_case,
            args.bypass_index,
        )
    })?;

    if args.json {
        return print_json(&matches);
    }
    if matches.is_empty() {
        println!("No matches.");
        return Ok(());
    }
    for found in &matches {
        println!("{}", found.document_key);
        for preview in &found.previews {
            println!("    {}", snippet(preview, usize::MAX));
        }
    }
    Ok(())
}

fn cmd_show(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    model: Option<&str>,
    key: &str,
) -> Result<()> {
    let text = with_library(config_db, data_dir, model, |library| {
        library.reconstruct_fulltext(key)
    })?;

    if text.is_empty() {
        return Err(Error::NotFound {
            kind: "document",
            name: key.to_string(),
        });
    }
    print!("{text}");
    if !text.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn config_get(config_db: &ConfigDb, key: &str) -> Result<()> {
    let value = config_db.get_setting(key)?.ok_or_else(|| Error::NotFound {
        kind: "setting",
        name: key.to_string(),
    })?;
    println!("{value}");
    Ok(())
}

fn config_set(config_db: &ConfigDb, key: &str, value: &str) -> Result<()> {
    Settings::validate(key, value)?;

    // Some settings are only valid together (chunk_overlap < chunk_size);
    // restore the previous value if the combination does not resolve.
    let previous = config_db.get_setting(key)?;
    config_db.set_setting(key, value.trim())?;
    if let Err(e) = Settings::resolve(config_db) {
        match previous {
            Some(previous) => config_db.set_setting(key, &previous)?,
            None => {
                config_db.remove_setting(key)?;
            }
        }
        return Err(e);
    }

    if key == settings::CHUNK_SIZE || key == settings::CHUNK_OVERLAP {
        eprintln!("Chunking changed; run `papersift index` after touching sources to rechunk.");
    }
    println!("{key} = {}", value.trim());
    Ok(())
}

fn config_list(config_db: &ConfigDb, model: Option<&str>, json: bool) -> Result<()> {
    let entries = resolve_settings(config_db, model)?.entries();

    if json {
        let map: serde_json::Map<String, serde_json::Value> = entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), serde_json::Value::String(value)))
            .collect();
        print_json(&map)?;
    } else {
        for (key, value) in &entries {
            println!("{key}\t{value}");
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct Status {
    data_dir: String,
    model: String,
    distance: String,
    collections: usize,
    documents: usize,
    chunks: usize,
}

fn cmd_status(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    model: Option<&str>,
    json: bool,
) -> Result<()> {
    let settings = resolve_settings(config_db, model)?;
    let collections = config_db.list_collections()?;
    let store = ChunkStore::open(&data_dir.chunks_db())?;

    let status = Status {
        data_dir: data_dir.root().display().to_string(),
        model: settings.model,
        distance: settings.distance.to_string(),
        collections: collections.len(),
        documents: store.document_keys()?.len(),
        chunks: store.count()?,
    };

    if json {
        return print_json(&status);
    }
    println!("Data directory: {}", status.data_dir);
    println!("Model: {}", status.model);
    println!("Distance: {}", status.distance);
    println!("Collections: {}", status.collections);
    for (name, path) in &collections {
        println!("  {name}: {path}");
    }
    println!("Documents: {}", status.documents);
    println!("Chunks: {}", status.chunks);
    Ok(())
}

/// Collapse whitespace and cut `text` to at most `max` characters.
fn snippet(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}
