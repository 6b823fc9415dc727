use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use serde_json::json;

use titlelink::acquisition::ResolveRequest;
use titlelink::bootstrap::{build_cache, build_orchestrator};
use titlelink::config::Config;
use titlelink::config_persistence::{
    default_config_path, load_or_seed_config, persist_config_file,
};

#[derive(Parser)]
#[command(name = "titlelink", version, about = "Resolve game titles to catalog records")]
struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve one name and print the outcome as JSON.
    Resolve {
        name: String,
        #[arg(long)]
        id: Option<String>,
    },
    /// Resolve every line of FILE (`name` or `name<TAB>id`); `-` reads stdin.
    Batch { file: PathBuf },
    /// Remove expired entries from the persisted cache.
    SweepCache,
    /// Remove every entry from the persisted cache.
    ClearCache,
    /// Write settings back to the config file.
    Configure {
        #[arg(long)]
        cache_enabled: Option<bool>,
        #[arg(long)]
        cache_ttl_days: Option<u32>,
        #[arg(long)]
        cache_capacity: Option<u32>,
        #[arg(long)]
        batch_concurrency: Option<u32>,
    },
}

fn parse_batch_line(line: &str) -> Option<ResolveRequest> {
    if line.trim().is_empty() {
        return None;
    }
    let request = match line.split_once('\t') {
        Some((name, id)) => ResolveRequest::new(name).with_stable_id(id.trim()),
        None => ResolveRequest::new(line),
    };
    Some(request)
}

fn read_batch_requests(file: &Path) -> Result<Vec<ResolveRequest>, std::io::Error> {
    let reader: Box<dyn BufRead> = if file == Path::new("-") {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        Box::new(BufReader::new(std::fs::File::open(file)?))
    };
    let mut requests = Vec::new();
    for line in reader.lines() {
        if let Some(request) = parse_batch_line(&line?) {
            requests.push(request);
        }
    }
    Ok(requests)
}

async fn run_command(
    command: Command,
    config: Config,
    config_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Resolve { name, id } => {
            let orchestrator = build_orchestrator(&config)?;
            let outcome = orchestrator.resolve_entity(&name, id.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Batch { file } => {
            let requests = read_batch_requests(&file)?;
            info!("Batch: {} requests from {}", requests.len(), file.display());
            let orchestrator = Arc::new(build_orchestrator(&config)?);
            let sweeper = orchestrator.spawn_cache_sweeper(config.cache.sweep_interval());
            let names: Vec<String> = requests
                .iter()
                .map(|request| request.name.clone())
                .collect();
            let results = orchestrator.resolve_batch(requests).await;
            sweeper.abort();
            for (name, result) in names.into_iter().zip(results) {
                let line = match result {
                    Ok(outcome) => json!({ "query": name, "outcome": outcome }),
                    Err(err) => {
                        warn!("Batch: rejected '{}': {}", name, err);
                        json!({ "query": name, "error": err.to_string() })
                    }
                };
                println!("{line}");
            }
        }
        Command::SweepCache => {
            // Opening the store already drops expired rows; the stats count those too.
            let cache = build_cache(&config.cache);
            cache.purge_expired();
            info!(
                "Cache: removed {} expired entries, {} remain",
                cache.stats().expirations,
                cache.len()
            );
        }
        Command::ClearCache => {
            let cache = build_cache(&config.cache);
            let removed = cache.clear();
            info!("Cache: cleared {} entries", removed);
        }
        Command::Configure {
            cache_enabled,
            cache_ttl_days,
            cache_capacity,
            batch_concurrency,
        } => {
            let mut next = config;
            if let Some(enabled) = cache_enabled {
                next.cache.enabled = enabled;
            }
            if let Some(ttl_days) = cache_ttl_days {
                next.cache.ttl_days = ttl_days;
            }
            if let Some(capacity) = cache_capacity {
                next.cache.capacity = capacity;
            }
            if let Some(concurrency) = batch_concurrency {
                next.orchestrator.batch_concurrency = concurrency;
            }
            let next = titlelink::config::sanitize_config(next);
            persist_config_file(&next, config_path)?;
            info!("Config: saved {}", config_path.display());
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut clog = colog::default_builder();
    clog.filter(
        None,
        if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        },
    );
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_path = match cli.config.or_else(default_config_path) {
        Some(path) => path,
        None => return Err("no config directory available; pass --config".into()),
    };
    let config = load_or_seed_config(&config_path)?;
    debug!("Config: loaded {}", config_path.display());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_command(cli.command, config, &config_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_line_with_tab_carries_stable_id() {
        let request = parse_batch_line("Doom\t2016-remake").expect("line should parse");
        assert_eq!(request.name, "Doom");
        assert_eq!(request.stable_id.as_deref(), Some("2016-remake"));
    }

    #[test]
    fn test_blank_batch_lines_are_skipped() {
        assert!(parse_batch_line("   ").is_none());
        let request = parse_batch_line("Celeste").expect("line should parse");
        assert_eq!(request.stable_id, None);
    }

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "titlelink",
            "resolve",
            "Hades",
            "--id",
            "h1",
            "--verbose",
        ])
        .expect("arguments should parse");
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Command::Resolve { ref name, ref id } if name == "Hades" && id.as_deref() == Some("h1")
        ));
    }
}
