use std::path::{Path, PathBuf};

use log::{info, warn};
use toml_edit::{value, DocumentMut, Item, Table};

use crate::config::{sanitize_config, Config, RemoteSourceConfig};
use crate::error::ConfigError;
use crate::sources::curated::CuratedConfidence;

pub fn system_config_template_text() -> &'static str {
    include_str!("../config/titlelink.system.toml")
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("titlelink").join("config.toml"))
}

fn io_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Reads the config at `path`, writing the system template there first when
/// the file does not exist yet.
pub fn load_or_seed_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| io_error(parent, err))?;
        }
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        std::fs::write(path, system_config_template_text()).map_err(|err| io_error(path, err))?;
    }
    let text = std::fs::read_to_string(path).map_err(|err| io_error(path, err))?;
    Ok(sanitize_config(toml::from_str::<Config>(&text)?))
}

fn set_table_value_preserving_decor(table: &mut Table, key: &str, item: Item) {
    let existing_value_decor = table
        .get(key)
        .and_then(|current| current.as_value().map(|value| value.decor().clone()));
    table[key] = item;
    if let Some(existing_value_decor) = existing_value_decor {
        if let Some(next_value) = table[key].as_value_mut() {
            *next_value.decor_mut() = existing_value_decor;
        }
    }
}

fn set_table_scalar_if_changed<T, F>(
    table: &mut Table,
    key: &str,
    previous_value: T,
    next_value: T,
    to_item: F,
) where
    T: PartialEq + Copy,
    F: FnOnce(T) -> Item,
{
    if table.contains_key(key) && previous_value == next_value {
        return;
    }
    set_table_value_preserving_decor(table, key, to_item(next_value));
}

fn set_table_string_if_changed(table: &mut Table, key: &str, previous: &str, next: &str) {
    if table.contains_key(key) && previous == next {
        return;
    }
    set_table_value_preserving_decor(table, key, value(next));
}

/// Walks `path` from the document root, replacing anything that is not a
/// table along the way.
fn section_mut<'a>(document: &'a mut DocumentMut, path: &[&str]) -> Option<&'a mut Table> {
    let mut table = document.as_table_mut();
    for key in path {
        if !table.get(key).is_some_and(Item::is_table) {
            let mut section = Table::new();
            section.set_implicit(true);
            table.insert(key, Item::Table(section));
        }
        table = table.get_mut(key)?.as_table_mut()?;
    }
    Some(table)
}

fn confidence_label(confidence: CuratedConfidence) -> &'static str {
    match confidence {
        CuratedConfidence::Low => "low",
        CuratedConfidence::Medium => "medium",
        CuratedConfidence::High => "high",
    }
}

fn write_remote_source(
    table: &mut Table,
    previous: &RemoteSourceConfig,
    next: &RemoteSourceConfig,
) {
    set_table_scalar_if_changed(table, "enabled", previous.enabled, next.enabled, value);
    set_table_string_if_changed(table, "base_url", &previous.base_url, &next.base_url);
    set_table_scalar_if_changed(
        table,
        "rate_limit_capacity",
        i64::from(previous.rate_limit_capacity),
        i64::from(next.rate_limit_capacity),
        value,
    );
    set_table_scalar_if_changed(
        table,
        "rate_limit_window_secs",
        i64::from(previous.rate_limit_window_secs),
        i64::from(next.rate_limit_window_secs),
        value,
    );
    set_table_scalar_if_changed(
        table,
        "page_size",
        i64::from(previous.page_size),
        i64::from(next.page_size),
        value,
    );
}

fn write_config_to_document(document: &mut DocumentMut, previous: &Config, config: &Config) {
    if let Some(cache) = section_mut(document, &["cache"]) {
        let (old, new) = (&previous.cache, &config.cache);
        set_table_scalar_if_changed(cache, "enabled", old.enabled, new.enabled, value);
        set_table_scalar_if_changed(
            cache,
            "ttl_days",
            i64::from(old.ttl_days),
            i64::from(new.ttl_days),
            value,
        );
        set_table_scalar_if_changed(
            cache,
            "capacity",
            i64::from(old.capacity),
            i64::from(new.capacity),
            value,
        );
        set_table_scalar_if_changed(
            cache,
            "hit_weight_minutes",
            i64::from(old.hit_weight_minutes),
            i64::from(new.hit_weight_minutes),
            value,
        );
        set_table_scalar_if_changed(
            cache,
            "sweep_interval_minutes",
            i64::from(old.sweep_interval_minutes),
            i64::from(new.sweep_interval_minutes),
            value,
        );
        set_table_scalar_if_changed(cache, "persist", old.persist, new.persist, value);
        set_table_string_if_changed(cache, "database_path", &old.database_path, &new.database_path);
    }

    if let Some(matching) = section_mut(document, &["matching"]) {
        let (old, new) = (&previous.matching, &config.matching);
        for (key, old_value, new_value) in [
            (
                "fuzzy_standard_threshold",
                old.fuzzy_standard_threshold,
                new.fuzzy_standard_threshold,
            ),
            (
                "word_overlap_threshold",
                old.word_overlap_threshold,
                new.word_overlap_threshold,
            ),
            (
                "fuzzy_aggressive_threshold",
                old.fuzzy_aggressive_threshold,
                new.fuzzy_aggressive_threshold,
            ),
            ("aggressive_penalty", old.aggressive_penalty, new.aggressive_penalty),
            ("max_length_delta", old.max_length_delta, new.max_length_delta),
        ] {
            set_table_scalar_if_changed(matching, key, old_value, new_value, value);
        }
        set_table_scalar_if_changed(
            matching,
            "min_significant_word_chars",
            i64::from(old.min_significant_word_chars),
            i64::from(new.min_significant_word_chars),
            value,
        );
        set_table_string_if_changed(
            matching,
            "overrides_path",
            &old.overrides_path,
            &new.overrides_path,
        );
    }

    if let Some(retry) = section_mut(document, &["retry"]) {
        let (old, new) = (&previous.retry, &config.retry);
        for (key, old_value, new_value) in [
            ("max_attempts", old.max_attempts, new.max_attempts),
            ("base_delay_ms", old.base_delay_ms, new.base_delay_ms),
            ("transient_delay_ms", old.transient_delay_ms, new.transient_delay_ms),
            ("max_delay_ms", old.max_delay_ms, new.max_delay_ms),
        ] {
            set_table_scalar_if_changed(
                retry,
                key,
                i64::from(old_value),
                i64::from(new_value),
                value,
            );
        }
    }

    if let Some(orchestrator) = section_mut(document, &["orchestrator"]) {
        let (old, new) = (&previous.orchestrator, &config.orchestrator);
        for (key, old_value, new_value) in [
            ("overall_timeout_ms", old.overall_timeout_ms, new.overall_timeout_ms),
            (
                "per_source_timeout_ms",
                old.per_source_timeout_ms,
                new.per_source_timeout_ms,
            ),
            ("batch_concurrency", old.batch_concurrency, new.batch_concurrency),
        ] {
            set_table_scalar_if_changed(
                orchestrator,
                key,
                i64::from(old_value),
                i64::from(new_value),
                value,
            );
        }
    }

    if let Some(structured) = section_mut(document, &["sources", "structured"]) {
        write_remote_source(
            structured,
            &previous.sources.structured,
            &config.sources.structured,
        );
    }
    if let Some(scraped) = section_mut(document, &["sources", "scraped"]) {
        write_remote_source(scraped, &previous.sources.scraped, &config.sources.scraped);
    }
    if let Some(curated) = section_mut(document, &["sources", "curated"]) {
        let (old, new) = (&previous.sources.curated, &config.sources.curated);
        set_table_scalar_if_changed(curated, "enabled", old.enabled, new.enabled, value);
        set_table_string_if_changed(curated, "dataset_path", &old.dataset_path, &new.dataset_path);
        set_table_string_if_changed(
            curated,
            "min_confidence",
            confidence_label(old.min_confidence),
            confidence_label(new.min_confidence),
        );
    }
}

/// Applies `config` onto `existing_text`, touching only changed or missing
/// keys so comments and layout survive.
pub fn serialize_config_with_preserved_comments(
    existing_text: &str,
    config: &Config,
) -> Result<String, ConfigError> {
    let previous = toml::from_str::<Config>(existing_text)?;
    let mut document = existing_text.parse::<DocumentMut>()?;
    write_config_to_document(&mut document, &previous, config);
    Ok(document.to_string())
}

pub fn persist_config_file(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let existing_text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            system_config_template_text().to_string()
        }
        Err(err) => return Err(io_error(path, err)),
    };
    let config_text = match serialize_config_with_preserved_comments(&existing_text, config) {
        Ok(updated_text) => updated_text,
        Err(err) => {
            warn!(
                "Failed to preserve config comments for {} ({}). Rewriting from the template.",
                path.display(),
                err
            );
            serialize_config_with_preserved_comments(system_config_template_text(), config)?
        }
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| io_error(parent, err))?;
    }
    std::fs::write(path, config_text).map_err(|err| io_error(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_seeds_missing_file_from_template() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("titlelink").join("config.toml");
        let config = load_or_seed_config(&path).expect("seeded config should load");
        assert_eq!(config, Config::default());
        let written = std::fs::read_to_string(&path).expect("seeded file should exist");
        assert_eq!(written, system_config_template_text());
    }

    #[test]
    fn test_preserves_comments_and_untouched_values() {
        let existing = r#"
# my cache notes
[cache]
enabled = true # keep this on
ttl_days = 7

[sources.structured]
base_url = "https://mirror.example.test" # private mirror
"#;
        let previous: Config = toml::from_str(existing).expect("existing config should parse");
        let mut next = previous.clone();
        next.cache.enabled = false;
        next.cache.ttl_days = 3;

        let updated = serialize_config_with_preserved_comments(existing, &next)
            .expect("config should serialize");
        assert!(updated.contains("# my cache notes"));
        assert!(updated.contains("enabled = false # keep this on"));
        assert!(updated.contains("ttl_days = 3"));
        assert!(updated.contains("base_url = \"https://mirror.example.test\" # private mirror"));

        let reparsed: Config = toml::from_str(&updated).expect("updated config should parse");
        assert_eq!(reparsed, next);
    }

    #[test]
    fn test_template_round_trip_is_stable() {
        let updated = serialize_config_with_preserved_comments(
            system_config_template_text(),
            &Config::default(),
        )
        .expect("template should serialize");
        assert_eq!(updated, system_config_template_text());
    }

    #[test]
    fn test_empty_document_gets_every_key() {
        let updated = serialize_config_with_preserved_comments("", &Config::default())
            .expect("empty document should serialize");
        let reparsed: Config = toml::from_str(&updated).expect("updated config should parse");
        assert_eq!(reparsed, Config::default());
    }

    #[test]
    fn test_persist_writes_changes() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.orchestrator.batch_concurrency = 2;
        persist_config_file(&config, &path).expect("config should persist");
        let reloaded = load_or_seed_config(&path).expect("config should reload");
        assert_eq!(reloaded.orchestrator.batch_concurrency, 2);
        let text = std::fs::read_to_string(&path).expect("config file should exist");
        assert!(text.contains("# Simultaneous lookups in batch mode."));
    }
}
