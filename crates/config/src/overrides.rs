//! Config file loading with `section.key=value` overrides.

use std::{fs, path::Path};

use toml::value::Table;

use crate::{validate_config, Config, ConfigError};

/// Loads the config at `path`, applies overrides in order and validates the result.
pub fn load_config(path: &Path, overrides: &[String]) -> Result<Config, ConfigError> {
    let config_str = fs::read_to_string(path)?;
    let mut config_toml: toml::Value = toml::from_str(&config_str)?;

    let table = config_toml
        .as_table_mut()
        .ok_or_else(|| ConfigError::TraverseNonTableAt {
            key: "<root>".to_string(),
            path: String::new(),
        })?;

    for o in overrides {
        let (path, val) = parse_override(o)?;
        apply_override(&path, val, table)?;
    }

    let config = config_toml.try_into::<Config>()?;
    validate_config(&config)?;
    Ok(config)
}

/// Parses `a.b.c=value` into its key path and a toml value.
///
/// Values that parse as toml literals (numbers, booleans, quoted strings, arrays) keep their
/// type, anything else becomes a string.
pub fn parse_override(s: &str) -> Result<(Vec<String>, toml::Value), ConfigError> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| ConfigError::InvalidOverride(s.to_string()))?;

    let path: Vec<String> = key.trim().split('.').map(str::to_string).collect();
    if path.iter().any(|p| p.is_empty()) {
        return Err(ConfigError::InvalidOverride(s.to_string()));
    }

    let value = value.trim();
    let parsed = toml::from_str::<Table>(&format!("v = {value}"))
        .ok()
        .and_then(|mut t| t.remove("v"))
        .unwrap_or_else(|| toml::Value::String(value.to_string()));

    Ok((path, parsed))
}

/// Sets `path` to `val` inside `table`, creating intermediate tables as needed.
pub fn apply_override(
    path: &[String],
    val: toml::Value,
    table: &mut Table,
) -> Result<(), ConfigError> {
    let Some((last, parents)) = path.split_last() else {
        return Err(ConfigError::MissingKey(String::new()));
    };

    let mut cur = table;
    for (i, key) in parents.iter().enumerate() {
        let entry = cur
            .entry(key.clone())
            .or_insert_with(|| toml::Value::Table(Table::new()));
        cur = entry
            .as_table_mut()
            .ok_or_else(|| ConfigError::TraverseNonTableAt {
                key: key.clone(),
                path: path[..i].join("."),
            })?;
    }

    cur.insert(last.clone(), val);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const CONFIG_TOML: &str = r#"
        [l1]
        ws_endpoint = "ws://localhost:8546"
        beacon_endpoint = "http://localhost:5052"

        [l2]
        ws_endpoint = "ws://localhost:28546"
        engine_endpoint = "http://localhost:28551"
        jwt_secret_path = "/path/to/jwt.hex"

        [contracts]
        inbox_address = "0x79fcdef22feed20eddacbb2587640e45491b757f"
        anchor_address = "0x1670000000000000000000000000000000010001"
    "#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_override_typed_values() {
        let (path, val) = parse_override("sync.retry_interval_ms=250").unwrap();
        assert_eq!(path, vec!["sync", "retry_interval_ms"]);
        assert_eq!(val, toml::Value::Integer(250));

        let (_, val) = parse_override("sync.p2p_sync_enabled=true").unwrap();
        assert_eq!(val, toml::Value::Boolean(true));

        let (_, val) = parse_override("l2.checkpoint_url=http://node:8545").unwrap();
        assert_eq!(val, toml::Value::String("http://node:8545".to_string()));
    }

    #[test]
    fn test_parse_override_rejects_garbage() {
        assert!(matches!(
            parse_override("no_equals_sign"),
            Err(ConfigError::InvalidOverride(_))
        ));
        assert!(matches!(
            parse_override("sync..x=1"),
            Err(ConfigError::InvalidOverride(_))
        ));
    }

    #[test]
    fn test_apply_override_into_primitive_fails() {
        let mut table = Table::new();
        table.insert("l1".to_string(), toml::Value::Integer(1));

        let path = vec!["l1".to_string(), "ws_endpoint".to_string()];
        let res = apply_override(&path, toml::Value::Boolean(true), &mut table);

        assert!(matches!(res, Err(ConfigError::TraverseNonTableAt { .. })));
    }

    #[test]
    fn test_load_config_applies_overrides() {
        let file = write_config(CONFIG_TOML);
        let overrides = vec![
            "sync.p2p_sync_enabled=true".to_string(),
            "l2.checkpoint_url=http://checkpoint:8545".to_string(),
            "sync.max_reorg_search_depth=8".to_string(),
        ];

        let config = load_config(file.path(), &overrides).unwrap();

        assert!(config.sync.p2p_sync_enabled);
        assert_eq!(
            config.l2.checkpoint_url.as_deref(),
            Some("http://checkpoint:8545")
        );
        assert_eq!(config.sync.max_reorg_search_depth, 8);
    }

    #[test]
    fn test_load_config_p2p_without_checkpoint_fails() {
        let file = write_config(CONFIG_TOML);
        let overrides = vec!["sync.p2p_sync_enabled=true".to_string()];

        let res = load_config(file.path(), &overrides);

        assert!(matches!(res, Err(ConfigError::P2pSyncWithoutCheckpoint)));
    }

    #[test]
    fn test_load_config_missing_file() {
        let res = load_config(Path::new("/nonexistent/keel.toml"), &[]);
        assert!(matches!(res, Err(ConfigError::Io(_))));
    }
}
