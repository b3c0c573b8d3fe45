use std::path::PathBuf;

use super::{service::build_logger_config, *};

fn has_attr(config: &LoggerConfig, key: &str, value: &str) -> bool {
    config
        .resource()
        .iter()
        .any(|(k, v)| k.as_str() == key && v.as_str() == value)
}

#[test]
fn test_resource_attributes() {
    let config = LoggerConfig::new("keel".to_string());
    assert!(has_attr(&config, "service.name", "keel"));
    assert!(has_attr(&config, "service.namespace", "keel"));
    assert!(!config
        .resource()
        .iter()
        .any(|(k, _)| k.as_str() == "service.version"));

    let config = config.with_service_version("1.2.3".to_string());
    assert!(has_attr(&config, "service.version", "1.2.3"));
}

#[test]
fn test_format_service_name() {
    assert_eq!(format_service_name("keel", None), "keel");
    assert_eq!(format_service_name("keel", Some("dev")), "keel%dev");
}

#[test]
fn test_build_logger_config_from_file_values() {
    let dir = PathBuf::from("/tmp/keel-logs");
    let lconfig = build_logger_config(&LoggingInitConfig {
        service_base_name: "keel",
        service_label: Some("prod"),
        otlp_url: Some("http://localhost:4317"),
        log_dir: Some(&dir),
        log_file_prefix: None,
        json_format: Some(true),
        service_version: "0.1.0",
    });

    assert_eq!(lconfig.service_name, "keel%prod");
    assert_eq!(lconfig.service_version.as_deref(), Some("0.1.0"));
    assert_eq!(
        lconfig.otlp.map(|otlp| otlp.url).as_deref(),
        Some("http://localhost:4317")
    );
    assert!(lconfig.json_format);

    let file = lconfig.file.expect("file logging configured");
    assert_eq!(file.directory, dir);
    assert_eq!(file.file_name_prefix, "keel");
}

#[test]
fn test_build_logger_config_defaults() {
    let lconfig = build_logger_config(&LoggingInitConfig {
        service_base_name: "keel",
        service_label: None,
        otlp_url: None,
        log_dir: None,
        log_file_prefix: Some("ignored"),
        json_format: None,
        service_version: "0.1.0",
    });

    assert!(lconfig.otlp.is_none());
    assert!(lconfig.file.is_none());
    assert!(!lconfig.json_format);
}
