use super::*;
use figment::Jail;

#[test]
fn test_default_config() {
    let config = AppConfig::default();

    assert_eq!(config.app.name, "unknown");
    assert_eq!(config.app.version, "local");
    assert!(config.app.keywords.is_empty());
    assert!(config.logging.is_none());
}

#[test]
fn test_from_raw_ignores_entry_sections() {
    let raw = br#"
app:
  name: greeter
  version: v1.2.0
  keywords: ["rk", "demo"]
myEntry:
  name: ut
  enabled: true
http:
  - name: greeter
    port: 8080
"#;

    let config = AppConfig::from_raw(raw).expect("Failed to load config");

    assert_eq!(config.app.name, "greeter");
    assert_eq!(config.app.version, "v1.2.0");
    assert_eq!(config.app.keywords, vec!["rk", "demo"]);
    assert!(config.logging.is_none());
}

#[test]
fn test_from_raw_accepts_json() {
    let raw = br#"{"app": {"name": "json-app"}, "myEntry": {"name": "ut", "enabled": true}}"#;

    let config = AppConfig::from_raw(raw).expect("Failed to load JSON config");

    assert_eq!(config.app.name, "json-app");
    // Unspecified fields keep their defaults
    assert_eq!(config.app.version, "local");
}

#[test]
fn test_from_raw_logging_sections() {
    let raw = br#"
logging:
  default:
    console_level: warn
    file: logs/app.log
    file_level: info
  "rkboot::event":
    console_level: "off"
    file: logs/event.log
    file_level: info
    max_backups: 5
"#;

    let config = AppConfig::from_raw(raw).expect("Failed to load config");
    let logging = config.logging.expect("logging section");

    assert_eq!(logging.len(), 2);
    assert_eq!(logging["default"].console_level, "warn");
    assert_eq!(logging["rkboot::event"].file, "logs/event.log");
    assert_eq!(logging["rkboot::event"].max_backups, Some(5));
}

#[test]
fn test_from_raw_rejects_invalid_utf8() {
    let raw = [0xff, 0xfe, 0xfd];
    assert!(AppConfig::from_raw(&raw).is_err());
}

#[test]
fn test_env_overrides_document() {
    Jail::expect_with(|jail| {
        jail.set_env("RKBOOT__APP__DESCRIPTION", "from-env");

        let config = AppConfig::from_raw(b"app:\n  description: from-file\n  version: v2\n")
            .map_err(|e| e.to_string())?;

        assert_eq!(config.app.description, "from-env");
        assert_eq!(config.app.version, "v2");
        Ok(())
    });
}

#[test]
fn test_yaml_serialization() {
    let mut config = AppConfig::default();
    config.logging = Some(default_logging_config());
    let yaml = config.to_yaml().expect("Failed to serialize to YAML");

    assert!(yaml.contains("app:"));
    assert!(yaml.contains("logging:"));
    assert!(yaml.contains("console_level"));
}

#[test]
fn test_cli_overrides_verbose_levels() {
    let test_cases = vec![
        (0, "info"),  // Default, no change
        (1, "debug"), // One -v
        (2, "trace"), // Two -v
        (3, "trace"), // Three+ -v (capped at trace)
    ];

    for (verbose_level, expected_log_level) in test_cases {
        let mut config = AppConfig::default();
        let args = CliArgs {
            verbose: verbose_level,
            ..Default::default()
        };

        config.apply_cli_overrides(&args);

        let logging = config.logging.as_ref().unwrap();
        assert_eq!(
            logging["default"].console_level, expected_log_level,
            "Failed for verbose level {verbose_level}"
        );
    }
}
