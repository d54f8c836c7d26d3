//! Integration tests for logging setup

use bridge_traits::logging::LogLevel;
use core_runtime::logging::{init_logging, parse_log_level, LogFormat, LoggingConfig};
use core_runtime::Error;

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_spans(true)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
    assert!(config.logger_sink.is_none());
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Compact);
}

#[test]
fn test_cli_strings_parse() {
    let format: LogFormat = "JSON".parse().unwrap();
    assert_eq!(format, LogFormat::Json);
    assert_eq!(parse_log_level("trace").unwrap(), LogLevel::Trace);
}

// The global subscriber can only be installed once per process, so both
// outcomes live in one test.
#[test]
fn test_init_logging_only_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Json)
        .with_level(LogLevel::Debug);

    init_logging(config.clone()).unwrap();
    tracing::info!(target: "core_sync", path = "a.txt", "after init");

    let second = init_logging(config);
    assert!(matches!(second, Err(Error::Config(_))));
}
