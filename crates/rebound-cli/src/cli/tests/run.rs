use super::{parse, parse_err};
use crate::cli::{Cli, CliCommand};
use clap::error::ErrorKind;
use clap::Parser;

#[test]
fn cli_parse_run_defaults() {
    match parse(&["rebound", "run", "curl", "-fsS", "https://example.com"]) {
        CliCommand::Run {
            retries,
            delay_ms,
            once,
            fallback,
            async_mode,
            json,
            command,
        } => {
            assert_eq!(retries, None);
            assert_eq!(delay_ms, None);
            assert!(!once);
            assert!(fallback.is_none());
            assert!(!async_mode);
            assert!(!json);
            assert_eq!(command, vec!["curl", "-fsS", "https://example.com"]);
        }
        other => panic!("expected Run, got {:?}", other),
    }
}

#[test]
fn cli_parse_run_flags_before_separator() {
    match parse(&[
        "rebound",
        "run",
        "--retries",
        "5",
        "--delay-ms",
        "250",
        "--async",
        "--json",
        "--",
        "make",
        "--keep-going",
    ]) {
        CliCommand::Run {
            retries,
            delay_ms,
            async_mode,
            json,
            command,
            ..
        } => {
            assert_eq!(retries, Some(5));
            assert_eq!(delay_ms, Some(250));
            assert!(async_mode);
            assert!(json);
            assert_eq!(command, vec!["make", "--keep-going"]);
        }
        other => panic!("expected Run, got {:?}", other),
    }
}

#[test]
fn cli_parse_run_negative_retries() {
    match parse(&["rebound", "run", "--retries", "-5", "true"]) {
        CliCommand::Run { retries, .. } => assert_eq!(retries, Some(-5)),
        other => panic!("expected Run, got {:?}", other),
    }
}

#[test]
fn cli_parse_run_fallback() {
    match parse(&["rebound", "run", "--fallback", "cat cache.json", "--", "fetch"]) {
        CliCommand::Run {
            fallback, command, ..
        } => {
            assert_eq!(fallback.as_deref(), Some("cat cache.json"));
            assert_eq!(command, vec!["fetch"]);
        }
        other => panic!("expected Run, got {:?}", other),
    }
}

#[test]
fn cli_parse_run_requires_command() {
    assert_eq!(
        parse_err(&["rebound", "run"]),
        ErrorKind::MissingRequiredArgument
    );
}

#[test]
fn cli_parse_once_conflicts_with_retries() {
    assert_eq!(
        parse_err(&["rebound", "run", "--once", "--retries", "2", "true"]),
        ErrorKind::ArgumentConflict
    );
}

#[test]
fn cli_parse_global_log_flag() {
    let cli = Cli::try_parse_from(["rebound", "run", "--log", "debug", "true"]).unwrap();
    assert_eq!(cli.log.as_deref(), Some("debug"));
}
