//! Tests for playlist, config and session option resolution.

use super::parse;
use crate::cli::commands::SessionOptions;
use crate::cli::CliCommand;
use dlq_core::config::DlqConfig;
use std::path::PathBuf;

#[test]
fn cli_parse_playlist() {
    match parse(&["dlq", "playlist", "https://media.test/list?id=9"]) {
        CliCommand::Playlist {
            url,
            dest,
            jobs,
            performance,
            json,
        } => {
            assert_eq!(url, "https://media.test/list?id=9");
            assert!(dest.is_none());
            assert!(jobs.is_none());
            assert!(performance.is_none());
            assert!(!json);
        }
        _ => panic!("expected Playlist"),
    }
}

#[test]
fn cli_parse_playlist_performance() {
    match parse(&[
        "dlq",
        "playlist",
        "https://media.test/list",
        "--performance",
        "2",
        "--jobs",
        "4",
    ]) {
        CliCommand::Playlist {
            performance, jobs, ..
        } => {
            assert_eq!(performance, Some(2));
            assert_eq!(jobs, Some(4));
        }
        _ => panic!("expected Playlist with --performance"),
    }
}

#[test]
fn cli_parse_config() {
    assert!(matches!(parse(&["dlq", "config"]), CliCommand::Config));
}

#[test]
fn session_jobs_override_config() {
    let cfg = DlqConfig::default();
    let opts = SessionOptions::resolve(&cfg, Some(PathBuf::from("/tmp")), Some(2), true).unwrap();
    assert_eq!(opts.config.max_concurrent, 2);
    assert_eq!(opts.dest, PathBuf::from("/tmp"));
    assert!(opts.json);

    let opts = SessionOptions::resolve(&cfg, None, None, false).unwrap();
    assert_eq!(opts.config.max_concurrent, cfg.max_concurrent);
    assert_eq!(opts.dest, std::env::current_dir().unwrap());

    assert!(SessionOptions::resolve(&cfg, None, Some(0), false).is_err());
}
