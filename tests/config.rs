// tests/config.rs

mod common;
use crate::common::{TestResult, init_tracing};

use std::fs;
use std::time::Duration;

use devloop::cli::CliArgs;
use devloop::config::{ConfigFile, Settings, load_config, load_from_path};
use devloop::errors::DevloopError;
use devloop::types::UpstreamAddr;
use tempfile::tempdir;

fn cli(server_cmd: &str) -> CliArgs {
    CliArgs {
        server_cmd: Some(server_cmd.to_string()),
        ..CliArgs::default()
    }
}

fn parse(toml_src: &str) -> ConfigFile {
    toml::from_str(toml_src).expect("valid test TOML")
}

#[test]
fn defaults_apply_without_file() -> TestResult {
    init_tracing();

    let settings = Settings::resolve(&cli("./server {}"), None)?;

    assert_eq!(settings.listen_addr, "127.0.0.1:8080");
    assert_eq!(settings.upstream, UpstreamAddr::new("127.0.0.1", 18080));
    assert_eq!(
        settings.build_cmd.as_ref().map(|c| c.raw().to_string()),
        Some("make".to_string())
    );
    assert!(settings.live_reload);
    assert!(settings.web_root.is_none());
    assert_eq!(settings.watch_extensions, vec![".tmpl", ".html", ".css", ".js"]);
    assert_eq!(settings.stop_grace, Duration::from_secs(10));
    assert_eq!(settings.retry.attempts, 10);
    assert_eq!(settings.retry.initial_delay, Duration::from_millis(500));
    Ok(())
}

#[test]
fn file_values_fill_in_unset_flags() -> TestResult {
    let file = parse(
        r#"
        [server]
        cmd = "./bin/app -addr {}"
        host = "localhost"
        port = 9000
        stop_grace = "2s"

        [build]
        cmd = "cargo build"

        [proxy]
        addr = "0.0.0.0:3000"
        live_reload = false

        [watch]
        extensions = ["html", ".css"]
        flush_interval = "250ms"

        [restart]
        attempts = 3
        initial_delay = "50ms"
        "#,
    );

    let settings = Settings::resolve(&CliArgs::default(), Some(file))?;

    assert_eq!(settings.server_cmd.raw(), "./bin/app -addr {}");
    assert_eq!(settings.upstream, UpstreamAddr::new("localhost", 9000));
    assert_eq!(settings.listen_addr, "0.0.0.0:3000");
    assert!(!settings.live_reload);
    assert_eq!(settings.flush_interval, Duration::from_millis(250));
    assert_eq!(settings.stop_grace, Duration::from_secs(2));
    assert_eq!(settings.retry.attempts, 3);
    assert_eq!(settings.retry.initial_delay, Duration::from_millis(50));
    assert_eq!(settings.watch_filter()?.extensions(), &[".html", ".css"]);
    Ok(())
}

#[test]
fn flags_override_the_file() -> TestResult {
    let file = parse(
        r#"
        [server]
        cmd = "from-file {}"
        port = 9000

        [proxy]
        addr = "127.0.0.1:3000"
        live_reload = true
        "#,
    );

    let args = CliArgs {
        server_cmd: Some("from-flag {port}".to_string()),
        port: Some(9100),
        addr: Some("127.0.0.1:4000".to_string()),
        live_reload: Some(false),
        build_cmd: Some(String::new()),
        ..CliArgs::default()
    };
    let settings = Settings::resolve(&args, Some(file))?;

    assert_eq!(settings.server_cmd.raw(), "from-flag {port}");
    assert_eq!(settings.upstream.port(), 9100);
    assert_eq!(settings.listen_addr, "127.0.0.1:4000");
    assert!(!settings.live_reload);
    // An empty build command disables the build step.
    assert!(settings.build_cmd.is_none());
    Ok(())
}

#[test]
fn web_root_is_made_absolute() -> TestResult {
    let dir = tempdir()?;
    let args = CliArgs {
        web_root: Some(dir.path().to_path_buf()),
        ..cli("srv {}")
    };

    let settings = Settings::resolve(&args, None)?;
    let root = settings.web_root.ok_or("web root missing")?;
    assert!(root.is_absolute());
    Ok(())
}

#[test]
fn missing_server_command_is_a_config_error() {
    let err = Settings::resolve(&CliArgs::default(), None).unwrap_err();
    assert!(matches!(err, DevloopError::Config(msg) if msg.contains("missing server command")));
}

#[test]
fn malformed_commands_are_rejected() {
    let err = Settings::resolve(&cli("serve \"{}"), None).unwrap_err();
    assert!(matches!(err, DevloopError::Config(msg) if msg.contains("server command")));

    let args = CliArgs {
        build_cmd: Some("make 'oops".to_string()),
        ..cli("serve {}")
    };
    let err = Settings::resolve(&args, None).unwrap_err();
    assert!(matches!(err, DevloopError::Config(msg) if msg.contains("build command")));
}

#[test]
fn invalid_values_fail_validation() {
    let cases = [
        ("[server]\nport = 0\n", "upstream port"),
        ("[proxy]\naddr = \"no-port\"\n", "proxy address"),
        ("[restart]\nattempts = 0\n", "attempts"),
        ("[watch]\nflush_interval = \"0s\"\n", "flush_interval"),
        ("[server]\nstop_grace = \"soon\"\n", "stop_grace"),
    ];

    for (src, needle) in cases {
        let err = Settings::resolve(&cli("serve {}"), Some(parse(src))).unwrap_err();
        match err {
            DevloopError::Config(msg) => {
                assert!(msg.contains(needle), "{src:?}: {msg:?} should mention {needle:?}")
            }
            other => panic!("{src:?}: expected config error, got {other:?}"),
        }
    }
}

#[test]
fn bad_exclude_glob_is_rejected() {
    let file = parse("[watch]\nexclude = [\"src/[\"]\n");
    assert!(Settings::resolve(&cli("serve {}"), Some(file)).is_err());
}

#[test]
fn loads_files_from_disk() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("devloop.toml");
    fs::write(&path, "[server]\ncmd = \"serve {}\"\n")?;

    let file = load_from_path(&path)?;
    assert_eq!(file.server.cmd.as_deref(), Some("serve {}"));

    let loaded = load_config(Some(&path))?;
    assert!(loaded.is_some());
    Ok(())
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(load_config(Some(&missing)).is_err());
}

#[test]
fn toml_syntax_errors_surface() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[server\ncmd = ")?;

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, DevloopError::Toml(_)));
    Ok(())
}
