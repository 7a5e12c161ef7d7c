// tests/config.rs
//
// Config resolution: explicit path, env overrides, and sanitizing.
// Env-var tests are serialized; they share process state.

use serial_test::serial;
use std::env;
use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use clip_fetcher::config::app::{
    ProviderKind, ENV_CONFIG_PATH, ENV_NORMALIZE_MODE, ENV_RETENTION_DIR, ENV_RETENTION_TTL_SECS,
    ENV_SWEEP_INTERVAL_SECS, ENV_YTDLP_COOKIES,
};
use clip_fetcher::{AppConfig, NormalizeMode};

fn clear_env() {
    for k in [
        ENV_CONFIG_PATH,
        ENV_RETENTION_DIR,
        ENV_RETENTION_TTL_SECS,
        ENV_SWEEP_INTERVAL_SECS,
        ENV_NORMALIZE_MODE,
        ENV_YTDLP_COOKIES,
    ] {
        env::remove_var(k);
    }
}

fn write_config(body: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    f.write_all(body.as_bytes()).unwrap();
    f
}

#[test]
#[serial]
fn explicit_path_is_loaded() {
    clear_env();
    let f = write_config(
        r#"
[retention]
dir = "/tmp/clips"
ttl_secs = 120

[normalize]
mode = "strict"

[providers]
order = ["ytdlp", "tikwm", "ytdlp"]
"#,
    );
    env::set_var(ENV_CONFIG_PATH, f.path());

    let cfg = AppConfig::load_default().unwrap();
    assert_eq!(cfg.retention.dir, PathBuf::from("/tmp/clips"));
    assert_eq!(cfg.retention.ttl(), Duration::from_secs(120));
    assert_eq!(cfg.retention.sweep_interval(), Duration::from_secs(300));
    assert_eq!(cfg.normalize.mode, NormalizeMode::Strict);
    assert_eq!(cfg.providers.order, vec![ProviderKind::Ytdlp, ProviderKind::Tikwm]);
    clear_env();
}

#[test]
#[serial]
fn missing_explicit_path_is_an_error() {
    clear_env();
    env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
    assert!(AppConfig::load_default().is_err());
    clear_env();
}

#[test]
#[serial]
fn env_overrides_win_over_file() {
    clear_env();
    let f = write_config("[retention]\nttl_secs = 120\n");
    env::set_var(ENV_CONFIG_PATH, f.path());
    env::set_var(ENV_RETENTION_TTL_SECS, "45");
    env::set_var(ENV_SWEEP_INTERVAL_SECS, "10");
    env::set_var(ENV_RETENTION_DIR, "/var/tmp/clips");
    env::set_var(ENV_NORMALIZE_MODE, "permissive");
    env::set_var(ENV_YTDLP_COOKIES, "/etc/cookies.txt");

    let cfg = AppConfig::load_default().unwrap();
    assert_eq!(cfg.retention.ttl_secs, 45);
    assert_eq!(cfg.retention.sweep_interval_secs, 10);
    assert_eq!(cfg.retention.dir, PathBuf::from("/var/tmp/clips"));
    assert_eq!(cfg.normalize.mode, NormalizeMode::Permissive);
    assert_eq!(
        cfg.providers.cookies_path,
        Some(PathBuf::from("/etc/cookies.txt"))
    );
    clear_env();
}

#[test]
#[serial]
fn bad_env_values_are_rejected() {
    clear_env();
    let f = write_config("");
    env::set_var(ENV_CONFIG_PATH, f.path());
    assert!(AppConfig::load_default().is_ok());

    env::set_var(ENV_RETENTION_TTL_SECS, "five minutes");
    assert!(AppConfig::load_default().is_err());

    env::remove_var(ENV_RETENTION_TTL_SECS);
    env::set_var(ENV_NORMALIZE_MODE, "loose");
    assert!(AppConfig::load_default().is_err());
    clear_env();
}
