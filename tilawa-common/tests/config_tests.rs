//! Configuration resolution tests
//!
//! Covers the priority order (CLI → environment → file → defaults) and the
//! missing-file behaviour.
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate TILAWA_CONFIG or TILAWA_AUDIO_BASE are marked with
//! #[serial].

use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;
use tilawa_common::config::{
    locate_config_file, ConfigLocation, ConfigOverrides, TomlConfig, UnderrunPolicy,
    AUDIO_BASE_ENV_VAR, CONFIG_ENV_VAR,
};
use tilawa_common::Error;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

fn clear_env() {
    env::remove_var(CONFIG_ENV_VAR);
    env::remove_var(AUDIO_BASE_ENV_VAR);
}

#[test]
#[serial]
fn test_locate_prefers_cli_path() {
    clear_env();
    env::set_var(CONFIG_ENV_VAR, "/tmp/tilawa-env.toml");

    let location = locate_config_file(Some(std::path::Path::new("/tmp/tilawa-cli.toml")));
    assert_eq!(
        location,
        ConfigLocation::Explicit("/tmp/tilawa-cli.toml".into())
    );

    clear_env();
}

#[test]
#[serial]
fn test_locate_uses_env_var() {
    clear_env();
    env::set_var(CONFIG_ENV_VAR, "/tmp/tilawa-env.toml");

    assert_eq!(
        locate_config_file(None),
        ConfigLocation::Explicit("/tmp/tilawa-env.toml".into())
    );

    clear_env();
}

#[test]
#[serial]
fn test_locate_falls_back_to_platform_default() {
    clear_env();

    match locate_config_file(None) {
        ConfigLocation::Default(path) => {
            assert!(path.ends_with("tilawa/config.toml"));
        }
        ConfigLocation::Unavailable => {}
        other => panic!("Unexpected location: {:?}", other),
    }
}

#[test]
#[serial]
fn test_load_explicit_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        audio_base = "https://cdn.example.org/audio"
        language = "en"

        [output]
        gain = 0.8

        [playback]
        underrun_policy = "stop"
        "#,
    );

    let config = TomlConfig::load(&ConfigOverrides {
        config_path: Some(path),
        ..Default::default()
    })
    .unwrap();

    assert_eq!(config.audio_base, "https://cdn.example.org/audio");
    assert_eq!(config.language, "en");
    assert_eq!(config.reciter, "default");
    assert_eq!(config.output.gain, 0.8);
    assert_eq!(config.playback.underrun_policy, UnderrunPolicy::Stop);
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    clear_env();
    let dir = TempDir::new().unwrap();

    let result = TomlConfig::load(&ConfigOverrides {
        config_path: Some(dir.path().join("absent.toml")),
        ..Default::default()
    });

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_missing_env_named_file_is_error() {
    clear_env();
    let dir = TempDir::new().unwrap();
    env::set_var(CONFIG_ENV_VAR, dir.path().join("absent.toml"));

    let result = TomlConfig::load(&ConfigOverrides::default());
    assert!(matches!(result, Err(Error::Config(_))));

    clear_env();
}

#[test]
#[serial]
fn test_env_audio_base_beats_file_but_not_cli() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "audio_base = \"/from/file\"\n");
    env::set_var(AUDIO_BASE_ENV_VAR, "/from/env");

    let config = TomlConfig::load(&ConfigOverrides {
        config_path: Some(path.clone()),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(config.audio_base, "/from/env");

    let config = TomlConfig::load(&ConfigOverrides {
        config_path: Some(path),
        audio_base: Some("/from/cli".to_string()),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(config.audio_base, "/from/cli");

    clear_env();
}

#[test]
#[serial]
fn test_cli_gain_is_clamped() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");

    let config = TomlConfig::load(&ConfigOverrides {
        config_path: Some(path),
        gain: Some(9.0),
        ..Default::default()
    })
    .unwrap();

    assert_eq!(config.output.gain, 2.0);
}

#[test]
#[serial]
fn test_invalid_values_in_file_rejected() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[output]\nsample_rate = 0\n");

    let result = TomlConfig::load(&ConfigOverrides {
        config_path: Some(path),
        ..Default::default()
    });

    assert!(matches!(result, Err(Error::Config(_))));
}
