//! Tests for the configuration management module

use openjob_builder::config::{BuilderConfig, BundleConfig, ConfigPaths, OpenJobConfig};
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn nonexistent_paths() -> ConfigPaths {
    ConfigPaths {
        system: PathBuf::from("/nonexistent/system/config.toml"),
        user: Some(PathBuf::from("/nonexistent/user/config.toml")),
        local: PathBuf::from("/nonexistent/local/openjob.toml"),
    }
}

// ============== Default Value Tests ==============

#[rstest]
fn test_builder_config_defaults() {
    let config = BuilderConfig::default();
    assert!(config.templates_directory.is_none());
    assert_eq!(config.specification_version, "jobtemplate-2023-09");
}

#[rstest]
fn test_bundle_config_defaults() {
    let config = BundleConfig::default();
    assert_eq!(config.output_dir, PathBuf::from("job_bundles"));
    assert_eq!(config.bundle_prefix, "OpenJob");
}

#[rstest]
fn test_openjob_config_defaults() {
    let config = OpenJobConfig::default();
    assert_eq!(config.log_level, "info");
    assert_eq!(config.builder, BuilderConfig::default());
    assert_eq!(config.bundle, BundleConfig::default());
}

// ============== Config Paths Tests ==============

#[rstest]
fn test_config_paths_new() {
    let paths = ConfigPaths::new();
    assert_eq!(paths.system, PathBuf::from("/etc/openjob/config.toml"));
    assert_eq!(paths.local, PathBuf::from("openjob.toml"));
    if let Some(user) = &paths.user {
        assert!(user.ends_with("openjob/config.toml"));
    }
}

#[rstest]
fn test_config_paths_existing_paths_empty() {
    assert!(nonexistent_paths().existing_paths().is_empty());
}

#[rstest]
fn test_config_paths_user_config_dir() {
    let paths = ConfigPaths::new();
    if let Some(user_path) = &paths.user {
        assert_eq!(paths.user_config_dir(), user_path.parent());
    }
}

#[rstest]
fn test_existing_paths_with_actual_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "log_level = \"debug\"\n").unwrap();

    let paths = ConfigPaths {
        system: PathBuf::from("/nonexistent"),
        user: Some(config_path.clone()),
        local: PathBuf::from("/nonexistent"),
    };

    let existing = paths.existing_paths();
    assert_eq!(existing, vec![config_path]);
}

// ============== Config Loading Tests ==============

#[rstest]
fn test_load_returns_defaults_when_no_files() {
    let config = OpenJobConfig::load_from_files(&nonexistent_paths().existing_paths()).unwrap();
    assert_eq!(config, OpenJobConfig::default());
}

#[rstest]
fn test_load_from_toml_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let toml_content = r#"
log_level = "debug"

[builder]
templates_directory = "/studio/templates"

[bundle]
output_dir = "/studio/bundles"
bundle_prefix = "Studio"
"#;
    fs::write(&config_path, toml_content).unwrap();

    let config = OpenJobConfig::load_from_files(&[config_path]).unwrap();
    assert_eq!(config.log_level, "debug");
    assert_eq!(
        config.builder.templates_directory.as_deref(),
        Some(Path::new("/studio/templates"))
    );
    assert_eq!(config.bundle.output_dir, PathBuf::from("/studio/bundles"));
    assert_eq!(config.bundle.bundle_prefix, "Studio");
}

#[rstest]
fn test_load_partial_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[bundle]\nbundle_prefix = \"Partial\"\n").unwrap();

    let config = OpenJobConfig::load_from_files(&[config_path]).unwrap();
    assert_eq!(config.bundle.bundle_prefix, "Partial");
    // Unspecified values keep their defaults
    assert_eq!(config.bundle.output_dir, PathBuf::from("job_bundles"));
    assert_eq!(config.log_level, "info");
}

#[rstest]
fn test_load_with_priority_order() {
    let temp_dir = TempDir::new().unwrap();
    let config1_path = temp_dir.path().join("config1.toml");
    let config2_path = temp_dir.path().join("config2.toml");

    fs::write(
        &config1_path,
        "[bundle]\noutput_dir = \"first\"\nbundle_prefix = \"First\"\n",
    )
    .unwrap();
    fs::write(&config2_path, "[bundle]\noutput_dir = \"second\"\n").unwrap();

    let config = OpenJobConfig::load_from_files(&[config1_path, config2_path]).unwrap();
    assert_eq!(config.bundle.output_dir, PathBuf::from("second"));
    assert_eq!(config.bundle.bundle_prefix, "First");
}

#[rstest]
fn test_load_with_paths_uses_existing_files() {
    let temp_dir = TempDir::new().unwrap();
    let local = temp_dir.path().join("openjob.toml");
    fs::write(&local, "log_level = \"warn\"\n").unwrap();

    let paths = ConfigPaths {
        local,
        ..nonexistent_paths()
    };
    let config = OpenJobConfig::load_with_paths(&paths).unwrap();
    assert_eq!(config.log_level, "warn");
}

#[rstest]
fn test_invalid_toml_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[bundle\noutput_dir = ").unwrap();
    assert!(OpenJobConfig::load_from_files(&[config_path]).is_err());
}

// ============== Validation Tests ==============

#[rstest]
fn test_validate_valid_config() {
    assert!(OpenJobConfig::default().validate().is_ok());
}

#[rstest]
#[case("off", true)]
#[case("error", true)]
#[case("WARN", true)]
#[case("debug", true)]
#[case("trace", true)]
#[case("verbose", false)]
#[case("", false)]
fn test_log_level_validation(#[case] level: &str, #[case] expected_valid: bool) {
    let mut config = OpenJobConfig::default();
    config.log_level = level.to_string();
    assert_eq!(config.validate().is_ok(), expected_valid);
}

#[rstest]
fn test_validate_unsupported_specification_version() {
    let mut config = OpenJobConfig::default();
    config.builder.specification_version = "jobtemplate-1999-01".to_string();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("jobtemplate-1999-01"));
}

#[rstest]
fn test_validate_multiple_errors() {
    let mut config = OpenJobConfig::default();
    config.log_level = "loud".to_string();
    config.bundle.output_dir = PathBuf::new();
    config.bundle.bundle_prefix = "  ".to_string();

    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 3);
}

// ============== Serialization Tests ==============

#[rstest]
fn test_generate_default_config() {
    let content = OpenJobConfig::generate_default_config();
    assert!(content.contains("[builder]"));
    assert!(content.contains("[bundle]"));
    assert!(content.contains("OPENJD_TEMPLATES_DIRECTORY"));

    let parsed: OpenJobConfig = toml::from_str(&content).unwrap();
    assert_eq!(parsed, OpenJobConfig::default());
}

#[rstest]
fn test_roundtrip_serialization() {
    let mut original = OpenJobConfig::default();
    original.builder.templates_directory = Some(PathBuf::from("/templates"));
    original.bundle.bundle_prefix = "Roundtrip".to_string();

    let toml_str = original.to_toml().unwrap();
    let loaded: OpenJobConfig = toml::from_str(&toml_str).unwrap();
    assert_eq!(loaded, original);
}

#[rstest]
fn test_resolve_template_path_against_templates_directory() {
    let config = BuilderConfig {
        templates_directory: Some(PathBuf::from("/templates")),
        ..Default::default()
    };
    assert_eq!(
        config.resolve_template_path("environments\\p4_sync_environment.yml"),
        PathBuf::from("/templates/environments/p4_sync_environment.yml")
    );
    assert_eq!(
        config.resolve_template_path("/abs/render_step.yml"),
        PathBuf::from("/abs/render_step.yml")
    );
}
