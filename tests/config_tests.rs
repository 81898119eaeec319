//! Configuration system tests
//!
//! Tests configuration loading, validation, and environment overrides
//! through the public API.

mod common;

use std::time::Duration;

use common::ConfigFixture;
use eliza_daemon::config::DaemonConfig;
use eliza_daemon::error::Error;
use eliza_daemon::types::{Domain, ImpactTier};

// ─────────────────────────────────────────────────────────────────
// Valid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_minimal_config() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[daemon]

[reasoning]
provider = "mock"
"#,
    );

    let config = DaemonConfig::load(Some(fixture.path())).unwrap();
    assert_eq!(config.cycle_period(), Duration::from_secs(600));
    assert_eq!(config.ledger.min_samples, 20);
    assert!(config.actions.dry_run);
}

#[test]
fn test_full_config() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[daemon]
name = "eliza-prod"
cycle_period_secs = 300
deliberation_timeout_secs = 120
reasoning_timeout_secs = 30
max_concurrent_reasoning = 4

[impact]
coordination_tags = ["legal"]
include_compliance = false

[impact.mining]
high_impact_amount = 250.0
coordination_tier = "medium"

[ledger]
window_days = 14
suspension_threshold = 0.4
min_samples = 10

[connectors]
timeout_ms = 5000

[connectors.mining]
url = "https://pool.example.com/events"
token = "secret"

[reasoning]
provider = "openai"
base_url = "https://api.openai.com/v1"
model = "gpt-4o-mini"

[actions]
dry_run = false

[actions.reward]
url = "https://treasury.example.com/rewards"

[notifications]
webhook_url = "https://discord.example.com/webhook"

[logging]
level = "debug"
json_format = true

[storage]
data_dir = "/tmp/eliza/data"
"#,
    );

    let config = DaemonConfig::load(Some(fixture.path())).unwrap();
    assert_eq!(config.daemon_name(), "eliza-prod");
    assert_eq!(config.deliberation_timeout(), Duration::from_secs(120));
    assert_eq!(config.connector_timeout(), Duration::from_millis(5000));
    assert_eq!(config.impact.for_domain(Domain::Mining).coordination_tier, ImpactTier::Medium);
    assert_eq!(config.impact.for_domain(Domain::Mining).high_impact_amount, Some(250.0));
    assert!(!config.impact.include_compliance);
    assert_eq!(
        config.connectors.for_domain(Domain::Mining).url.as_deref(),
        Some("https://pool.example.com/events")
    );
    assert!(config.connectors.for_domain(Domain::Social).url.is_none());
    assert!(!config.actions.dry_run);
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_deliberation_longer_than_cycle() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[daemon]
cycle_period_secs = 60
deliberation_timeout_secs = 120
"#,
    );

    let err = DaemonConfig::load(Some(fixture.path())).unwrap_err();
    assert!(matches!(err, Error::ConfigValidation { .. }));
    assert!(err.is_fatal());
}

#[test]
fn test_invalid_connector_url() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[connectors.social]
url = "ftp://feeds.example.com"
"#,
    );

    let err = DaemonConfig::load(Some(fixture.path())).unwrap_err();
    assert!(matches!(err, Error::ConfigValidation { .. }));
}

#[test]
fn test_invalid_suspension_threshold() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[ledger]
suspension_threshold = 1.5
"#,
    );

    assert!(DaemonConfig::load(Some(fixture.path())).is_err());
}

#[test]
fn test_malformed_toml() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[daemon\ncycle_period_secs = ");

    let err = DaemonConfig::load(Some(fixture.path())).unwrap_err();
    assert!(matches!(err, Error::ConfigParse { .. }));
    assert_eq!(err.exit_code(), 10);
}

#[test]
fn test_missing_explicit_file() {
    let err = DaemonConfig::load(Some("/nonexistent/eliza/daemon.toml")).unwrap_err();
    assert!(matches!(err, Error::ConfigNotFound { .. }));
}

// ─────────────────────────────────────────────────────────────────
// Init
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_init_creates_loadable_file() {
    let fixture = ConfigFixture::new();
    let path = fixture.temp_dir.path().join("generated.toml");
    let path_str = path.to_str().unwrap();

    eliza_daemon::config::init_config(Some(path_str), false).unwrap();
    assert!(path.exists());
    assert!(DaemonConfig::load(Some(path_str)).is_ok());

    // Refuses to overwrite without force
    assert!(eliza_daemon::config::init_config(Some(path_str), false).is_err());
    assert!(eliza_daemon::config::init_config(Some(path_str), true).is_ok());
}
