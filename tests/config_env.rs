mod common;
use common::ENV_LOCK;

use piwik_pro_mcp::config::Config;
use std::path::PathBuf;

const KEYS: &[&str] = &[
    "PIWIK_PRO_HOST",
    "PIWIK_PRO_CLIENT_ID",
    "PIWIK_PRO_CLIENT_SECRET",
    "PIWIK_PRO_TIMEOUT_MS",
    "PIWIK_PRO_TOKEN_SKEW_SECS",
    "PIWIK_PRO_ENV_FILE",
];

fn snapshot() -> Vec<(&'static str, Option<String>)> {
    KEYS.iter().map(|key| (*key, std::env::var(key).ok())).collect()
}

fn restore(previous: Vec<(&'static str, Option<String>)>) {
    for (key, value) in previous {
        match value {
            Some(value) => std::env::set_var(key, value),
            None => std::env::remove_var(key),
        }
    }
}

fn env_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("{}-{}.env", name, uuid::Uuid::new_v4()));
    std::fs::write(&path, contents).expect("write env file");
    path
}

#[tokio::test]
async fn env_file_fills_missing_variables() {
    let _guard = ENV_LOCK.lock().await;
    let previous = snapshot();
    KEYS.iter().for_each(|key| std::env::remove_var(key));

    let path = env_file(
        "piwik-config",
        "PIWIK_PRO_HOST=acme.piwik.pro\nPIWIK_PRO_CLIENT_ID=from-file\nPIWIK_PRO_CLIENT_SECRET=s3cr3t\nPIWIK_PRO_TIMEOUT_MS=4500\n",
    );
    std::env::set_var("PIWIK_PRO_CLIENT_ID", "from-env");

    let loaded = Config::load(Some(&path));
    let _ = std::fs::remove_file(&path);
    restore(previous);

    let config = loaded.expect("config loads");
    assert_eq!(config.credentials.host(), "https://acme.piwik.pro");
    assert_eq!(config.credentials.client_id(), "from-env");
    assert_eq!(config.timeout_ms, 4500);

    let summary = config.summary().to_string();
    assert!(!summary.contains("s3cr3t"));
    assert!(!format!("{:?}", config).contains("s3cr3t"));
}

#[tokio::test]
async fn missing_env_file_is_a_configuration_error() {
    let _guard = ENV_LOCK.lock().await;
    let previous = snapshot();

    let loaded = Config::load(Some(&std::env::temp_dir().join("does-not-exist-piwik.env")));
    restore(previous);

    let err = loaded.unwrap_err();
    assert_eq!(err.code, "CONFIGURATION_ERROR");
    assert!(err.message.contains("does-not-exist-piwik.env"));
}
