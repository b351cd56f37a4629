use super::{validate_server_url, Settings};

use std::{collections::HashMap, path::PathBuf};

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_point_at_local_server() {
    let settings = Settings::default();
    assert_eq!(settings.server_url, "http://localhost:8000");
    assert_eq!(settings.api_key, None);
    assert_eq!(settings.request_timeout_secs, 30);
}

#[test]
fn file_overrides_defaults_and_keeps_the_rest() {
    let mut settings = Settings::default();
    settings
        .apply_file(
            r#"
server_url = "https://prompts.internal:9000"
request_timeout_secs = 5
"#,
        )
        .expect("file");

    assert_eq!(settings.server_url, "https://prompts.internal:9000");
    assert_eq!(settings.request_timeout_secs, 5);
    assert_eq!(settings.api_key, None);
}

#[test]
fn malformed_file_is_rejected() {
    let mut settings = Settings::default();
    assert!(settings.apply_file("request_timeout_secs = \"soon\"").is_err());
}

#[test]
fn env_overrides_file() {
    let mut settings = Settings::default();
    settings
        .apply_file("server_url = \"http://from-file:8000\"\napi_key = \"file-key\"")
        .expect("file");
    settings.apply_env(env_of(&[
        ("PROMPT_STUDIO_URL", "http://from-env:8000"),
        ("PROMPT_STUDIO_API_KEY", "env-key"),
        ("APP__CREDENTIAL_PATH", "/tmp/studio/credential"),
    ]));

    assert_eq!(settings.server_url, "http://from-env:8000");
    assert_eq!(settings.api_key.as_deref(), Some("env-key"));
    assert_eq!(
        settings.credential_path,
        Some(PathBuf::from("/tmp/studio/credential"))
    );
}

#[test]
fn app_prefixed_env_wins_over_short_names() {
    let mut settings = Settings::default();
    settings.apply_env(env_of(&[
        ("PROMPT_STUDIO_URL", "http://short:8000"),
        ("APP__SERVER_URL", "http://prefixed:8000"),
    ]));
    assert_eq!(settings.server_url, "http://prefixed:8000");
}

#[test]
fn unparsable_timeout_keeps_previous_value() {
    let mut settings = Settings::default();
    settings.apply_env(env_of(&[("APP__REQUEST_TIMEOUT_SECS", "ten")]));
    assert_eq!(settings.request_timeout_secs, 30);

    settings.apply_env(env_of(&[("APP__REQUEST_TIMEOUT_SECS", "10")]));
    assert_eq!(settings.request_timeout().as_secs(), 10);
}

#[test]
fn server_url_must_be_http() {
    assert!(validate_server_url("http://localhost:8000").is_ok());
    assert!(validate_server_url(" https://prompts.example.com/studio/ ").is_ok());
    assert!(validate_server_url("localhost:8000").is_err());
    assert!(validate_server_url("ftp://files.example.com").is_err());
    assert!(validate_server_url("").is_err());
}
