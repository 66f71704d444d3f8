//! Configuration loading tests.

use std::io::Write;
use std::time::Duration;

use tollgate_core::config::{Config, StorageConfig};
use tollgate_core::csrf::{CsrfConfig, CsrfError, CsrfGuard, SameSitePolicy, TokenSource};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_toml_file() {
    let file = write_config(
        r#"
[server]
port = 9000

[csrf]
key_lookup = "form:_csrf"
cookie_name = "__Host-csrf"
cookie_path = "/"
cookie_secure = true
cookie_same_site = "lax"
expiration = "15m"
context_key = "csrf"
exempt_paths = ["/webhooks"]

[storage]
backend = "memory"
gc_interval = "30s"
"#,
    );

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

    assert_eq!(config.server.port, 9000);
    assert_eq!(config.csrf.key_lookup, "form:_csrf");
    assert_eq!(config.csrf.cookie_name, "__Host-csrf");
    assert!(config.csrf.cookie_secure);
    assert_eq!(config.csrf.cookie_same_site, SameSitePolicy::Lax);
    assert_eq!(config.csrf.expiration, Duration::from_secs(900));
    assert_eq!(config.csrf.exempt_paths, vec!["/webhooks".to_string()]);
    assert_eq!(
        config.storage,
        StorageConfig::Memory {
            gc_interval: Duration::from_secs(30)
        }
    );
}

#[test]
fn test_empty_file_uses_defaults() {
    let file = write_config("");

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

    assert_eq!(config.server.port, 8080);
    assert_eq!(config.csrf.key_lookup, "header:X-Csrf-Token");
    assert_eq!(config.csrf.cookie_name, "csrf_");
    assert_eq!(config.csrf.expiration, Duration::from_secs(3600));
    assert!(matches!(config.storage, StorageConfig::Memory { .. }));
}

#[test]
fn test_settings_build_a_guard() {
    let file = write_config(
        r#"
[csrf]
key_lookup = "query:csrf_token"
"#,
    );
    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

    let guard = CsrfGuard::new(CsrfConfig::from_settings(&config.csrf)).unwrap();

    assert_eq!(guard.extractor().source(), TokenSource::Query);
    assert_eq!(guard.extractor().key(), "csrf_token");
    assert_eq!(guard.store().name(), "memory");
}

#[test]
fn test_invalid_lookup_in_file_fails_at_guard_construction() {
    let file = write_config(
        r#"
[csrf]
key_lookup = "cookie:csrf_"
"#,
    );
    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

    assert!(CsrfGuard::new(CsrfConfig::from_settings(&config.csrf)).is_err());
}

#[test]
fn test_missing_file_is_an_error() {
    let result = Config::from_file("/nonexistent/tollgate-config");
    assert!(result.is_err());
}

#[test]
fn test_out_of_range_expiration_fails_at_guard_construction() {
    let file = write_config(
        r#"
[csrf]
expiration = "20000y"
"#,
    );
    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

    let result = CsrfGuard::new(CsrfConfig::from_settings(&config.csrf));
    assert!(matches!(result, Err(CsrfError::InvalidExpiration(_))));
}
