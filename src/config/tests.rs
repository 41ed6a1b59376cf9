use std::io::Write;

use super::*;

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert!(settings.origin.base_url.is_none());
    assert_eq!(settings.origin.fetch_timeout, Duration::from_secs(10));
    assert_eq!(settings.origin.probe_timeout, Duration::from_secs(5));
    assert_eq!(settings.origin.max_concurrent.get(), 5);
    assert_eq!(settings.origin.min_spacing, Duration::from_millis(200));
    assert!(settings.origin.user_agent.starts_with("scan-proxy/"));
    assert_eq!(settings.cache.positive_ttl, Duration::from_secs(86_400));
    assert_eq!(settings.cache.negative_ttl, Duration::from_secs(3_600));
    assert_eq!(
        settings.bandwidth.limit_bytes.get(),
        10 * 1024 * 1024 * 1024
    );
    assert_eq!(settings.chapters, ChapterRange::default());
    assert!(settings.auth.api_key.is_none());
    assert!(settings.auth.admin_key.is_none());
    assert!(settings.cors.allowed_origins.is_empty());
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.origin.max_concurrent = Some(2);

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        origin_max_concurrent: Some(8),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.origin.max_concurrent.get(), 8);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn base_url_gains_trailing_slash() {
    let mut raw = RawSettings::default();
    raw.origin.base_url = Some(" https://scans.example.org/mirror ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    let base = settings.origin.base_url.expect("base url");
    assert_eq!(base.as_str(), "https://scans.example.org/mirror/");
    assert_eq!(
        base.join("files/scans/OP1/01.png")
            .expect("joined url")
            .as_str(),
        "https://scans.example.org/mirror/files/scans/OP1/01.png"
    );
}

#[test]
fn rejects_non_http_base_url() {
    let mut raw = RawSettings::default();
    raw.origin.base_url = Some("ftp://scans.example.org".to_string());

    let err = Settings::from_raw(raw).expect_err("ftp is not allowed");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "origin.base_url",
            ..
        }
    ));
}

#[test]
fn rejects_zero_ttls_and_limits() {
    let mut raw = RawSettings::default();
    raw.cache.negative_ttl_seconds = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "cache.negative_ttl_seconds",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.bandwidth.limit_bytes = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "bandwidth.limit_bytes",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.origin.max_concurrent = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn rejects_durations_beyond_one_year() {
    let mut raw = RawSettings::default();
    raw.apply_serve_overrides(&ServeOverrides {
        cache_positive_ttl_seconds: Some(u64::MAX),
        ..Default::default()
    });
    match Settings::from_raw(raw) {
        Err(LoadError::Invalid { key, reason }) => {
            assert_eq!(key, "cache.positive_ttl_seconds");
            assert!(reason.contains("must not exceed"), "{reason}");
        }
        other => panic!("expected invalid TTL, got {other:?}"),
    }

    let mut raw = RawSettings::default();
    raw.cache.sweep_interval_seconds = Some(MAX_DURATION_SECS + 1);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "cache.sweep_interval_seconds",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.cache.negative_ttl_seconds = Some(MAX_DURATION_SECS);
    let settings = Settings::from_raw(raw).expect("one year is accepted");
    assert_eq!(
        settings.cache.negative_ttl,
        Duration::from_secs(MAX_DURATION_SECS)
    );
}

#[test]
fn zero_spacing_disables_pacing() {
    let mut raw = RawSettings::default();
    raw.origin.min_spacing_ms = Some(0);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.origin.min_spacing, Duration::ZERO);
}

#[test]
fn chapter_bounds_are_validated() {
    let mut raw = RawSettings::default();
    raw.chapters.min = Some(100);
    raw.chapters.max = Some(50);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "chapters.max",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.chapters.min = Some(u64::from(u32::MAX) + 1);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        chapters_min: Some(900),
        chapters_max: Some(1200),
        ..Default::default()
    };
    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.chapters.min(), 900);
    assert_eq!(settings.chapters.max(), Some(1200));
}

#[test]
fn blank_keys_are_treated_as_unset() {
    let mut raw = RawSettings::default();
    raw.auth.api_key = Some("   ".to_string());
    raw.auth.admin_key = Some(" admin ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.auth.api_key.is_none());
    assert_eq!(settings.auth.admin_key.as_deref(), Some("admin"));
    assert!(!format!("{:?}", settings.auth).contains("admin\""));
}

#[test]
fn cors_origins_are_normalised() {
    let mut raw = RawSettings::default();
    raw.cors.allowed_origins = Some(vec![
        "https://reader.example.org/".to_string(),
        " ".to_string(),
        "http://localhost:5173".to_string(),
    ]);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.cors.allowed_origins,
        vec![
            "https://reader.example.org".to_string(),
            "http://localhost:5173".to_string()
        ]
    );

    let mut raw = RawSettings::default();
    raw.cors.allowed_origins = Some(vec!["not a url".to_string()]);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn parse_cli_arguments() {
    let args = CliArgs::parse_from([
        "scan-proxy",
        "--server-host",
        "0.0.0.0",
        "--origin-base-url",
        "https://scans.example.org",
        "--bandwidth-limit-bytes",
        "1048576",
        "--log-json",
        "yes",
    ]);

    assert_eq!(args.overrides.server_host.as_deref(), Some("0.0.0.0"));
    assert_eq!(
        args.overrides.origin_base_url.as_deref(),
        Some("https://scans.example.org")
    );
    assert_eq!(args.overrides.bandwidth_limit_bytes, Some(1_048_576));
    assert_eq!(args.overrides.log_json, Some(true));
}

#[test]
fn loads_explicit_config_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config file");
    writeln!(
        file,
        r#"
[origin]
base_url = "https://scans.example.org"
min_spacing_ms = 350

[cache]
negative_ttl_seconds = 120

[auth]
admin_key = "ops"

[cors]
allowed_origins = ["https://reader.example.org"]
"#
    )
    .expect("write config");

    let cli = CliArgs {
        config_file: Some(file.path().to_path_buf()),
        overrides: ServeOverrides {
            cache_negative_ttl_seconds: Some(90),
            ..Default::default()
        },
    };

    let settings = load(&cli).expect("settings load");
    assert_eq!(
        settings.origin.base_url.map(|url| url.to_string()),
        Some("https://scans.example.org/".to_string())
    );
    assert_eq!(settings.origin.min_spacing, Duration::from_millis(350));
    assert_eq!(settings.cache.negative_ttl, Duration::from_secs(90));
    assert_eq!(settings.auth.admin_key.as_deref(), Some("ops"));
    assert_eq!(
        settings.cors.allowed_origins,
        vec!["https://reader.example.org".to_string()]
    );
}
