use cfgdiff_core::config::{BlockTransform, ConfigError, DiffConfig, ScalarCurve};

#[test]
fn defaults_reproduce_the_linear_identity_formulas() {
    let config = DiffConfig::default();
    assert_eq!(config.match_threshold, 0.5);
    assert_eq!(config.scalar_curve, ScalarCurve::Linear);
    assert_eq!(config.block_transform, BlockTransform::Identity);
    assert!(config.reference_features);
}

#[test]
fn partial_json_falls_back_to_defaults() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("diff.json");
    std::fs::write(&path, r#"{ "scalar_curve": "squared", "match_threshold": 0.7 }"#).unwrap();

    let config = DiffConfig::from_json_file(&path).expect("load config");
    assert_eq!(config.scalar_curve, ScalarCurve::Squared);
    assert_eq!(config.match_threshold, 0.7);
    assert_eq!(config.block_transform, BlockTransform::Identity);
    assert!(config.reference_features);
}

#[test]
fn full_json_round_trips() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("diff.json");
    let config = DiffConfig {
        match_threshold: 0.25,
        scalar_curve: ScalarCurve::Squared,
        block_transform: BlockTransform::Sqrt,
        reference_features: false,
    };
    std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

    let loaded = DiffConfig::from_json_file(&path).expect("load config");
    assert_eq!(loaded, config);
}

#[test]
fn malformed_json_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("diff.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = DiffConfig::from_json_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = DiffConfig::from_json_file(std::path::Path::new("no/such/config.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
