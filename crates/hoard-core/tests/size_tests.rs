//! Round trips between formatted and parsed cache sizes.

use hoard_core::size::CacheSizeSetting;
use hoard_core::{CachedResult, format_cache_size, parse_max_cache_size};
use pretty_assertions::assert_eq;
use std::path::PathBuf;

#[test]
fn test_parse_recovers_formatted_sizes() {
    for bytes in [0u64, 1023, 1024, 1_048_576, 1_610_612_736] {
        let formatted = format_cache_size(bytes, 2);
        let parsed = parse_max_cache_size(&formatted).expect("formatted size parses");
        let tolerance = (bytes as f64 * 0.005).max(1.0);
        assert!(
            (parsed as f64 - bytes as f64).abs() <= tolerance,
            "{bytes} -> {formatted} -> {parsed}"
        );
    }
}

#[test]
fn test_one_and_a_half_gigabytes() {
    assert_eq!(
        parse_max_cache_size("1.5GB").unwrap(),
        (1.5 * 1024f64.powi(3)) as u64
    );
}

#[test]
fn test_setting_from_yaml_like_json() {
    let settings: Vec<CacheSizeSetting> = serde_json::from_str(r#"[1024, "1 MB"]"#).unwrap();
    let bytes: Vec<u64> = settings.iter().map(|s| s.to_bytes().unwrap()).collect();
    assert_eq!(bytes, vec![1024, 1_048_576]);
}

#[test]
fn test_cached_result_roundtrip() {
    let result = CachedResult {
        terminal_output: "built in 3s".to_string(),
        outputs_path: PathBuf::from("/cache/abc/outputs"),
        code: 0,
        remote: true,
    };

    let json = serde_json::to_string(&result).expect("serialize");
    let parsed: CachedResult = serde_json::from_str(&json).expect("deserialize");

    assert_eq!(result, parsed);
}
