use filing_processor::config::RetryConfig;
use filing_processor::models::FilingType;
use proptest::prelude::*;

/// Strategy for positive filing ids
pub fn filing_id_strategy() -> impl Strategy<Value = i64> {
    1i64..10_000_000
}

/// Strategy for plausible legal names
pub fn legal_name_strategy() -> impl Strategy<Value = String> {
    "[A-Z][A-Z0-9 ]{2,40} (LTD\\.|INC\\.|CORP\\.)"
}

/// Strategy for filing type names outside the known set
pub fn unknown_filing_type_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z]{2,30}".prop_filter("must not be a known filing type", |name| {
        name.parse::<FilingType>().is_err()
    })
}

/// Strategy for valid retry policies
pub fn retry_config_strategy() -> impl Strategy<Value = RetryConfig> {
    (1u32..10, 1u64..5_000, 0u64..100_000, 1.0f64..4.0).prop_map(
        |(max_attempts, base_delay_ms, extra_ms, backoff_multiplier)| RetryConfig {
            max_attempts,
            base_delay_ms,
            max_delay_ms: base_delay_ms + extra_ms,
            backoff_multiplier,
        },
    )
}

/// Strategy for arbitrary JSON queue bodies, mostly malformed
pub fn queue_body_strategy() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i64>().prop_map(serde_json::Value::from),
        "[a-z]{0,8}".prop_map(serde_json::Value::from),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::from),
            prop::collection::hash_map("(filing|id|data|[a-z]{1,5})", inner, 0..4)
                .prop_map(|map| serde_json::Value::Object(map.into_iter().collect())),
        ]
    })
}
