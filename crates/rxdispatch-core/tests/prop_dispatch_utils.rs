//! Property-based tests for the pure dispatch utilities

use proptest::prelude::*;
use rxdispatch_core::http::{calculate_backoff_delay, is_retryable_status_code, ErrorClassification};
use rxdispatch_core::create_test_order_payload;
use rxdispatch_core::extract_site_id_from_url;

proptest! {
    #[test]
    fn prop_retryable_iff_429_or_5xx(status in 100u16..=999) {
        let expected = status == 429 || (500..=599).contains(&status);
        prop_assert_eq!(is_retryable_status_code(status), expected);
    }

    #[test]
    fn prop_classification_agrees_with_predicate(status in 100u16..=599) {
        prop_assert_eq!(
            ErrorClassification::classify_status(status).is_retryable(),
            is_retryable_status_code(status)
        );
    }

    #[test]
    fn prop_backoff_never_exceeds_max(attempt in 0u32..200, base in 1u64..10_000, max in 1u64..120_000) {
        let delay = calculate_backoff_delay(attempt, base, max);
        prop_assert!(delay <= max);
    }

    #[test]
    fn prop_backoff_is_monotonic(attempt in 0u32..64, base in 1u64..10_000, max in 1u64..120_000) {
        prop_assert!(
            calculate_backoff_delay(attempt, base, max) <= calculate_backoff_delay(attempt + 1, base, max)
        );
    }

    #[test]
    fn prop_site_segment_roundtrip(site in 0u64..10_000_000, host in "[a-z]{3,10}") {
        let url = format!("https://{}.com/api/site/{}/orders", host, site);
        prop_assert_eq!(extract_site_id_from_url(&url), Some(site.to_string()));
    }

    #[test]
    fn prop_test_payload_carries_site_id(site in "[0-9]{1,8}") {
        let payload = create_test_order_payload(Some(&site));
        prop_assert_eq!(payload.site_id.as_deref(), Some(site.as_str()));
        prop_assert!(payload.external_order_id.starts_with("TEST-"));
    }
}
