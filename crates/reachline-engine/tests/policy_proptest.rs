use std::time::Duration;

use proptest::prelude::*;

use reachline_engine::config::{parser, validator};
use reachline_engine::retry::RetryPolicy;
use reachline_types::error::StageError;
use reachline_types::state::RunStats;

proptest! {
    #[test]
    fn concurrency_zero_is_the_only_rejected_concurrency(concurrency in 0_usize..8) {
        let yaml = format!(
            r#"
version: "1.0"
name: prop_limits
limits:
  concurrency: {concurrency}
"#
        );

        let config = parser::parse_config_str(&yaml).expect("generated yaml must parse");
        let result = validator::validate_config(&config);

        if concurrency == 0 {
            prop_assert!(result.is_err());
        } else {
            prop_assert!(result.is_ok());
        }
    }

    #[test]
    fn rates_must_be_positive(rate in -2.0_f64..4.0) {
        let yaml = format!(
            r#"
version: "1.0"
name: prop_rates
rate:
  domain_refill_per_sec: {rate}
"#
        );

        let config = parser::parse_config_str(&yaml).expect("generated yaml must parse");
        let result = validator::validate_config(&config);

        if rate > 0.0 {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn backoff_factor_below_one_rejected(factor in 0.1_f64..3.0) {
        let yaml = format!(
            r#"
version: "1.0"
name: prop_backoff
retry:
  backoff_factor: {factor}
"#
        );

        let config = parser::parse_config_str(&yaml).expect("generated yaml must parse");
        let result = validator::validate_config(&config);

        if factor >= 1.0 {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn retry_delay_is_monotone_and_capped(
        initial_ms in 1_u64..2_000,
        factor in 1.0_f64..4.0,
        attempt in 0_u32..12,
    ) {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_secs(60),
            backoff_factor: factor,
        };
        let err = StageError::timeout("T", "slow");

        let delay = policy.delay_for(&err, attempt);
        let next = policy.delay_for(&err, attempt + 1);

        prop_assert!(next >= delay);
        prop_assert!(delay <= policy.max_delay);
        prop_assert!(delay >= Duration::ZERO);
    }

    #[test]
    fn retry_after_hint_always_wins(
        hint_ms in 0_u64..120_000,
        attempt in 0_u32..8,
    ) {
        let policy = RetryPolicy::default();
        let err = StageError::rate_limited("L", "throttled", Some(hint_ms));
        let delay = policy.delay_for(&err, attempt);
        let expected = Duration::from_millis(hint_ms).min(policy.max_delay);
        prop_assert_eq!(delay, expected);
    }

    #[test]
    fn stats_consistency_matches_sum(
        pending in 0_u64..100,
        processing in 0_u64..100,
        completed in 0_u64..100,
        failed in 0_u64..100,
        drift in 0_u64..3,
    ) {
        let exact = pending + processing + completed + failed;
        let stats = RunStats {
            pending,
            processing,
            completed,
            failed,
            total: exact + drift,
        };
        prop_assert_eq!(stats.is_consistent(), drift == 0);
    }
}
