// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Rotation controller behaviour against scripted providers

use super::mock::{
    auth_error, controller, network_error, rate_limited, registered, settings, ScriptedProvider,
    Step,
};
use fabstir_search_gateway::search::{
    FailureReason, HealthState, RateLimit, SearchContext, SearchError, SearchRotationController,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_first_provider_serves_results() {
    let a = ScriptedProvider::always("a", Step::Results(3));
    let b = ScriptedProvider::always("b", Step::Results(3));
    let controller = controller(registered(&[&a, &b]));

    let response = controller.search("rust async runtimes").await.unwrap();

    assert_eq!(response.provider, "a");
    assert!(!response.cached);
    assert_eq!(response.provider_calls, 1);
    assert_eq!(response.result_count, 3);
    assert_eq!(response.results[0].rank, 1);
    assert_eq!(response.results[2].rank, 3);
    assert_eq!(b.calls(), 0);
}

#[tokio::test]
async fn test_denied_then_network_then_success() {
    let a = ScriptedProvider::always("a", Step::Results(2));
    let b = ScriptedProvider::always("b", network_error());
    let c = ScriptedProvider::always("c", Step::Results(2));

    let mut providers = registered(&[&a, &b, &c]);
    providers[0] = providers[0].clone().with_rate_limit(RateLimit::per_minute(1));
    let controller = controller(providers);

    // Use up a's only slot for this window
    assert!(controller.context().limiter.try_acquire("a"));

    let response = controller.search("climate data").await.unwrap();

    assert_eq!(response.provider, "c");
    assert_eq!(response.result_count, 2);
    assert_eq!(response.provider_calls, 2);
    assert_eq!(a.calls(), 0);
    assert_eq!(b.calls(), 1);
    assert_eq!(c.calls(), 1);

    let cached = controller.context().cache.get("climate data").unwrap();
    assert_eq!(cached.provider, "c");
    assert_eq!(cached.results, response.results);
}

#[tokio::test]
async fn test_all_providers_fail_is_exhausted() {
    let a = ScriptedProvider::always("a", network_error());
    let b = ScriptedProvider::always("b", rate_limited());
    let c = ScriptedProvider::always("c", auth_error());
    let controller = controller(registered(&[&a, &b, &c]));

    let err = controller.search("obscure query").await.unwrap_err();

    match &err {
        SearchError::Exhausted { query, failures } => {
            assert_eq!(query, "obscure query");
            assert_eq!(failures.len(), 3);
            assert_eq!(failures[0].provider, "a");
            assert!(matches!(failures[0].reason, FailureReason::Network { .. }));
            assert_eq!(
                failures[1].reason,
                FailureReason::RateLimited {
                    retry_after_secs: Some(30)
                }
            );
            assert!(matches!(failures[2].reason, FailureReason::Auth { .. }));
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    assert!(controller.context().cache.is_empty());
    assert!(err.to_string().contains("a: network error"));
}

#[tokio::test]
async fn test_calls_never_exceed_budget() {
    let providers: Vec<Arc<ScriptedProvider>> = (0..8)
        .map(|i| ScriptedProvider::always(&format!("p{}", i), network_error()))
        .collect();
    let refs: Vec<&Arc<ScriptedProvider>> = providers.iter().collect();
    let controller = controller(registered(&refs));

    let err = controller.search("anything").await.unwrap_err();
    assert_eq!(err.failures().len(), 5);

    let total: usize = providers.iter().map(|p| p.calls()).sum();
    assert_eq!(total, 5);
    assert_eq!(providers[5].calls(), 0);

    let err = controller.search_with_budget("something else", 2).await.unwrap_err();
    assert_eq!(err.failures().len(), 2);
    let total: usize = providers.iter().map(|p| p.calls()).sum();
    assert_eq!(total, 7);
}

#[tokio::test]
async fn test_throttled_providers_do_not_consume_budget() {
    let limited: Vec<Arc<ScriptedProvider>> = (0..4)
        .map(|i| ScriptedProvider::always(&format!("limited{}", i), Step::Results(1)))
        .collect();
    let fallback = ScriptedProvider::always("fallback", Step::Results(1));

    let mut refs: Vec<&Arc<ScriptedProvider>> = limited.iter().collect();
    refs.push(&fallback);
    let providers: Vec<_> = registered(&refs)
        .into_iter()
        .enumerate()
        .map(|(i, p)| if i < 4 { p.with_rate_limit(RateLimit::per_minute(1)) } else { p })
        .collect();
    let controller = controller(providers);
    for i in 0..4 {
        assert!(controller.context().limiter.try_acquire(&format!("limited{}", i)));
    }

    let response = controller.search_with_budget("rust", 1).await.unwrap();
    assert_eq!(response.provider, "fallback");
    assert_eq!(response.provider_calls, 1);
    assert!(limited.iter().all(|p| p.calls() == 0));
}

#[tokio::test]
async fn test_limiter_denied_provider_is_never_invoked() {
    let a = ScriptedProvider::always("a", Step::Results(1));
    let b = ScriptedProvider::always("b", Step::Results(1));
    let mut providers = registered(&[&a, &b]);
    providers[0] = providers[0]
        .clone()
        .with_rate_limit(RateLimit::new(2, Duration::from_secs(60)));
    let controller = controller(providers);

    for i in 0..5 {
        let response = controller.search(&format!("query {}", i)).await.unwrap();
        let expected = if i < 2 { "a" } else { "b" };
        assert_eq!(response.provider, expected);
    }

    assert_eq!(a.calls(), 2);
    assert_eq!(b.calls(), 3);
    assert_eq!(controller.providers()[0].remaining_calls, Some(0));
}

#[tokio::test]
async fn test_cache_hit_makes_no_provider_calls() {
    let a = ScriptedProvider::always("a", Step::Results(2));
    let controller = controller(registered(&[&a]));

    let first = controller.search("Rust   Ownership").await.unwrap();
    let second = controller.search("  rust ownership ").await.unwrap();

    assert_eq!(a.calls(), 1);
    assert!(second.cached);
    assert_eq!(second.provider_calls, 0);
    assert_eq!(second.provider, "a");
    assert_eq!(second.results, first.results);
    assert_eq!(second.query, "  rust ownership ");
}

#[tokio::test]
async fn test_repeated_queries_are_idempotent() {
    let a = ScriptedProvider::scripted("a", vec![Step::Results(3)], Step::Results(1));
    let controller = controller(registered(&[&a]));

    let first = controller.search("same query").await.unwrap();
    for _ in 0..5 {
        let again = controller.search("same query").await.unwrap();
        assert_eq!(again.results, first.results);
        assert_eq!(again.result_count, 3);
    }
    assert_eq!(a.calls(), 1);
}

#[tokio::test]
async fn test_auth_failure_disables_provider_for_later_queries() {
    let a = ScriptedProvider::always("a", auth_error());
    let b = ScriptedProvider::always("b", Step::Results(1));
    let controller = controller(registered(&[&a, &b]));

    let first = controller.search("first").await.unwrap();
    assert_eq!(first.provider, "b");
    assert_eq!(first.provider_calls, 2);

    let second = controller.search("second").await.unwrap();
    assert_eq!(second.provider, "b");
    assert_eq!(second.provider_calls, 1);
    assert_eq!(a.calls(), 1);

    match &controller.providers()[0].state {
        HealthState::Disabled { reason } => assert!(reason.contains("401")),
        other => panic!("expected disabled, got {:?}", other),
    }
}

#[tokio::test]
async fn test_exhausted_reports_disabled_provider() {
    let a = ScriptedProvider::always("a", auth_error());
    let controller = controller(registered(&[&a]));

    let first = controller.search("first").await.unwrap_err();
    assert!(matches!(first.failures()[0].reason, FailureReason::Auth { .. }));

    let second = controller.search("second").await.unwrap_err();
    assert_eq!(a.calls(), 1);
    assert_eq!(second.failures().len(), 1);
    assert_eq!(second.failures()[0].provider, "a");
    match &second.failures()[0].reason {
        FailureReason::Unavailable {
            state: HealthState::Disabled { reason },
        } => assert!(reason.contains("401")),
        other => panic!("expected disabled provider, got {:?}", other),
    }
    assert!(second.to_string().contains("a: disabled"));
}

#[tokio::test]
async fn test_cooling_down_provider_is_reported_without_using_budget() {
    let flaky = ScriptedProvider::always("flaky", network_error());
    let steady = ScriptedProvider::always("steady", Step::Results(1));
    let context = SearchContext::new(100, 1, Duration::from_secs(60));
    let controller =
        SearchRotationController::new(registered(&[&flaky, &steady]), context, settings());

    let err = controller.search_with_budget("one", 1).await.unwrap_err();
    assert!(matches!(err.failures()[0].reason, FailureReason::Network { .. }));
    assert_eq!(steady.calls(), 0);

    let response = controller.search_with_budget("two", 1).await.unwrap();
    assert_eq!(response.provider, "steady");
    assert_eq!(response.provider_calls, 1);
    assert_eq!(flaky.calls(), 1);

    let lone = SearchRotationController::new(
        registered(&[&flaky]),
        controller.context().clone(),
        settings(),
    );
    let err = lone.search("three").await.unwrap_err();
    assert_eq!(flaky.calls(), 1);
    assert!(matches!(
        err.failures()[0].reason,
        FailureReason::Unavailable {
            state: HealthState::CoolingDown { .. }
        }
    ));
}

#[tokio::test]
async fn test_results_carry_configured_provider_name() {
    let a = ScriptedProvider::always("a", Step::Results(2));
    let providers: Vec<_> = registered(&[&a])
        .into_iter()
        .map(|p| p.with_name("a-backup"))
        .collect();
    let controller = controller(providers);

    let response = controller.search("renamed").await.unwrap();
    assert_eq!(response.provider, "a-backup");
    assert!(response.results.iter().all(|r| r.source == "a-backup"));

    let cached = controller.search("renamed").await.unwrap();
    assert!(cached.cached);
    assert!(cached.results.iter().all(|r| r.source == "a-backup"));
}

#[tokio::test]
async fn test_empty_results_do_not_cool_down_provider() {
    let a = ScriptedProvider::always("a", Step::Results(0));
    let context = SearchContext::new(100, 1, Duration::from_secs(60));
    let controller = SearchRotationController::new(registered(&[&a]), context, settings());

    let err = controller.search("nothing here").await.unwrap_err();
    assert_eq!(err.failures()[0].reason, FailureReason::EmptyResult);
    assert_eq!(controller.providers()[0].state, HealthState::Healthy);

    controller.search("still nothing").await.unwrap_err();
    assert_eq!(a.calls(), 2);
}

#[tokio::test]
async fn test_timeout_counts_as_network_failure_and_rotates() {
    let slow = ScriptedProvider::always("slow", Step::Slow(Duration::from_secs(5), 1));
    let fast = ScriptedProvider::always("fast", Step::Results(1));
    let mut settings = settings();
    settings.request_timeout = Duration::from_millis(50);
    let mut providers = registered(&[&slow, &fast]);
    providers[0] = providers[0].clone().with_rate_limit(RateLimit::per_minute(10));
    let controller = SearchRotationController::new(providers, SearchContext::default(), settings);

    let response = controller.search("slow query").await.unwrap();

    assert_eq!(response.provider, "fast");
    assert_eq!(response.provider_calls, 2);
    assert!(response.search_time_ms < 5000);
    // The timed out call still holds its limiter slot
    assert_eq!(controller.context().limiter.remaining("slow"), Some(9));
}

#[tokio::test]
async fn test_timeout_failure_reason() {
    let slow = ScriptedProvider::always("slow", Step::Slow(Duration::from_secs(5), 1));
    let mut settings = settings();
    settings.request_timeout = Duration::from_millis(20);
    let controller =
        SearchRotationController::new(registered(&[&slow]), SearchContext::default(), settings);

    let err = controller.search("slow").await.unwrap_err();
    match &err.failures()[0].reason {
        FailureReason::Network { message } => assert!(message.contains("timed out")),
        other => panic!("expected network failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_results_rotate_to_next_provider() {
    let a = ScriptedProvider::always("a", Step::Results(0));
    let b = ScriptedProvider::always("b", Step::Results(2));
    let controller = controller(registered(&[&a, &b]));

    let response = controller.search("niche topic").await.unwrap();
    assert_eq!(response.provider, "b");
    assert_eq!(response.provider_calls, 2);

    let a_only = ScriptedProvider::always("a", Step::Results(0));
    let controller = super::mock::controller(registered(&[&a_only]));
    let err = controller.search("niche topic").await.unwrap_err();
    assert_eq!(err.failures()[0].reason, FailureReason::EmptyResult);
}

#[tokio::test]
async fn test_repeated_transient_failures_cool_down_provider() {
    let flaky = ScriptedProvider::always("flaky", rate_limited());
    let steady = ScriptedProvider::always("steady", Step::Results(1));
    let context = SearchContext::new(100, 2, Duration::from_secs(60));
    let controller =
        SearchRotationController::new(registered(&[&flaky, &steady]), context, settings());

    controller.search("one").await.unwrap();
    controller.search("two").await.unwrap();
    assert_eq!(flaky.calls(), 2);
    assert!(matches!(
        controller.providers()[0].state,
        HealthState::CoolingDown { .. }
    ));

    let third = controller.search("three").await.unwrap();
    assert_eq!(third.provider_calls, 1);
    assert_eq!(flaky.calls(), 2);

    controller.context().health.reset("flaky");
    controller.search("four").await.unwrap();
    assert_eq!(flaky.calls(), 3);
}

#[tokio::test]
async fn test_network_retry_on_same_provider() {
    let a = ScriptedProvider::scripted("a", vec![network_error()], Step::Results(2));
    let b = ScriptedProvider::always("b", Step::Results(2));
    let mut settings = settings();
    settings.network_retries = 1;
    let controller =
        SearchRotationController::new(registered(&[&a, &b]), SearchContext::default(), settings);

    let response = controller.search("retry me").await.unwrap();
    assert_eq!(response.provider, "a");
    assert_eq!(response.provider_calls, 2);
    assert_eq!(a.calls(), 2);
    assert_eq!(b.calls(), 0);
}

#[tokio::test]
async fn test_network_retry_respects_budget() {
    let a = ScriptedProvider::always("a", network_error());
    let mut settings = settings();
    settings.network_retries = 3;
    let controller =
        SearchRotationController::new(registered(&[&a]), SearchContext::default(), settings);

    let err = controller.search_with_budget("retry me", 2).await.unwrap_err();
    assert_eq!(a.calls(), 2);
    assert_eq!(err.failures().len(), 2);
}

#[tokio::test]
async fn test_providers_receive_trimmed_query() {
    let a = ScriptedProvider::always("a", Step::Results(1));
    let controller = controller(registered(&[&a]));

    controller.search("  Tokio\tRuntime  ").await.unwrap();
    assert_eq!(a.queries(), vec!["Tokio Runtime".to_string()]);
}

#[tokio::test]
async fn test_invalid_queries_are_rejected() {
    let a = ScriptedProvider::always("a", Step::Results(1));
    let controller = controller(registered(&[&a]));

    for query in ["", "   \t ", "1234567"] {
        let err = controller.search(query).await.unwrap_err();
        assert!(matches!(err, SearchError::InvalidQuery { .. }));
    }
    assert_eq!(a.calls(), 0);
}

#[tokio::test]
async fn test_batch_search_shares_context() {
    let a = ScriptedProvider::always("a", Step::Results(2));
    let controller = controller(registered(&[&a]));

    let queries = vec![
        "rust".to_string(),
        "tokio".to_string(),
        "serde".to_string(),
    ];
    let outcomes = controller.batch_search(&queries).await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert_eq!(a.calls(), 3);
    assert_eq!(controller.context().cache.len(), 3);

    let again = controller.batch_search(&queries).await;
    assert!(again.iter().all(|o| o.as_ref().unwrap().cached));
    assert_eq!(a.calls(), 3);
}

#[tokio::test]
async fn test_concurrent_searches_respect_shared_limit() {
    let a = ScriptedProvider::always("a", Step::Slow(Duration::from_millis(20), 1));
    let b = ScriptedProvider::always("b", Step::Results(1));
    let mut providers = registered(&[&a, &b]);
    providers[0] = providers[0].clone().with_rate_limit(RateLimit::per_minute(3));
    let controller = Arc::new(controller(providers));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.search(&format!("query {}", i)).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(a.calls(), 3);
    assert_eq!(b.calls(), 7);
}
