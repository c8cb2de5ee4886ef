//! Tests for RateLimiter service

use std::sync::Arc;
use std::time::Duration;

use shared::{RateLimitConfig, ServiceKind};
use tokio::time::Instant;
use crate::services::rate_limiter::RateLimiter;

const WINDOW: Duration = Duration::from_secs(60);

fn limiter(tokens: u64, images: u64) -> RateLimiter {
    RateLimiter::with_limits([(ServiceKind::Content, tokens), (ServiceKind::Image, images)], WINDOW)
}

#[tokio::test(start_paused = true)]
async fn test_admits_within_ceiling_without_waiting() {
    let limiter = limiter(10, 5);

    assert_eq!(limiter.acquire(ServiceKind::Content, 4).await, Duration::ZERO);
    assert_eq!(limiter.acquire(ServiceKind::Content, 4).await, Duration::ZERO);
    assert_eq!(limiter.window_usage(ServiceKind::Content).await, 8);
}

#[tokio::test(start_paused = true)]
async fn test_waits_until_oldest_grant_expires() {
    let limiter = limiter(10, 5);

    limiter.acquire(ServiceKind::Content, 6).await;
    let waited = limiter.acquire(ServiceKind::Content, 6).await;

    assert_eq!(waited, WINDOW);
    assert_eq!(limiter.window_usage(ServiceKind::Content).await, 6);
}

#[tokio::test(start_paused = true)]
async fn test_window_slides() {
    let limiter = limiter(10, 5);

    limiter.acquire(ServiceKind::Content, 5).await;
    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(limiter.acquire(ServiceKind::Content, 5).await, Duration::ZERO);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(limiter.window_usage(ServiceKind::Content).await, 5);

    // Only the second grant (29s old) is still counted, so 5 more fit
    assert_eq!(limiter.acquire(ServiceKind::Content, 5).await, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_oversized_request_is_clamped() {
    let limiter = limiter(5, 5);

    assert_eq!(limiter.acquire(ServiceKind::Content, 50).await, Duration::ZERO);
    assert_eq!(limiter.window_usage(ServiceKind::Content).await, 5);

    let waited = limiter.acquire(ServiceKind::Content, 1).await;
    assert_eq!(waited, WINDOW);
}

#[tokio::test(start_paused = true)]
async fn test_services_are_independent() {
    let limiter = limiter(10, 1);

    limiter.acquire(ServiceKind::Image, 1).await;
    assert_eq!(limiter.window_usage(ServiceKind::Image).await, 1);

    // Image window is full, content is untouched
    assert_eq!(limiter.acquire(ServiceKind::Content, 10).await, Duration::ZERO);
    assert_eq!(limiter.window_usage(ServiceKind::Content).await, 10);
}

#[tokio::test(start_paused = true)]
async fn test_zero_ceiling_means_unlimited() {
    let limiter = RateLimiter::new(&RateLimitConfig {
        tokens_per_window: 0,
        images_per_window: 0,
        window: WINDOW,
    });

    for _ in 0..100 {
        assert_eq!(limiter.acquire(ServiceKind::Content, 1_000_000).await, Duration::ZERO);
    }
    assert_eq!(limiter.ceiling(ServiceKind::Content), None);
    assert_eq!(limiter.window_usage(ServiceKind::Content).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_grants_never_exceed_ceiling() {
    let limiter = Arc::new(limiter(10, 5));
    let start = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move {
            limiter.acquire(ServiceKind::Content, 4).await;
            Instant::now()
        }));
    }

    let mut admitted = Vec::new();
    for handle in handles {
        admitted.push(handle.await.unwrap());
    }
    admitted.sort();

    for (i, at) in admitted.iter().enumerate() {
        let in_window = admitted[i..].iter().filter(|t| t.duration_since(*at) < WINDOW).count() as u64;
        assert!(in_window * 4 <= 10, "window starting at grant {i} holds {in_window} grants");
    }

    // Two grants per window: 0s, 0s, 60s, 60s, 120s
    assert_eq!(admitted[4].duration_since(start), Duration::from_secs(120));
}
