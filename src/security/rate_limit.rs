use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use dashmap::{DashMap, mapref::entry::Entry};

use crate::errors::AppError;
use crate::logging::{SanitizedIpAddr, SecurityEvent};

/// Once this many clients are tracked, finished windows are dropped before
/// a new one is opened.
const PRUNE_THRESHOLD: usize = 1024;

/// Peers whose `X-Forwarded-For` / `X-Real-IP` headers are believed.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies(Arc<[IpAddr]>);

impl TrustedProxies {
    pub fn new(proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        Self(proxies.into_iter().collect())
    }

    fn contains(&self, ip: IpAddr) -> bool {
        self.0.contains(&ip)
    }
}

/// Fixed-window attempt counter per client IP, one per throttled form.
#[derive(Clone)]
pub struct RateLimiterState {
    scope: &'static str,
    max_requests: u32,
    window: Duration,
    proxies: TrustedProxies,
    buckets: Arc<DashMap<IpAddr, RateWindow>>,
}

#[derive(Debug)]
struct RateWindow {
    started_at: Instant,
    hits: u32,
}

impl RateLimiterState {
    pub fn new(
        scope: &'static str,
        calls: NonZeroU32,
        window: Duration,
        proxies: TrustedProxies,
    ) -> Self {
        Self {
            scope,
            max_requests: calls.get(),
            window,
            proxies,
            buckets: Arc::new(DashMap::new()),
        }
    }

    /// 10 attempts per minute.
    pub fn login(proxies: TrustedProxies) -> Self {
        Self::new(
            "login",
            NonZeroU32::MIN.saturating_add(9),
            Duration::from_secs(60),
            proxies,
        )
    }

    /// 5 attempts per five minutes.
    pub fn registration(proxies: TrustedProxies) -> Self {
        Self::new(
            "registration",
            NonZeroU32::MIN.saturating_add(4),
            Duration::from_secs(5 * 60),
            proxies,
        )
    }

    /// Counts a hit, or returns how long the client has to wait.
    fn register(&self, ip: IpAddr, now: Instant) -> Result<(), Duration> {
        if self.buckets.len() >= PRUNE_THRESHOLD && !self.buckets.contains_key(&ip) {
            self.prune(now);
        }

        match self.buckets.entry(ip) {
            Entry::Occupied(mut entry) => {
                let bucket = entry.get_mut();
                let elapsed = now.duration_since(bucket.started_at);

                if elapsed >= self.window {
                    bucket.started_at = now;
                    bucket.hits = 0;
                }

                if bucket.hits >= self.max_requests {
                    let elapsed = now.duration_since(bucket.started_at);
                    return Err(self.window.saturating_sub(elapsed));
                }

                bucket.hits += 1;
                Ok(())
            }
            Entry::Vacant(entry) => {
                entry.insert(RateWindow {
                    started_at: now,
                    hits: 1,
                });
                Ok(())
            }
        }
    }

    fn prune(&self, now: Instant) {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.started_at) < self.window);
        tracing::debug!(
            scope = self.scope,
            dropped = before.saturating_sub(self.buckets.len()),
            "Finished rate-limit windows dropped"
        );
    }
}

pub async fn enforce_rate_limit(
    State(state): State<RateLimiterState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client_ip = select_client_ip(request.headers(), addr.ip(), &state.proxies);

    if let Err(retry_after) = state.register(client_ip, Instant::now()) {
        crate::log_security_event!(
            SecurityEvent::RateLimitExceeded,
            client_ip = %SanitizedIpAddr::new(client_ip),
            scope = state.scope,
            retry_after_secs = retry_after.as_secs(),
            "Too many attempts from client"
        );

        return Err(AppError::RateLimitExceeded {
            retry_after: Some(retry_after.max(Duration::from_secs(1))),
        });
    }

    Ok(next.run(request).await)
}

/// The peer address, unless the peer is a trusted proxy that says who it
/// forwarded for. `X-Forwarded-For` is read right to left, skipping
/// addresses of trusted proxies.
fn select_client_ip(headers: &HeaderMap, peer: IpAddr, proxies: &TrustedProxies) -> IpAddr {
    if !proxies.contains(peer) {
        return peer;
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| {
            raw.rsplit(',')
                .filter_map(|ip| ip.trim().parse::<IpAddr>().ok())
                .find(|ip| !proxies.contains(*ip))
        });

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .and_then(|ip| ip.trim().parse().ok());

    forwarded.or(real_ip).unwrap_or(peer)
}
