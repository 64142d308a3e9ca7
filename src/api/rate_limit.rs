//! Per-client request budgets.
//!
//! Budgets are fixed windows kept in a DashMap. Every client IP has one
//! budget per tier. Code verification also has a budget per (client, email)
//! pair, so one inbox cannot be ground through by spreading guesses across
//! the general auth budget.

use axum::{
    async_trait,
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{request::Parts, Extensions, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::ApiError;
use crate::config::RateLimitConfig;
use crate::workflow::normalize_email;
use crate::AppState;

pub const RATE_LIMITED_TOTAL: &str = "rate_limited_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    /// Everything behind the general router
    Api,
    /// Signup, verification and login
    Auth,
}

impl RateLimitTier {
    fn as_str(&self) -> &'static str {
        match self {
            RateLimitTier::Api => "api",
            RateLimitTier::Auth => "auth",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BudgetKey {
    Client(IpAddr, RateLimitTier),
    Verify(IpAddr, String),
}

#[derive(Debug)]
struct Window {
    started: Instant,
    used: u32,
}

/// An admitted request and what is left of its budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the window starts over
    pub reset_after: u64,
}

pub struct RateLimiter {
    windows: DashMap<BudgetKey, Window>,
    config: RateLimitConfig,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            window: Duration::from_secs(config.window_seconds.max(1)),
            config,
        }
    }

    /// Spend one request from the client's budget for `tier`.
    /// `Err` carries the seconds to wait.
    pub fn check_client(&self, ip: IpAddr, tier: RateLimitTier) -> Result<Admission, u64> {
        self.admit(BudgetKey::Client(ip, tier), self.limit_for(tier))
    }

    /// Spend one verification attempt for this client and email
    pub fn check_verify_attempt(&self, ip: IpAddr, email: &str) -> Result<Admission, u64> {
        self.admit(
            BudgetKey::Verify(ip, normalize_email(email)),
            self.config.verify_attempts_per_window,
        )
    }

    pub fn limit_for(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Api => self.config.api_requests_per_window,
            RateLimitTier::Auth => self.config.auth_requests_per_window,
        }
    }

    fn admit(&self, key: BudgetKey, limit: u32) -> Result<Admission, u64> {
        if !self.config.enabled {
            return Ok(Admission {
                limit: u32::MAX,
                remaining: u32::MAX,
                reset_after: 0,
            });
        }

        let now = Instant::now();
        let mut window = self.windows.entry(key).or_insert(Window {
            started: now,
            used: 0,
        });

        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.used = 0;
        }

        let reset_after = self
            .window
            .saturating_sub(now.duration_since(window.started))
            .as_secs()
            .max(1);

        if window.used >= limit {
            return Err(reset_after);
        }

        window.used += 1;
        Ok(Admission {
            limit,
            remaining: limit - window.used,
            reset_after,
        })
    }

    /// Forget windows that have run out. Returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.windows.len();
        let now = Instant::now();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

/// Client address: proxy headers first, then the socket peer
fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> IpAddr {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|ip| ip.trim().parse().ok())
    };
    let peer = || {
        extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    };

    forwarded
        .or_else(real_ip)
        .or_else(peer)
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Extractor for handlers that apply their own budget
pub struct ClientIp(pub IpAddr);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(client_ip(&parts.headers, &parts.extensions)))
    }
}

/// Log and count a refused request
pub fn rejected(ip: IpAddr, budget: &'static str, retry_after: u64) -> ApiError {
    tracing::warn!(ip = %ip, budget, retry_after, "Rate limit exceeded");
    metrics::counter!(RATE_LIMITED_TOTAL, "budget" => budget).increment(1);
    ApiError::rate_limited(retry_after)
}

pub async fn rate_limit_api(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    limit_tier(&state, request, next, RateLimitTier::Api).await
}

pub async fn rate_limit_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    limit_tier(&state, request, next, RateLimitTier::Auth).await
}

async fn limit_tier(
    state: &AppState,
    request: Request<Body>,
    next: Next,
    tier: RateLimitTier,
) -> Result<Response, ApiError> {
    let ip = client_ip(request.headers(), request.extensions());
    let admission = state
        .rate_limiter
        .check_client(ip, tier)
        .map_err(|retry_after| rejected(ip, tier.as_str(), retry_after))?;

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(admission.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(admission.remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(admission.reset_after));
    Ok(response)
}

/// Periodically drop expired windows
pub fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>, cleanup_interval_secs: u64) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(cleanup_interval_secs.max(1)));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            let dropped = rate_limiter.cleanup_expired();
            tracing::debug!(dropped, tracked = rate_limiter.tracked(), "Rate limit windows cleaned");
        }
    });
}
