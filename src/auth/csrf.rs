//! CSRF state registry for the OAuth authorization flow.
//!
//! Each `/oauth/authorize` call issues one random state token. The token is
//! valid for a single callback within [`STATE_TTL`]. A background sweep owned
//! by the registry evicts abandoned tokens every [`SWEEP_INTERVAL`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::TryRngCore;
use rand::rngs::OsRng;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, warn};

use crate::types::StateToken;

/// Lifetime of an issued state token.
pub const STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Period of the expired-entry sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Random bytes per state token (256 bits).
const STATE_TOKEN_BYTES: usize = 32;

type StateMap = Arc<RwLock<HashMap<StateToken, Instant>>>;

/// Proof that a state token was redeemed.
///
/// Only [`CsrfRegistry::redeem`] creates one, and redeeming removes the
/// token, so a value of this type can fund exactly one code exchange.
#[derive(Debug)]
pub struct VerifiedState {
    token: StateToken,
}

impl VerifiedState {
    pub fn token(&self) -> &StateToken {
        &self.token
    }
}

/// Concurrency-safe registry of in-flight authorization attempts.
pub struct CsrfRegistry {
    states: StateMap,
    ttl: Duration,
    sweeper: JoinHandle<()>,
}

impl CsrfRegistry {
    /// Create a registry with the standard TTL and sweep interval.
    ///
    /// Must be called from within a Tokio runtime; the sweep task starts
    /// immediately.
    pub fn new() -> Self {
        Self::with_timing(STATE_TTL, SWEEP_INTERVAL)
    }

    /// Create a registry with explicit TTL and sweep interval.
    pub fn with_timing(ttl: Duration, sweep_interval: Duration) -> Self {
        let states: StateMap = Arc::new(RwLock::new(HashMap::new()));
        let sweeper = tokio::spawn(sweep_loop(states.clone(), sweep_interval));

        Self {
            states,
            ttl,
            sweeper,
        }
    }

    /// Issue a fresh state token valid for the registry TTL.
    ///
    /// # Panics
    ///
    /// Panics if the operating system RNG fails. Serving a predictable token
    /// would void the CSRF protection, so there is no fallback.
    pub async fn issue(&self) -> StateToken {
        let token = generate_state_token();
        let expires_at = Instant::now() + self.ttl;

        let mut states = self.states.write().await;
        states.insert(token.clone(), expires_at);
        debug!(pending = states.len(), "Issued OAuth state token");

        token
    }

    /// Redeem a token: remove it and return proof if it was live.
    ///
    /// The entry is removed whether or not it was still valid, so any
    /// second attempt with the same token fails.
    pub async fn redeem(&self, token: &str) -> Option<VerifiedState> {
        let removed = self.states.write().await.remove(token);

        match removed {
            Some(expires_at) if Instant::now() < expires_at => Some(VerifiedState {
                token: StateToken::new(token),
            }),
            Some(_) => {
                warn!("OAuth state token presented after expiry");
                None
            }
            None => {
                warn!("Unknown or already used OAuth state token");
                None
            }
        }
    }

    /// Single-use check of a state token.
    pub async fn consume(&self, token: &str) -> bool {
        self.redeem(token).await.is_some()
    }

    /// Drop every expired entry now. Returns the number removed.
    pub async fn sweep(&self) -> usize {
        sweep_expired(&self.states).await
    }

    /// Number of tokens currently tracked (live or not yet swept).
    pub async fn pending(&self) -> usize {
        self.states.read().await.len()
    }

    /// Stop the background sweep.
    pub fn shutdown(&self) {
        self.sweeper.abort();
    }
}

impl Default for CsrfRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CsrfRegistry {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

async fn sweep_loop(states: StateMap, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let removed = sweep_expired(&states).await;
        if removed > 0 {
            debug!(removed, "Swept expired OAuth state tokens");
        }
    }
}

async fn sweep_expired(states: &StateMap) -> usize {
    let now = Instant::now();
    let mut states = states.write().await;
    let before = states.len();
    states.retain(|_, expires_at| *expires_at > now);
    before - states.len()
}

fn generate_state_token() -> StateToken {
    let mut bytes = [0u8; STATE_TOKEN_BYTES];
    if let Err(e) = OsRng.try_fill_bytes(&mut bytes) {
        panic!("failed to generate secure random state: {}", e);
    }
    StateToken::new(URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_issue_then_consume_once() {
        let registry = CsrfRegistry::new();
        let token = registry.issue().await;

        assert!(registry.consume(token.as_str()).await);
        assert!(!registry.consume(token.as_str()).await);
        assert_eq!(registry.pending().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_token_rejected() {
        let registry = CsrfRegistry::new();
        assert!(!registry.consume("never-issued").await);
        assert!(registry.redeem("").await.is_none());
    }

    #[tokio::test]
    async fn test_tokens_are_unique_and_wide() {
        let registry = CsrfRegistry::new();
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let token = registry.issue().await;
            // 32 bytes, base64url without padding
            assert_eq!(token.as_str().len(), 43);
            assert!(
                token
                    .as_str()
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            );
            assert!(seen.insert(token));
        }
        assert_eq!(registry.pending().await, 64);
    }

    #[tokio::test]
    async fn test_redeem_returns_proof_for_token() {
        let registry = CsrfRegistry::new();
        let token = registry.issue().await;

        let verified = registry.redeem(token.as_str()).await.unwrap();
        assert_eq!(verified.token(), &token);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_rejected_and_removed() {
        // Sweep far in the future so only consume() is exercised.
        let registry = CsrfRegistry::with_timing(STATE_TTL, Duration::from_secs(24 * 3600));
        let token = registry.issue().await;

        tokio::time::advance(STATE_TTL + Duration::from_secs(1)).await;

        assert!(!registry.consume(token.as_str()).await);
        assert_eq!(registry.pending().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_valid_just_before_expiry() {
        let registry = CsrfRegistry::new();
        let token = registry.issue().await;

        tokio::time::advance(STATE_TTL - Duration::from_secs(1)).await;

        assert!(registry.consume(token.as_str()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_evicts_expired() {
        let registry = CsrfRegistry::new();
        registry.issue().await;
        registry.issue().await;
        assert_eq!(registry.pending().await, 2);

        // Auto-advance runs every sweep tick up to and past expiry.
        tokio::time::sleep(STATE_TTL + SWEEP_INTERVAL).await;

        assert_eq!(registry.pending().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_live_tokens() {
        let registry = CsrfRegistry::with_timing(STATE_TTL, Duration::from_secs(24 * 3600));
        let old = registry.issue().await;

        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        let fresh = registry.issue().await;
        tokio::time::advance(Duration::from_secs(5 * 60) + Duration::from_secs(1)).await;

        assert_eq!(registry.sweep().await, 1);
        assert!(!registry.consume(old.as_str()).await);
        assert!(registry.consume(fresh.as_str()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_sweep() {
        let registry = CsrfRegistry::new();
        registry.shutdown();
        registry.issue().await;

        tokio::time::sleep(STATE_TTL + SWEEP_INTERVAL * 2).await;

        // Nothing swept the expired entry.
        assert_eq!(registry.pending().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_consume_single_winner() {
        let registry = Arc::new(CsrfRegistry::new());
        let token = registry.issue().await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                registry.consume(token.as_str()).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
