//! Stealth and timing policy.
//!
//! The only place that makes random choices for pacing, identity headers
//! and proxy selection. Stages stay deterministic apart from the delays
//! applied before each tool launch.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::seq::IndexedRandom;
use rand::Rng;
use recon_core::{ScanMode, ScanSettings};

/// Built-in identity pool used when none is configured.
pub const DEFAULT_USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36",
];

pub const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Delay window in seconds for a mode.
pub fn delay_bounds(mode: ScanMode) -> RangeInclusive<f64> {
    match mode {
        ScanMode::Stealth => 2.0..=5.0,
        ScanMode::Normal => 0.5..=1.5,
        ScanMode::Aggressive => 0.01..=0.1,
    }
}

/// HTTP identity presented by probing and scanning tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityHeaders {
    pub user_agent: String,
    pub accept: &'static str,
}

impl IdentityHeaders {
    /// `Name: value` lines, as passed to a tool's `-H` flag.
    pub fn header_lines(&self) -> [String; 2] {
        [
            format!("User-Agent: {}", self.user_agent),
            format!("Accept: {}", self.accept),
        ]
    }
}

/// Mode-dependent pacing plus identity and proxy pools.
///
/// Immutable after construction, so one instance is shared read-only across
/// concurrent tool invocations.
#[derive(Debug, Clone)]
pub struct StealthPolicy {
    mode: ScanMode,
    user_agents: Vec<String>,
    proxies: Vec<String>,
}

impl StealthPolicy {
    pub fn new(mode: ScanMode, user_agents: Vec<String>, proxies: Vec<String>) -> Self {
        let user_agents = if user_agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect()
        } else {
            user_agents
        };
        Self {
            mode,
            user_agents,
            proxies,
        }
    }

    pub fn from_settings(settings: &ScanSettings) -> Self {
        Self::new(
            settings.mode,
            settings.user_agents.clone(),
            settings.proxies.clone(),
        )
    }

    /// Draw the next delay from the mode's uniform window.
    pub fn next_delay(&self) -> Duration {
        let secs = rand::rng().random_range(delay_bounds(self.mode));
        Duration::from_secs_f64(secs)
    }

    /// Sleep for a freshly drawn delay.
    pub async fn pace(&self) {
        let delay = self.next_delay();
        tracing::debug!(mode = %self.mode, delay_ms = delay.as_millis() as u64, "Pacing before tool launch");
        tokio::time::sleep(delay).await;
    }

    /// A random identity from the pool plus the fixed Accept header.
    pub fn headers(&self) -> IdentityHeaders {
        let user_agent = self
            .user_agents
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_else(|| DEFAULT_USER_AGENTS[0].to_string());
        IdentityHeaders {
            user_agent,
            accept: ACCEPT,
        }
    }

    /// A random proxy endpoint, or `None` when no proxies are configured.
    pub fn proxy(&self) -> Option<&str> {
        self.proxies.choose(&mut rand::rng()).map(String::as_str)
    }
}
