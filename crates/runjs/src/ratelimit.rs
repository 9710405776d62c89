//! Fixed-window request limiting
//!
//! One global window caps the total request rate and one window per client
//! caps each client. Windows reset lazily: a window whose start is older
//! than the window length is restarted by the next request that touches
//! it. Idle client entries are swept probabilistically after admissions so
//! the table stays bounded without a background task.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::RateLimitConfig;
use crate::types::ErrorKind;

/// Decision for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,

    /// The global cap was reached. Per-client counts are untouched.
    GlobalLimited,

    /// The client's cap was reached. The request still counted globally.
    ClientLimited,
}

impl Admission {
    #[must_use]
    pub fn is_admitted(self) -> bool {
        self == Admission::Admitted
    }

    /// Classification of a rejection, `None` when admitted
    pub fn error_kind(self) -> Option<ErrorKind> {
        match self {
            Admission::Admitted => None,
            Admission::GlobalLimited | Admission::ClientLimited => Some(ErrorKind::RateLimited),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            started: now,
        }
    }

    fn is_expired(&self, now: Instant, length: Duration) -> bool {
        now.saturating_duration_since(self.started) > length
    }

    /// Restart the window if it has expired
    fn refresh(&mut self, now: Instant, length: Duration) {
        if self.is_expired(now, length) {
            *self = Window::new(now);
        }
    }
}

#[derive(Debug)]
struct State {
    global: Window,
    clients: HashMap<String, Window>,
}

/// Global and per-client fixed-window rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                global: Window::new(Instant::now()),
                clients: HashMap::new(),
            }),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Length of one window, also the advertised retry delay
    pub fn window(&self) -> Duration {
        self.config.window()
    }

    /// Count a request from `client` and decide whether it may proceed
    pub fn admit(&self, client: &str) -> Admission {
        let now = Instant::now();
        let admission = self.admit_at(client, now);
        if admission.is_admitted() && rand::random::<f64>() < self.config.sweep_probability {
            self.sweep_at(now);
        }
        admission
    }

    /// [`admit`](Self::admit) at an explicit instant, without sweeping
    pub fn admit_at(&self, client: &str, now: Instant) -> Admission {
        let length = self.window();
        let mut state = self.lock_state();

        state.global.refresh(now, length);
        if state.global.count >= self.config.max_global {
            return Admission::GlobalLimited;
        }
        state.global.count += 1;

        let window = state
            .clients
            .entry(client.to_string())
            .or_insert_with(|| Window::new(now));
        window.refresh(now, length);
        if window.count >= self.config.max_per_client {
            return Admission::ClientLimited;
        }
        window.count += 1;

        Admission::Admitted
    }

    /// Drop client entries whose window has expired
    pub fn sweep_at(&self, now: Instant) {
        let length = self.window();
        let mut state = self.lock_state();
        let before = state.clients.len();
        state
            .clients
            .retain(|_, window| !window.is_expired(now, length));

        let removed = before - state.clients.len();
        if removed > 0 {
            debug!(removed, remaining = state.clients.len(), "swept idle clients");
        }
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.lock_state().clients.len()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        // Counters stay consistent even if a holder panicked
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
