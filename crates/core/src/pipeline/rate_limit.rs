use super::{Outcome, RenderContext, Transformer, TransformerKind};
use crate::context::MessageId;
use crate::error::TransformError;
use chatr_text::RichText;
use rustc_hash::FxHashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

pub const RATE_LIMIT_BYPASS_PERMISSION: &str = "chatr.ratelimit.bypass";

struct SenderWindow {
    window_start: Instant,
    last_seen: Instant,
    count: u32,
    last_allowed: Option<Instant>,
    /// Decisions already made, so every recipient of a message sees the
    /// same outcome.
    decisions: FxHashMap<MessageId, (bool, Instant)>,
}

impl SenderWindow {
    fn new(now: Instant) -> SenderWindow {
        SenderWindow {
            window_start: now,
            last_seen: now,
            count: 0,
            last_allowed: None,
            decisions: FxHashMap::default(),
        }
    }
}

#[derive(Default)]
struct Senders {
    windows: FxHashMap<u128, SenderWindow>,
    last_sweep: Option<Instant>,
}

/// Drops player messages from senders who chat too fast.
///
/// A sender may send `max_messages` per window, with at least `cooldown`
/// between two messages. Messages over the limit are dropped for everyone.
pub struct RateLimiter {
    max_messages: u32,
    window: Duration,
    cooldown: Duration,
    senders: Mutex<Senders>,
}

impl RateLimiter {
    pub fn new(max_messages: u32, window: Duration, cooldown: Duration) -> RateLimiter {
        RateLimiter {
            max_messages,
            window,
            cooldown,
            senders: Mutex::new(Senders::default()),
        }
    }

    fn check(&self, sender: u128, message: MessageId, now: Instant) -> bool {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        // Senders idle this long have no window or cooldown left to enforce
        let idle = self.window.max(self.cooldown) * 2;
        if senders
            .last_sweep
            .is_none_or(|last| now.duration_since(last) >= self.window)
        {
            senders.last_sweep = Some(now);
            senders
                .windows
                .retain(|_, state| now.duration_since(state.last_seen) < idle);
        }

        let state = senders
            .windows
            .entry(sender)
            .or_insert_with(|| SenderWindow::new(now));
        state.last_seen = state.last_seen.max(now);
        if let Some(&(allowed, _)) = state.decisions.get(&message) {
            return allowed;
        }

        if now.duration_since(state.window_start) >= self.window {
            state.window_start = now;
            state.count = 0;
            let keep = self.window * 2;
            state
                .decisions
                .retain(|_, (_, decided)| now.duration_since(*decided) < keep);
        }

        let cooled_down = state
            .last_allowed
            .is_none_or(|last| now.duration_since(last) >= self.cooldown);
        let allowed = state.count < self.max_messages && cooled_down;
        if allowed {
            state.count += 1;
            state.last_allowed = Some(now);
        }
        state.decisions.insert(message, (allowed, now));
        allowed
    }
}

impl Transformer for RateLimiter {
    fn kind(&self) -> TransformerKind {
        TransformerKind::RateLimit
    }

    fn apply(&self, text: RichText, cx: &RenderContext<'_>) -> Result<Outcome, TransformError> {
        let Some(sender) = cx.message.sender_id else {
            return Ok(Outcome::Text(text));
        };
        if cx.sender().is_some_and(|p| p.has_permission(RATE_LIMIT_BYPASS_PERMISSION)) {
            return Ok(Outcome::Text(text));
        }
        if self.check(sender, cx.message.id, Instant::now()) {
            Ok(Outcome::Text(text))
        } else {
            debug!("Rate limited message {} from {:032x}", cx.message.id, sender);
            Ok(Outcome::Drop)
        }
    }
}
