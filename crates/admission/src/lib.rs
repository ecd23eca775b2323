//! Message admission: decides whether a [`TextEvent`] yields an
//! [`AdmittedMessage`], then sanitizes, chunks and deduplicates it.
//!
//! The admission rule order is normative (spec §4.4): channel match, then
//! automated-author gating, then message kind, then emptiness, then command
//! prefixes, then per-author rate limit, then oversize content.

pub mod chunk;
pub mod dedup;
pub mod ratelimit;
pub mod sanitize;

use std::time::Duration;

use tracing::{debug, info, warn};

use voice_relay_core::model::{AdmittedMessage, MessageKind, TextEvent};

use dedup::DedupWindow;
use ratelimit::AuthorRateLimiter;

pub struct AdmissionConfig {
    pub target_channel_id: String,
    pub own_author_id: String,
    pub enable_self_message_processing: bool,
    pub command_prefixes: Vec<String>,
    pub rate_limit_messages: usize,
    pub rate_limit_period: Duration,
    pub max_chars: usize,
    pub chunk_limit: usize,
    pub dedup_window: usize,
}

pub struct Admission {
    config: AdmissionConfig,
    rate_limiter: AuthorRateLimiter,
    dedup: DedupWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    WrongChannel,
    AutomatedAuthor,
    NonDefaultKind,
    Empty,
    CommandPrefix,
    RateLimited,
    Oversize,
    Duplicate,
}

impl Admission {
    pub fn new(config: AdmissionConfig) -> Self {
        let rate_limiter = AuthorRateLimiter::new(config.rate_limit_messages, config.rate_limit_period);
        let dedup = DedupWindow::new(config.dedup_window);
        Self { config, rate_limiter, dedup }
    }

    /// Evaluates all admission rules in order, returning the produced
    /// [`AdmittedMessage`] or the first rule that rejected the event.
    pub fn admit(&self, event: &TextEvent, now: Duration) -> Result<AdmittedMessage, RejectReason> {
        if event.channel_id != self.config.target_channel_id {
            return Err(RejectReason::WrongChannel);
        }

        if event.author_is_automated {
            let is_self = event.author_id == self.config.own_author_id;
            if !(self.config.enable_self_message_processing && is_self) {
                debug!(author_id = %event.author_id, "rejecting automated author");
                return Err(RejectReason::AutomatedAuthor);
            }
        }

        if event.message_kind != MessageKind::Default {
            return Err(RejectReason::NonDefaultKind);
        }

        let trimmed = event.content.trim();
        if trimmed.is_empty() {
            return Err(RejectReason::Empty);
        }

        if self.config.command_prefixes.iter().any(|p| trimmed.starts_with(p.as_str())) {
            return Err(RejectReason::CommandPrefix);
        }

        if !self.rate_limiter.is_allowed(&event.author_id, now) {
            let remaining = self.rate_limiter.remaining_cooldown(&event.author_id, now);
            info!(author_id = %event.author_id, remaining_s = ?remaining, "author rate-limited");
            return Err(RejectReason::RateLimited);
        }

        if event.content.chars().count() > self.config.max_chars {
            return Err(RejectReason::Oversize);
        }

        let sanitized = sanitize::sanitize(&event.content);
        let hash = dedup::content_hash(&sanitized);
        if !self.dedup.admit(hash) {
            warn!(author_id = %event.author_id, "duplicate content within dedup window");
            return Err(RejectReason::Duplicate);
        }

        let chunks = chunk::chunk(&sanitized, self.config.chunk_limit);

        Ok(AdmittedMessage {
            group_id: format!("msg_{}_{}", event.author_id, now.as_nanos()),
            author_id: event.author_id.clone(),
            author_display_name: event.author_id.clone(),
            sanitized_text: sanitized,
            chunks,
            content_hash: hash,
        })
    }
}
