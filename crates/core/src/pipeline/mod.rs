//! Per recipient rendering of a captured message.
//!
//! A message passes through a fixed chain of transformers. Each one gets the
//! text produced by the one before it, and may rewrite it or drop the message
//! for the recipient. A transformer that fails or panics is skipped and the
//! chain goes on with the text from before it.

pub mod filter;
mod mention;
mod placeholder;
mod rate_limit;
mod style;

pub use filter::{ContentFilter, FILTER_BYPASS_PERMISSION, FilterAction};
pub use mention::MentionTransformer;
pub use placeholder::PlaceholderTransformer;
pub use rate_limit::{RATE_LIMIT_BYPASS_PERMISSION, RateLimiter};
pub use style::StyleTransformer;

use crate::config::ChatConfig;
use crate::context::{MessageContext, MessageId};
use crate::error::{ConfigError, TransformError};
use crate::registry::{PlayerRegistry, PlayerSnapshot};
use bitflags::bitflags;
use chatr_text::{RichText, TextComponent};
use once_cell::unsync::OnceCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

bitflags! {
    /// What happened to a message while it was rendered.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FormatFlags: u8 {
        const PLACEHOLDERS = 1 << 0;
        const MENTION = 1 << 1;
        const STYLED = 1 << 2;
        const CENSORED = 1 << 3;
        /// A transformer failed and was skipped.
        const DEGRADED = 1 << 7;
    }
}

impl FormatFlags {
    /// Whether the rendered text differs from what the client would show
    /// without rendering.
    pub fn changed(self) -> bool {
        self.intersects(FormatFlags::all().difference(FormatFlags::DEGRADED))
    }
}

/// The transformers, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransformerKind {
    RateLimit,
    Placeholder,
    Mention,
    Style,
    Filter,
}

impl TransformerKind {
    pub fn name(self) -> &'static str {
        match self {
            TransformerKind::RateLimit => "rate_limit",
            TransformerKind::Placeholder => "placeholder",
            TransformerKind::Mention => "mention",
            TransformerKind::Style => "style",
            TransformerKind::Filter => "filter",
        }
    }

    fn flag(self) -> FormatFlags {
        match self {
            TransformerKind::RateLimit => FormatFlags::empty(),
            TransformerKind::Placeholder => FormatFlags::PLACEHOLDERS,
            TransformerKind::Mention => FormatFlags::MENTION,
            TransformerKind::Style => FormatFlags::STYLED,
            TransformerKind::Filter => FormatFlags::CENSORED,
        }
    }
}

impl FromStr for TransformerKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "rate_limit" => TransformerKind::RateLimit,
            "placeholder" => TransformerKind::Placeholder,
            "mention" => TransformerKind::Mention,
            "style" => TransformerKind::Style,
            "filter" => TransformerKind::Filter,
            _ => return Err(()),
        })
    }
}

impl fmt::Display for TransformerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub enum Outcome {
    Text(RichText),
    /// The recipient does not get the message at all.
    Drop,
}

/// What a transformer may look at while rendering for one recipient.
pub struct RenderContext<'a> {
    pub message: &'a MessageContext,
    pub recipient_id: u128,
    registry: &'a dyn PlayerRegistry,
    recipient: OnceCell<Option<Arc<PlayerSnapshot>>>,
    sender: OnceCell<Option<Arc<PlayerSnapshot>>>,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        message: &'a MessageContext,
        recipient_id: u128,
        registry: &'a dyn PlayerRegistry,
    ) -> RenderContext<'a> {
        RenderContext {
            message,
            recipient_id,
            registry,
            recipient: OnceCell::new(),
            sender: OnceCell::new(),
        }
    }

    pub fn recipient(&self) -> Option<&PlayerSnapshot> {
        self.recipient
            .get_or_init(|| self.registry.snapshot(self.recipient_id))
            .as_deref()
    }

    pub fn sender(&self) -> Option<&PlayerSnapshot> {
        self.sender
            .get_or_init(|| {
                self.message
                    .sender_id
                    .and_then(|uuid| self.registry.snapshot(uuid))
            })
            .as_deref()
    }

    pub fn registry(&self) -> &dyn PlayerRegistry {
        self.registry
    }
}

pub trait Transformer: Send + Sync {
    fn kind(&self) -> TransformerKind;

    fn apply(&self, text: RichText, cx: &RenderContext<'_>) -> Result<Outcome, TransformError>;
}

/// A message as one recipient sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedView {
    pub message_id: MessageId,
    pub recipient_id: u128,
    pub text: TextComponent,
    pub plain: String,
    pub format_flags: FormatFlags,
}

pub struct FormatPipeline {
    chain: Vec<Box<dyn Transformer>>,
    registry: Arc<dyn PlayerRegistry>,
}

impl FormatPipeline {
    pub fn new(mut chain: Vec<Box<dyn Transformer>>, registry: Arc<dyn PlayerRegistry>) -> Self {
        chain.sort_by_key(|transformer| transformer.kind());
        FormatPipeline { chain, registry }
    }

    pub fn from_config(
        config: &ChatConfig,
        registry: Arc<dyn PlayerRegistry>,
    ) -> Result<FormatPipeline, ConfigError> {
        let mut chain: Vec<Box<dyn Transformer>> = Vec::new();
        for kind in config.transformers()? {
            chain.push(match kind {
                TransformerKind::RateLimit => Box::new(RateLimiter::new(
                    config.rate_limit_messages as u32,
                    config.rate_limit_window(),
                    config.rate_limit_cooldown(),
                )),
                TransformerKind::Placeholder => Box::new(PlaceholderTransformer::new(
                    config.placeholders.clone().unwrap_or_default(),
                )),
                TransformerKind::Mention => Box::new(MentionTransformer::new(config.mention_color()?)),
                TransformerKind::Style => Box::new(StyleTransformer::new(config.link_urls)),
                TransformerKind::Filter => Box::new(ContentFilter::new(
                    &config.filter_wordlist,
                    config.filter_action()?,
                )?),
            });
        }
        Ok(FormatPipeline::new(chain, registry))
    }

    pub fn kinds(&self) -> Vec<TransformerKind> {
        self.chain.iter().map(|transformer| transformer.kind()).collect()
    }

    /// Renders `message` for `recipient`. `None` means the recipient must not
    /// receive the message.
    pub fn render(&self, message: &MessageContext, recipient: u128) -> Option<RenderedView> {
        let cx = RenderContext::new(message, recipient, &*self.registry);
        let mut text = message.body.clone();
        let mut flags = FormatFlags::empty();

        for transformer in &self.chain {
            let kind = transformer.kind();
            let before = text.clone();
            let result = panic::catch_unwind(AssertUnwindSafe(|| transformer.apply(text, &cx)))
                .unwrap_or(Err(TransformError::Panicked));
            match result {
                Ok(Outcome::Text(next)) => {
                    if next.clone().into_component() != before.clone().into_component() {
                        flags |= kind.flag();
                    }
                    text = next;
                }
                Ok(Outcome::Drop) => {
                    debug!(
                        "Message {} dropped for {:032x} by {}",
                        message.id, recipient, kind
                    );
                    return None;
                }
                Err(err) => {
                    warn!(
                        "Transformer {} failed on message {}, skipping it: {}",
                        kind, message.id, err
                    );
                    flags |= FormatFlags::DEGRADED;
                    text = before;
                }
            }
        }

        let plain = text.plain_text();
        Some(RenderedView {
            message_id: message.id,
            recipient_id: recipient,
            text: text.into_component(),
            plain,
            format_flags: flags,
        })
    }
}
