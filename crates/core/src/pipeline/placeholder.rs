use super::{Outcome, RenderContext, Transformer, TransformerKind};
use crate::error::TransformError;
use chatr_text::{Fragment, RichText};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Replaces `{name}` tokens.
///
/// Values are inserted as literal text, so a player named `&cBob` shows up as
/// `&cBob` and can't restyle the rest of the line. Tokens that don't name a
/// placeholder are left alone.
pub struct PlaceholderTransformer {
    statics: BTreeMap<String, String>,
}

impl PlaceholderTransformer {
    pub fn new(statics: BTreeMap<String, String>) -> PlaceholderTransformer {
        PlaceholderTransformer { statics }
    }

    /// `None` if `name` is not a placeholder. Known placeholders without a
    /// value resolve to the empty string.
    fn resolve(&self, name: &str, cx: &RenderContext<'_>) -> Option<String> {
        let value = match name {
            "player" => cx.recipient().map(|p| p.name.clone()),
            "sender" => cx.sender().map(|p| p.name.clone()),
            "sender_display" => cx.sender().map(|p| p.shown_name().to_owned()),
            "world" => cx.sender().and_then(|p| p.world.clone()),
            "online" => Some(cx.registry().online().len().to_string()),
            "time" => DateTime::<Utc>::from_timestamp_millis(cx.message.timestamp)
                .map(|time| time.format("%H:%M").to_string()),
            other => return self.statics.get(other).cloned(),
        };
        Some(value.unwrap_or_default())
    }

    fn replace(&self, text: &str, cx: &RenderContext<'_>) -> Option<Vec<Fragment>> {
        let mut fragments = Vec::new();
        let mut last = 0;
        let mut search = 0;
        while let Some(open) = text[search..].find('{').map(|i| i + search) {
            let Some(close) = text[open + 1..].find('}').map(|i| i + open + 1) else {
                break;
            };
            let name = &text[open + 1..close];
            // `{` inside the braces starts a new candidate
            if name.contains('{') || !is_token_name(name) {
                search = open + 1;
                continue;
            }
            match self.resolve(name, cx) {
                Some(value) => {
                    fragments.push(Fragment::Same(text[last..open].to_owned()));
                    fragments.push(Fragment::Value(value));
                    last = close + 1;
                    search = close + 1;
                }
                None => search = open + 1,
            }
        }
        if fragments.is_empty() {
            return None;
        }
        fragments.push(Fragment::Same(text[last..].to_owned()));
        Some(fragments)
    }
}

fn is_token_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Transformer for PlaceholderTransformer {
    fn kind(&self) -> TransformerKind {
        TransformerKind::Placeholder
    }

    fn apply(&self, text: RichText, cx: &RenderContext<'_>) -> Result<Outcome, TransformError> {
        Ok(Outcome::Text(text.splice(|piece| self.replace(piece, cx))))
    }
}
