use super::{Outcome, RenderContext, Transformer, TransformerKind};
use crate::error::TransformError;
use chatr_text::{Fragment, RichText};
use regex::{Captures, Regex};
use std::str::FromStr;

/// Recipients with this permission see messages unfiltered.
pub const FILTER_BYPASS_PERMISSION: &str = "chatr.filter.bypass";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    /// The recipient does not get the message.
    Drop,
    /// Matched words are replaced with `*`.
    Censor,
}

impl FromStr for FilterAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop" => Ok(FilterAction::Drop),
            "censor" => Ok(FilterAction::Censor),
            _ => Err(()),
        }
    }
}

/// Matches whole words from a wordlist, ignoring case.
pub struct ContentFilter {
    pattern: Option<Regex>,
    action: FilterAction,
}

impl ContentFilter {
    pub fn new(words: &[String], action: FilterAction) -> Result<ContentFilter, regex::Error> {
        let words: Vec<String> = words
            .iter()
            .map(|word| word.trim())
            .filter(|word| !word.is_empty())
            .map(regex::escape)
            .collect();
        let pattern = if words.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(r"(?i)\b(?:{})\b", words.join("|")))?)
        };
        Ok(ContentFilter { pattern, action })
    }

    fn censor(pattern: &Regex, text: RichText) -> RichText {
        text.splice(|piece| {
            if !pattern.is_match(piece) {
                return None;
            }
            let censored = pattern
                .replace_all(piece, |caps: &Captures<'_>| "*".repeat(caps[0].chars().count()));
            Some(vec![Fragment::Same(censored.into_owned())])
        })
    }
}

impl Transformer for ContentFilter {
    fn kind(&self) -> TransformerKind {
        TransformerKind::Filter
    }

    fn apply(&self, text: RichText, cx: &RenderContext<'_>) -> Result<Outcome, TransformError> {
        let Some(pattern) = &self.pattern else {
            return Ok(Outcome::Text(text));
        };
        if cx.recipient().is_some_and(|p| p.has_permission(FILTER_BYPASS_PERMISSION)) {
            return Ok(Outcome::Text(text));
        }
        if !pattern.is_match(&text.plain_text()) {
            return Ok(Outcome::Text(text));
        }
        match self.action {
            FilterAction::Drop => Ok(Outcome::Drop),
            FilterAction::Censor => {
                let censored = Self::censor(pattern, text);
                // A word split across differently styled pieces can't be
                // censored piece by piece
                if pattern.is_match(&censored.plain_text()) {
                    Ok(Outcome::Drop)
                } else {
                    Ok(Outcome::Text(censored))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ChatType, MessageContext, MessageId};
    use crate::registry::{PermissionSet, PlayerSnapshot, SnapshotRegistry};
    use chatr_text::Piece;

    fn registry() -> SnapshotRegistry {
        let registry = SnapshotRegistry::new();
        registry.publish(PlayerSnapshot::new(1, "Alice"));
        registry.publish(
            PlayerSnapshot::new(2, "Mod").with_permissions(PermissionSet::new().grant("chatr.filter.*")),
        );
        registry
    }

    fn apply(filter: &ContentFilter, text: RichText, recipient: u128) -> Outcome {
        let registry = registry();
        let message = MessageContext::new(MessageId(1), ChatType::system(), None, text);
        let cx = RenderContext::new(&message, recipient, &registry);
        filter.apply(message.body.clone(), &cx).unwrap()
    }

    fn words() -> Vec<String> {
        vec!["darn".to_owned(), " heck ".to_owned(), String::new()]
    }

    #[test]
    fn drop_matching() {
        let filter = ContentFilter::new(&words(), FilterAction::Drop).unwrap();
        assert!(matches!(apply(&filter, RichText::markup("oh DARN it"), 1), Outcome::Drop));
        assert!(matches!(apply(&filter, RichText::markup("darnation"), 1), Outcome::Text(_)));
        assert!(matches!(apply(&filter, RichText::markup("oh darn"), 2), Outcome::Text(_)));
    }

    #[test]
    fn censor_matching() {
        let filter = ContentFilter::new(&words(), FilterAction::Censor).unwrap();
        match apply(&filter, RichText::markup("what the Heck"), 1) {
            Outcome::Text(text) => assert_eq!(text.pieces(), &[Piece::Markup("what the ****".into())]),
            Outcome::Drop => panic!("censoring should keep the message"),
        }
    }

    #[test]
    fn split_word_is_dropped_when_censoring() {
        let filter = ContentFilter::new(&words(), FilterAction::Censor).unwrap();
        let text = RichText::from_pieces(vec![Piece::Markup("da".into()), Piece::Literal("rn".into())]);
        assert!(matches!(apply(&filter, text, 1), Outcome::Drop));
    }

    #[test]
    fn empty_wordlist_matches_nothing() {
        let filter = ContentFilter::new(&[], FilterAction::Drop).unwrap();
        assert!(matches!(apply(&filter, RichText::markup("anything"), 1), Outcome::Text(_)));
    }
}
