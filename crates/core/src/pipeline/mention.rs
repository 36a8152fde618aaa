use super::{Outcome, RenderContext, Transformer, TransformerKind};
use crate::error::TransformError;
use chatr_text::{Fragment, RichText, TextColor, TextComponentBuilder};
use std::ops::Range;

/// Highlights the recipient's own name, with or without a leading `@`.
pub struct MentionTransformer {
    color: TextColor,
}

impl MentionTransformer {
    pub fn new(color: TextColor) -> MentionTransformer {
        MentionTransformer { color }
    }

    fn highlight(&self, text: &str, names: &[&str]) -> Option<Vec<Fragment>> {
        let mut found: Vec<Range<usize>> = names
            .iter()
            .flat_map(|name| find_mentions(text, name))
            .collect();
        if found.is_empty() {
            return None;
        }
        found.sort_by_key(|range| (range.start, usize::MAX - range.end));

        let mut fragments = Vec::new();
        let mut last = 0;
        for range in found {
            // Overlaps with a longer name already highlighted
            if range.start < last {
                continue;
            }
            fragments.push(Fragment::Same(text[last..range.start].to_owned()));
            fragments.push(Fragment::Component(
                TextComponentBuilder::new(text[range.clone()].to_owned())
                    .color(self.color.clone())
                    .bold(true)
                    .finish(),
            ));
            last = range.end;
        }
        fragments.push(Fragment::Same(text[last..].to_owned()));
        Some(fragments)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whole word, ascii case insensitive matches of `name` in `text`. A `@`
/// right before the name is part of the match.
fn find_mentions(text: &str, name: &str) -> Vec<Range<usize>> {
    if name.is_empty() {
        return Vec::new();
    }
    let haystack = text.to_ascii_lowercase();
    let needle = name.to_ascii_lowercase();
    haystack
        .match_indices(&needle)
        .filter_map(|(start, matched)| {
            let end = start + matched.len();
            let before = text[..start].chars().next_back();
            let after = text[end..].chars().next();
            if before.is_some_and(is_name_char) || after.is_some_and(is_name_char) {
                return None;
            }
            let start = if before == Some('@') { start - 1 } else { start };
            Some(start..end)
        })
        .collect()
}

impl Transformer for MentionTransformer {
    fn kind(&self) -> TransformerKind {
        TransformerKind::Mention
    }

    fn apply(&self, text: RichText, cx: &RenderContext<'_>) -> Result<Outcome, TransformError> {
        let Some(recipient) = cx.recipient() else {
            return Ok(Outcome::Text(text));
        };
        // Nobody is mentioned by their own message
        if cx.message.sender_id == Some(recipient.uuid) {
            return Ok(Outcome::Text(text));
        }
        let mut names = vec![recipient.name.as_str()];
        if let Some(display_name) = &recipient.display_name {
            if !display_name.eq_ignore_ascii_case(&recipient.name) {
                names.push(display_name);
            }
        }
        Ok(Outcome::Text(text.splice(|piece| self.highlight(piece, &names))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ChatType, MessageContext, MessageId};
    use crate::registry::{PlayerSnapshot, SnapshotRegistry};
    use chatr_text::{ColorCode, Piece};

    #[test]
    fn word_boundaries() {
        assert_eq!(find_mentions("hey alice!", "Alice"), vec![4..9]);
        assert_eq!(find_mentions("@ALICE, hi", "Alice"), vec![0..6]);
        assert!(find_mentions("malice", "Alice").is_empty());
        assert!(find_mentions("alice_2", "Alice").is_empty());
        assert_eq!(find_mentions("é alice", "alice"), vec![3..8]);
    }

    fn render(text: &str, sender: Option<u128>) -> RichText {
        let registry = SnapshotRegistry::new();
        registry.publish(PlayerSnapshot::new(1, "Alice"));
        let message = MessageContext::new(MessageId(1), ChatType::system(), sender, RichText::markup(text));
        let cx = RenderContext::new(&message, 1, &registry);
        let transformer = MentionTransformer::new(TextColor::ColorCode(ColorCode::Yellow));
        match transformer.apply(message.body.clone(), &cx).unwrap() {
            Outcome::Text(text) => text,
            Outcome::Drop => panic!("mentions never drop"),
        }
    }

    #[test]
    fn highlights_recipient() {
        let text = render("hi @alice", Some(2));
        assert_eq!(text.pieces().len(), 2);
        match &text.pieces()[1] {
            Piece::Styled(component) => {
                assert_eq!(component.text, "@alice");
                assert!(component.bold);
                assert_eq!(component.color, Some(TextColor::ColorCode(ColorCode::Yellow)));
            }
            other => panic!("expected highlighted piece, got {other:?}"),
        }
        assert_eq!(text.plain_text(), "hi @alice");
    }

    #[test]
    fn own_message_is_not_highlighted() {
        let text = render("I am Alice", Some(1));
        assert_eq!(text.pieces(), &[Piece::Markup("I am Alice".into())]);
    }
}
