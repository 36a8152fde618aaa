use crate::{ClickEvent, LegacyParser, Style, TextColor, TextComponent};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported component key `{0}`")]
    Unsupported(String),
    #[error("malformed `{0}` field")]
    Malformed(&'static str),
}

/// One piece of text in the middle of being rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    /// Text that may still contain `&` codes.
    Markup(String),
    /// Plain text. Takes whatever style is active but is never scanned for codes.
    Literal(String),
    /// Text with its final style.
    Styled(TextComponent),
}

impl Piece {
    pub fn text(&self) -> &str {
        match self {
            Piece::Markup(text) | Piece::Literal(text) => text,
            Piece::Styled(component) => &component.text,
        }
    }
}

/// Replacement produced when splicing a piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Original text, keeps the kind and style of the piece it came from.
    Same(String),
    /// Inserted text. Never interpreted as markup, but keeps the style of a
    /// styled piece.
    Value(String),
    /// Inserted component with its own style.
    Component(TextComponent),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichText {
    pieces: Vec<Piece>,
}

impl RichText {
    pub fn new() -> RichText {
        Default::default()
    }

    pub fn markup(text: impl Into<String>) -> RichText {
        RichText {
            pieces: vec![Piece::Markup(text.into())],
        }
    }

    pub fn literal(text: impl Into<String>) -> RichText {
        RichText {
            pieces: vec![Piece::Literal(text.into())],
        }
    }

    pub fn from_pieces(pieces: Vec<Piece>) -> RichText {
        RichText { pieces }
    }

    /// Parses a json text component and flattens it into styled pieces.
    ///
    /// Only plain `text` components are accepted. Anything the renderer could
    /// not reproduce (translations, hover events, fonts, ...) is an error so
    /// the caller can leave the packet alone.
    pub fn from_json(json: &str) -> Result<RichText, ComponentError> {
        let value: Value = serde_json::from_str(json)?;
        let mut pieces = Vec::new();
        flatten(&value, &Style::default(), &mut pieces)?;
        Ok(RichText { pieces })
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    pub fn push(&mut self, piece: Piece) {
        self.pieces.push(piece);
    }

    pub fn plain_text(&self) -> String {
        self.pieces.iter().map(Piece::text).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.iter().all(|piece| piece.text().is_empty())
    }

    /// Rewrites the text of each piece. `f` returns `None` to leave a piece
    /// as it is.
    pub fn splice<F>(self, mut f: F) -> RichText
    where
        F: FnMut(&str) -> Option<Vec<Fragment>>,
    {
        let mut pieces = Vec::with_capacity(self.pieces.len());
        for piece in self.pieces {
            let Some(fragments) = f(piece.text()) else {
                pieces.push(piece);
                continue;
            };
            for fragment in fragments {
                let new = match (&piece, fragment) {
                    (_, Fragment::Component(component)) => Piece::Styled(component),
                    (Piece::Markup(_), Fragment::Same(text)) => Piece::Markup(text),
                    (Piece::Literal(_), Fragment::Same(text)) => Piece::Literal(text),
                    (Piece::Markup(_) | Piece::Literal(_), Fragment::Value(text)) => {
                        Piece::Literal(text)
                    }
                    (Piece::Styled(styled), Fragment::Same(text) | Fragment::Value(text)) => {
                        Piece::Styled(TextComponent::styled(text, &styled.style()))
                    }
                };
                if !new.text().is_empty() {
                    pieces.push(new);
                }
            }
        }
        RichText { pieces }
    }

    /// Interprets every markup piece. Afterwards all pieces are styled.
    pub fn interpret(self, link_urls: bool) -> RichText {
        let mut parser = LegacyParser::new(link_urls);
        for piece in self.pieces {
            match piece {
                Piece::Markup(text) => parser.push_markup(&text),
                Piece::Literal(text) => parser.push_literal(&text),
                Piece::Styled(component) => parser.push_component(component),
            }
        }
        RichText {
            pieces: parser.finish().into_iter().map(Piece::Styled).collect(),
        }
    }

    /// Builds the component that gets sent to the client. Markup that was
    /// never interpreted is sent as plain text.
    pub fn into_component(self) -> TextComponent {
        let mut components: Vec<TextComponent> = self
            .pieces
            .into_iter()
            .map(|piece| match piece {
                Piece::Markup(text) | Piece::Literal(text) => TextComponent::from(text),
                Piece::Styled(component) => component,
            })
            .collect();
        match components.len() {
            0 => TextComponent::from(""),
            1 => components.remove(0),
            _ => TextComponent {
                extra: components,
                ..TextComponent::from("")
            },
        }
    }
}

impl From<&TextComponent> for RichText {
    fn from(component: &TextComponent) -> RichText {
        let mut pieces = Vec::new();
        flatten_component(component, &mut pieces);
        RichText { pieces }
    }
}

fn flatten_component(component: &TextComponent, out: &mut Vec<Piece>) {
    if !component.text.is_empty() {
        let mut own = component.clone();
        own.extra.clear();
        out.push(Piece::Styled(own));
    }
    let style = component.style();
    for child in &component.extra {
        let mut child = child.clone();
        child.bold |= style.bold;
        child.italic |= style.italic;
        child.underlined |= style.underlined;
        child.strikethrough |= style.strikethrough;
        child.obfuscated |= style.obfuscated;
        if child.color.is_none() {
            child.color = style.color.clone();
        }
        if child.click_event.is_none() {
            child.click_event = style.click_event.clone();
        }
        flatten_component(&child, out);
    }
}

const KNOWN_KEYS: &[&str] = &[
    "text",
    "type",
    "bold",
    "italic",
    "underlined",
    "strikethrough",
    "obfuscated",
    "color",
    "clickEvent",
    "extra",
];

fn flag(map: &Map<String, Value>, key: &'static str, inherited: bool) -> Result<bool, ComponentError> {
    match map.get(key) {
        None => Ok(inherited),
        Some(Value::Bool(val)) => Ok(*val),
        Some(_) => Err(ComponentError::Malformed(key)),
    }
}

fn flatten(value: &Value, parent: &Style, out: &mut Vec<Piece>) -> Result<(), ComponentError> {
    match value {
        Value::String(text) => {
            if !text.is_empty() {
                out.push(Piece::Styled(TextComponent::styled(text.as_str(), parent)));
            }
            Ok(())
        }
        Value::Array(items) => {
            let Some((first, rest)) = items.split_first() else {
                return Ok(());
            };
            // The first element is the parent of the rest
            let style = match first {
                Value::Object(map) => style_of(map, parent)?,
                _ => parent.clone(),
            };
            flatten(first, parent, out)?;
            for item in rest {
                flatten(item, &style, out)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            if let Some(key) = map.keys().find(|key| !KNOWN_KEYS.contains(&key.as_str())) {
                return Err(ComponentError::Unsupported(key.clone()));
            }
            if let Some(kind) = map.get("type") {
                if kind.as_str() != Some("text") {
                    return Err(ComponentError::Unsupported("type".to_owned()));
                }
            }
            let style = style_of(map, parent)?;
            match map.get("text") {
                Some(Value::String(text)) => {
                    if !text.is_empty() {
                        out.push(Piece::Styled(TextComponent::styled(text.as_str(), &style)));
                    }
                }
                None => {}
                Some(_) => return Err(ComponentError::Malformed("text")),
            }
            match map.get("extra") {
                Some(Value::Array(children)) => {
                    for child in children {
                        flatten(child, &style, out)?;
                    }
                }
                None => {}
                Some(_) => return Err(ComponentError::Malformed("extra")),
            }
            Ok(())
        }
        _ => Err(ComponentError::Malformed("component")),
    }
}

fn style_of(map: &Map<String, Value>, parent: &Style) -> Result<Style, ComponentError> {
    let color = match map.get("color") {
        None => parent.color.clone(),
        Some(Value::String(name)) => match TextColor::parse(name) {
            Some(TextColor::ColorCode(crate::ColorCode::Reset)) => None,
            Some(color) => Some(color),
            None => return Err(ComponentError::Malformed("color")),
        },
        Some(_) => return Err(ComponentError::Malformed("color")),
    };
    let click_event = match map.get("clickEvent") {
        None => parent.click_event.clone(),
        Some(event) => {
            Some(ClickEvent::from_json(event).ok_or(ComponentError::Malformed("clickEvent"))?)
        }
    };
    Ok(Style {
        bold: flag(map, "bold", parent.bold)?,
        italic: flag(map, "italic", parent.italic)?,
        underlined: flag(map, "underlined", parent.underlined)?,
        strikethrough: flag(map, "strikethrough", parent.strikethrough)?,
        obfuscated: flag(map, "obfuscated", parent.obfuscated)?,
        color,
        click_event,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ColorCode;

    fn red() -> Option<TextColor> {
        Some(TextColor::ColorCode(ColorCode::Red))
    }

    #[test]
    fn children_inherit_style() {
        let rich =
            RichText::from_json(r#"{"text":"a","color":"red","extra":["b",{"text":"c","bold":true}]}"#)
                .unwrap();
        let styled: Vec<&TextComponent> = rich
            .pieces()
            .iter()
            .map(|p| match p {
                Piece::Styled(c) => c,
                _ => panic!("expected styled piece"),
            })
            .collect();
        assert_eq!(styled.len(), 3);
        assert!(styled.iter().all(|c| c.color == red()));
        assert!(!styled[1].bold);
        assert!(styled[2].bold);
        assert_eq!(rich.plain_text(), "abc");
    }

    #[test]
    fn child_can_clear_inherited_flag() {
        let rich =
            RichText::from_json(r#"{"text":"a","bold":true,"extra":[{"text":"b","bold":false}]}"#)
                .unwrap();
        match &rich.pieces()[1] {
            Piece::Styled(c) => assert!(!c.bold),
            _ => panic!("expected styled piece"),
        }
    }

    #[test]
    fn translations_are_unsupported() {
        let err = RichText::from_json(r#"{"translate":"multiplayer.player.joined"}"#).unwrap_err();
        assert!(matches!(err, ComponentError::Unsupported(key) if key == "translate"));
    }

    #[test]
    fn literal_is_not_interpreted() {
        let rich = RichText::from_pieces(vec![
            Piece::Literal("&c".into()),
            Piece::Markup(" world".into()),
        ]);
        let component = rich.interpret(false).into_component();
        assert_eq!(component.plain_text(), "&c world");
        assert!(component.color.is_none());
        assert!(component.extra.iter().all(|c| c.color.is_none()));
    }

    #[test]
    fn literal_takes_running_style() {
        let rich = RichText::from_pieces(vec![
            Piece::Markup("&aHello ".into()),
            Piece::Literal("Alice".into()),
        ]);
        let component = rich.interpret(false).into_component();
        assert_eq!(component.plain_text(), "Hello Alice");
        assert_eq!(component.color, Some(TextColor::ColorCode(ColorCode::Green)));
    }

    #[test]
    fn splice_keeps_piece_kinds() {
        let rich = RichText::from_pieces(vec![
            Piece::Markup("hi {x}!".into()),
            Piece::Styled(TextComponent::styled("{x}", &Style {
                color: red(),
                ..Default::default()
            })),
        ]);
        let spliced = rich.splice(|text| {
            let (before, after) = text.split_once("{x}")?;
            Some(vec![
                Fragment::Same(before.to_owned()),
                Fragment::Value("&c".to_owned()),
                Fragment::Same(after.to_owned()),
            ])
        });
        assert_eq!(
            spliced.pieces(),
            &[
                Piece::Markup("hi ".into()),
                Piece::Literal("&c".into()),
                Piece::Markup("!".into()),
                Piece::Styled(TextComponent::styled("&c", &Style {
                    color: red(),
                    ..Default::default()
                })),
            ]
        );
    }

    #[test]
    fn single_piece_component_is_not_wrapped() {
        let component = RichText::literal("plain").into_component();
        assert_eq!(component.encode_json().unwrap(), r#"{"text":"plain"}"#);
    }
}
