mod legacy;
mod rich;

use serde::Serialize;
use serde_json::Value;

pub use legacy::LegacyParser;
pub use rich::{ComponentError, Fragment, Piece, RichText};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColorCode {
    Black,
    DarkBlue,
    DarkGreen,
    DarkAqua,
    DarkRed,
    DarkPurple,
    Gold,
    Gray,
    DarkGray,
    Blue,
    Green,
    Aqua,
    Red,
    LightPurple,
    Yellow,
    White,
    Obfuscated,
    Bold,
    Strikethrough,
    Underline,
    Italic,
    Reset,
}

impl ColorCode {
    pub fn parse(code: char) -> Option<ColorCode> {
        Some(match code.to_ascii_lowercase() {
            '0' => ColorCode::Black,
            '1' => ColorCode::DarkBlue,
            '2' => ColorCode::DarkGreen,
            '3' => ColorCode::DarkAqua,
            '4' => ColorCode::DarkRed,
            '5' => ColorCode::DarkPurple,
            '6' => ColorCode::Gold,
            '7' => ColorCode::Gray,
            '8' => ColorCode::DarkGray,
            '9' => ColorCode::Blue,
            'a' => ColorCode::Green,
            'b' => ColorCode::Aqua,
            'c' => ColorCode::Red,
            'd' => ColorCode::LightPurple,
            'e' => ColorCode::Yellow,
            'f' => ColorCode::White,
            'k' => ColorCode::Obfuscated,
            'l' => ColorCode::Bold,
            'm' => ColorCode::Strikethrough,
            'n' => ColorCode::Underline,
            'o' => ColorCode::Italic,
            'r' => ColorCode::Reset,
            _ => return None,
        })
    }

    /// Looks up a color by the name used in json text components, e.g. `dark_red`.
    pub fn from_name(name: &str) -> Option<ColorCode> {
        use ColorCode::*;
        Some(match name {
            "black" => Black,
            "dark_blue" => DarkBlue,
            "dark_green" => DarkGreen,
            "dark_aqua" => DarkAqua,
            "dark_red" => DarkRed,
            "dark_purple" => DarkPurple,
            "gold" => Gold,
            "gray" => Gray,
            "dark_gray" => DarkGray,
            "blue" => Blue,
            "green" => Green,
            "aqua" => Aqua,
            "red" => Red,
            "light_purple" => LightPurple,
            "yellow" => Yellow,
            "white" => White,
            "reset" => Reset,
            _ => return None,
        })
    }

    fn is_formatting(self) -> bool {
        use ColorCode::*;
        matches!(
            self,
            Obfuscated | Bold | Strikethrough | Underline | Italic | Reset
        )
    }
}

fn is_valid_hex(ch: char) -> bool {
    ch.is_ascii_hexdigit()
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum TextColor {
    Hex(String),
    ColorCode(ColorCode),
}

impl TextColor {
    /// Parses either a `#rrggbb` hex color or a named color.
    pub fn parse(value: &str) -> Option<TextColor> {
        if let Some(hex) = value.strip_prefix('#') {
            if hex.len() == 6 && hex.chars().all(is_valid_hex) {
                return Some(TextColor::Hex(value.to_owned()));
            }
            return None;
        }
        ColorCode::from_name(value)
            .filter(|code| !code.is_formatting() || *code == ColorCode::Reset)
            .map(TextColor::ColorCode)
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClickEventType {
    OpenUrl,
    RunCommand,
    SuggestCommand,
    ChangePage,
    CopyToClipboard,
}

impl ClickEventType {
    fn from_name(name: &str) -> Option<ClickEventType> {
        Some(match name {
            "open_url" => ClickEventType::OpenUrl,
            "run_command" => ClickEventType::RunCommand,
            "suggest_command" => ClickEventType::SuggestCommand,
            "change_page" => ClickEventType::ChangePage,
            "copy_to_clipboard" => ClickEventType::CopyToClipboard,
            _ => return None,
        })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    pub action: ClickEventType,
    pub value: String,
}

impl ClickEvent {
    pub fn open_url(url: impl Into<String>) -> ClickEvent {
        ClickEvent {
            action: ClickEventType::OpenUrl,
            value: url.into(),
        }
    }

    fn from_json(value: &Value) -> Option<ClickEvent> {
        let action = ClickEventType::from_name(value.get("action")?.as_str()?)?;
        let value = match value.get("value")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(ClickEvent { action, value })
    }
}

/// This is only used for `TextComponent` serialize
#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(field: &bool) -> bool {
    !*field
}

/// The inheritable part of a component. Children in the json tree take the
/// style of their parent unless they override it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Style {
    pub bold: bool,
    pub italic: bool,
    pub underlined: bool,
    pub strikethrough: bool,
    pub obfuscated: bool,
    pub color: Option<TextColor>,
    pub click_event: Option<ClickEvent>,
}

impl Style {
    pub fn is_plain(&self) -> bool {
        *self == Style::default()
    }
}

pub struct TextComponentBuilder {
    component: TextComponent,
}

impl TextComponentBuilder {
    pub fn new(text: String) -> Self {
        let component = TextComponent {
            text,
            ..Default::default()
        };
        Self { component }
    }

    pub fn color(mut self, color: TextColor) -> Self {
        self.component.color = Some(color);
        self
    }

    pub fn color_code(mut self, color: ColorCode) -> Self {
        self.component.color = Some(TextColor::ColorCode(color));
        self
    }

    pub fn bold(mut self, val: bool) -> Self {
        self.component.bold = val;
        self
    }

    pub fn strikethrough(mut self, val: bool) -> Self {
        self.component.strikethrough = val;
        self
    }

    pub fn finish(self) -> TextComponent {
        self.component
    }
}

#[derive(Serialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct TextComponent {
    pub text: String,
    #[serde(skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub underlined: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub strikethrough: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub obfuscated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<TextColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "clickEvent")]
    pub click_event: Option<ClickEvent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<TextComponent>,
}

impl TextComponent {
    pub fn styled(text: impl Into<String>, style: &Style) -> TextComponent {
        TextComponent {
            text: text.into(),
            bold: style.bold,
            italic: style.italic,
            underlined: style.underlined,
            strikethrough: style.strikethrough,
            obfuscated: style.obfuscated,
            color: style.color.clone(),
            click_event: style.click_event.clone(),
            extra: Vec::new(),
        }
    }

    pub fn style(&self) -> Style {
        Style {
            bold: self.bold,
            italic: self.italic,
            underlined: self.underlined,
            strikethrough: self.strikethrough,
            obfuscated: self.obfuscated,
            color: self.color.clone(),
            click_event: self.click_event.clone(),
        }
    }

    /// Parses `&` color codes and `#rrggbb` hex colors into components and
    /// turns anything that looks like a url into a clickable link.
    pub fn from_legacy_text(message: &str) -> Vec<TextComponent> {
        let mut parser = LegacyParser::new(true);
        parser.push_markup(message);
        parser.finish()
    }

    pub fn encode_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// The text of this component and all of its children, without styling.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        out.push_str(&self.text);
        for child in &self.extra {
            child.collect_text(out);
        }
    }

    pub fn is_text_only(&self) -> bool {
        !self.bold
            && !self.italic
            && !self.underlined
            && !self.strikethrough
            && !self.obfuscated
            && self.color.is_none()
            && self.click_event.is_none()
    }
}

impl<S> From<S> for TextComponent
where
    S: Into<String>,
{
    fn from(value: S) -> Self {
        TextComponent {
            text: value.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_colors() {
        let components = TextComponent::from_legacy_text("&cred &lbold");
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].text, "red ");
        assert_eq!(
            components[0].color,
            Some(TextColor::ColorCode(ColorCode::Red))
        );
        assert_eq!(components[1].text, "bold");
        assert!(components[1].bold);
        assert_eq!(
            components[1].color,
            Some(TextColor::ColorCode(ColorCode::Red))
        );
    }

    #[test]
    fn legacy_hex_and_urls() {
        let components = TextComponent::from_legacy_text("#ff0000see example.com");
        assert_eq!(components[0].color, Some(TextColor::Hex("#ff0000".into())));
        let link = components
            .iter()
            .find(|c| c.click_event.is_some())
            .expect("url should be linked");
        assert_eq!(link.text, "example.com");
    }

    #[test]
    fn unknown_code_is_text() {
        let components = TextComponent::from_legacy_text("a & b &z");
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].text, "a & b &z");
    }

    #[test]
    fn parse_colors() {
        assert_eq!(
            TextColor::parse("dark_red"),
            Some(TextColor::ColorCode(ColorCode::DarkRed))
        );
        assert_eq!(TextColor::parse("#00ff0a"), Some(TextColor::Hex("#00ff0a".into())));
        assert_eq!(TextColor::parse("#00ff0"), None);
        assert_eq!(TextColor::parse("bold"), None);
    }

    #[test]
    fn encode_skips_defaults() {
        let component = TextComponentBuilder::new("hi".into())
            .color_code(ColorCode::Gold)
            .finish();
        assert_eq!(
            component.encode_json().unwrap(),
            r#"{"text":"hi","color":"gold"}"#
        );
    }
}
