use crate::{ClickEvent, ColorCode, TextColor, TextComponent, is_valid_hex};
use once_cell::sync::Lazy;
use regex::Regex;
use std::mem;
use std::ops::Range;

static URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new("([a-zA-Z0-9§\\-:/]+\\.[a-zA-Z/0-9§\\-:_#]+(\\.[a-zA-Z/0-9.§\\-:#\\?\\+=_]+)?)")
        .unwrap()
});

/// A finished component and the byte ranges of its text that url linking
/// must skip. `None` leaves the whole component alone.
type Flushed = (TextComponent, Option<Vec<Range<usize>>>);

/// Incremental `&` code parser.
///
/// Text can be fed in three ways: markup is scanned for codes, literal text
/// takes the current style without being scanned, and finished components are
/// passed through untouched. The running style carries across calls, so
/// `&a` in one markup chunk still colors a literal that follows it.
///
/// Only markup is ever turned into links.
pub struct LegacyParser {
    link_urls: bool,
    cur: TextComponent,
    /// Literal ranges within `cur.text`.
    literals: Vec<Range<usize>>,
    out: Vec<Flushed>,
}

impl LegacyParser {
    pub fn new(link_urls: bool) -> LegacyParser {
        LegacyParser {
            link_urls,
            cur: Default::default(),
            literals: Vec::new(),
            out: Vec::new(),
        }
    }

    fn flush(&mut self) {
        if !self.cur.text.is_empty() {
            let literals = mem::take(&mut self.literals);
            self.out.push((self.cur.clone(), Some(literals)));
            self.cur.text.clear();
        }
    }

    pub fn push_markup(&mut self, markup: &str) {
        let mut chars = markup.chars();
        'main_loop: while let Some(c) = chars.next() {
            if c == '&' {
                if let Some(code) = chars.next() {
                    if let Some(color) = ColorCode::parse(code) {
                        self.flush();
                        match color {
                            ColorCode::Bold => self.cur.bold = true,
                            ColorCode::Italic => self.cur.italic = true,
                            ColorCode::Underline => self.cur.underlined = true,
                            ColorCode::Strikethrough => self.cur.strikethrough = true,
                            ColorCode::Obfuscated => self.cur.obfuscated = true,
                            ColorCode::Reset => self.cur = Default::default(),
                            _ => {
                                self.cur = Default::default();
                                self.cur.color = Some(TextColor::ColorCode(color));
                            }
                        }
                        continue;
                    }
                    self.cur.text.push(c);
                    self.cur.text.push(code);
                    continue;
                }
            }
            if c == '#' {
                let mut hex = String::from(c);
                for _ in 0..6 {
                    if let Some(c) = chars.next() {
                        hex.push(c);
                        if !is_valid_hex(c) {
                            self.cur.text += &hex;
                            continue 'main_loop;
                        }
                    } else {
                        self.cur.text += &hex;
                        continue 'main_loop;
                    }
                }
                self.flush();
                self.cur = Default::default();
                self.cur.color = Some(TextColor::Hex(hex));
                continue;
            }
            self.cur.text.push(c);
        }
    }

    pub fn push_literal(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let start = self.cur.text.len();
        self.cur.text.push_str(text);
        self.literals.push(start..self.cur.text.len());
    }

    pub fn push_component(&mut self, component: TextComponent) {
        self.flush();
        self.out.push((component, None));
    }

    pub fn finish(mut self) -> Vec<TextComponent> {
        self.flush();
        if !self.link_urls {
            return self.out.into_iter().map(|(c, _)| c).collect();
        }

        let mut linked = Vec::with_capacity(self.out.len());
        for (component, literals) in self.out {
            let Some(literals) = literals.filter(|_| component.click_event.is_none()) else {
                linked.push(component);
                continue;
            };
            let mut last = 0;
            let text = &component.text;
            let urls = URL_REGEX.find_iter(text).filter(|found| {
                !literals
                    .iter()
                    .any(|literal| literal.start < found.end() && found.start() < literal.end)
            });
            for found in urls {
                let index = found.start();
                let matched = found.as_str();
                if last != index {
                    let mut new = component.clone();
                    new.text = String::from(&text[last..index]);
                    linked.push(new);
                }
                let mut new = component.clone();
                new.text = matched.to_string();
                new.click_event = Some(ClickEvent::open_url(matched));
                linked.push(new);
                last = index + matched.len();
            }
            if last < text.len() {
                let mut new = component.clone();
                new.text = String::from(&text[last..]);
                linked.push(new);
            }
        }
        linked
    }
}
