use super::{Outcome, RenderContext, Transformer, TransformerKind};
use crate::error::TransformError;
use chatr_text::RichText;

/// Turns `&` codes and `#rrggbb` colors into styling, and optionally urls
/// into links. Only markup is interpreted. Text the sender was not allowed to
/// style and inserted placeholder values stay as typed.
pub struct StyleTransformer {
    link_urls: bool,
}

impl StyleTransformer {
    pub fn new(link_urls: bool) -> StyleTransformer {
        StyleTransformer { link_urls }
    }
}

impl Transformer for StyleTransformer {
    fn kind(&self) -> TransformerKind {
        TransformerKind::Style
    }

    fn apply(&self, text: RichText, _: &RenderContext<'_>) -> Result<Outcome, TransformError> {
        Ok(Outcome::Text(text.interpret(self.link_urls)))
    }
}
