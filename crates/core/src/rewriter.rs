use crate::error::RewriteFailure;
use crate::pipeline::RenderedView;
use chatr_network::chat::{ChatContent, ChatLayout, encode_text_field};
use chatr_network::schema::MAX_CHAT_LENGTH;
use chatr_network::{ConnectionId, RawPacket};
use chatr_text::RichText;
use std::ops::Range;

/// A captured packet on its way to one connection.
#[derive(Debug, Clone)]
pub struct PacketHandle {
    pub connection: ConnectionId,
    pub packet: RawPacket,
    pub layout: ChatLayout,
}

/// Writes rendered text back into chat packets.
///
/// Only the bytes of the text field are replaced. Everything before and
/// after it is copied from the original packet.
pub struct PacketRewriter {
    max_rendered_length: usize,
}

impl PacketRewriter {
    pub fn new(max_rendered_length: usize) -> PacketRewriter {
        PacketRewriter {
            max_rendered_length: max_rendered_length.min(MAX_CHAT_LENGTH),
        }
    }

    pub fn rewrite(
        &self,
        handle: &PacketHandle,
        view: &RenderedView,
    ) -> Result<PacketHandle, RewriteFailure> {
        let data = &handle.packet.data;
        let Range { start, end } = handle.layout.text_field;
        if start > end || end > data.len() {
            return Err(RewriteFailure::MissingTextField {
                start,
                end,
                len: data.len(),
            });
        }
        let len = view.plain.chars().count();
        if len > self.max_rendered_length {
            return Err(RewriteFailure::TooLong {
                len,
                max: self.max_rendered_length,
            });
        }

        let field = encode_text_field(handle.layout.kind, &view.text)?;
        let mut rewritten = Vec::with_capacity(data.len() - (end - start) + field.len());
        rewritten.extend_from_slice(&data[..start]);
        rewritten.extend_from_slice(&field);
        rewritten.extend_from_slice(&data[end..]);

        let mut layout = handle.layout.clone();
        let new_end = start + field.len();
        for range in layout.fields.values_mut() {
            if range.start >= end {
                *range = range.start - end + new_end..range.end - end + new_end;
            }
        }
        layout.text_field = start..new_end;
        layout.content = ChatContent::Component(RichText::from(&view.text));

        Ok(PacketHandle {
            connection: handle.connection,
            packet: RawPacket::new(handle.packet.id, rewritten),
            layout,
        })
    }
}
