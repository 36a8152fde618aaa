//! Field layouts of the clientbound chat packets.
//!
//! Parsing records the byte range of every field instead of building a
//! packet struct. A rewrite swaps the bytes of the text field and copies
//! every other byte of the original packet as is, so signatures, timestamps
//! and chat types can never change by accident.

use crate::RawPacket;
use crate::codec::{PacketDecodeError, PacketDecoderExt, PacketEncodeError, PacketEncoderExt};
use crate::schema::{
    ChatSchema, MAX_CHAT_LENGTH, MAX_MESSAGE_LENGTH, MAX_PREVIOUS_MESSAGES, SIGNATURE_LENGTH,
};
use chatr_text::{ComponentError, RichText, TextComponent};
use indexmap::IndexMap;
use std::io::Cursor;
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatKind {
    /// System Chat Message, plain server text.
    System,
    /// Player Chat Message, signed chat from a player.
    Player,
    /// Disguised Chat Message, unsigned player chat.
    Disguised,
}

#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("malformed field: {0}")]
    Decode(#[from] PacketDecodeError),
    #[error("text field can't be rendered: {0}")]
    Component(#[from] ComponentError),
}

/// What the client would display for the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatContent {
    /// A json component, already flattened into styled pieces.
    Component(RichText),
    /// The signed body of a player chat message, typed by the player.
    Plain(String),
}

#[derive(Debug, Clone)]
pub struct ChatLayout {
    pub kind: ChatKind,
    /// Bytes replaced on rewrite. For player chat this is the optional
    /// unsigned content, which the client shows in place of the signed body.
    pub text_field: Range<usize>,
    pub content: ChatContent,
    pub sender: Option<u128>,
    pub timestamp: Option<i64>,
    pub salt: Option<i64>,
    pub signature: Option<Vec<u8>>,
    pub chat_type: Option<i32>,
    /// Shown above the hotbar instead of in chat.
    pub overlay: bool,
    /// The server asked the client to hide all or part of the message.
    pub filtered: bool,
    /// Byte ranges of the remaining fields, by name.
    pub fields: IndexMap<&'static str, Range<usize>>,
}

impl ChatLayout {
    pub fn field<'a>(&self, data: &'a [u8], name: &str) -> Option<&'a [u8]> {
        self.fields.get(name).and_then(|range| data.get(range.clone()))
    }
}

struct FieldReader<'a> {
    cursor: Cursor<&'a [u8]>,
    fields: IndexMap<&'static str, Range<usize>>,
}

impl<'a> FieldReader<'a> {
    fn new(data: &'a [u8]) -> FieldReader<'a> {
        FieldReader {
            cursor: Cursor::new(data),
            fields: IndexMap::new(),
        }
    }

    fn pos(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Reads one field and records its byte range under `name`.
    fn field<T>(
        &mut self,
        name: &'static str,
        read: impl FnOnce(&mut Cursor<&'a [u8]>) -> Result<T, PacketDecodeError>,
    ) -> Result<T, PacketDecodeError> {
        let start = self.pos();
        let value = read(&mut self.cursor)?;
        self.fields.insert(name, start..self.pos());
        Ok(value)
    }

    fn finish(self) -> Result<IndexMap<&'static str, Range<usize>>, PacketDecodeError> {
        let remaining = self.cursor.get_ref().len() - self.pos();
        if remaining != 0 {
            return Err(PacketDecodeError::TrailingBytes(remaining));
        }
        Ok(self.fields)
    }
}

fn read_optional_chat(cursor: &mut Cursor<&[u8]>) -> Result<Option<String>, PacketDecodeError> {
    if cursor.read_bool()? {
        Ok(Some(cursor.read_string(MAX_CHAT_LENGTH)?))
    } else {
        Ok(None)
    }
}

/// Parses `packet` if it is one of the chat packets of `schema`.
///
/// Returns `Ok(None)` for every other packet.
pub fn parse_chat(
    schema: &ChatSchema,
    packet: &RawPacket,
) -> Result<Option<ChatLayout>, ShapeError> {
    let Some(kind) = schema.kind_of(packet.id) else {
        return Ok(None);
    };
    let layout = match kind {
        ChatKind::System => parse_system(&packet.data)?,
        ChatKind::Player => parse_player(&packet.data)?,
        ChatKind::Disguised => parse_disguised(&packet.data)?,
    };
    Ok(Some(layout))
}

fn parse_system(data: &[u8]) -> Result<ChatLayout, ShapeError> {
    let mut reader = FieldReader::new(data);
    let json = reader.field("content", |c| c.read_string(MAX_CHAT_LENGTH))?;
    let overlay = reader.field("overlay", |c| c.read_bool())?;
    let mut fields = reader.finish()?;
    let text_field = fields.shift_remove("content").unwrap_or_default();

    Ok(ChatLayout {
        kind: ChatKind::System,
        text_field,
        content: ChatContent::Component(RichText::from_json(&json)?),
        sender: None,
        timestamp: None,
        salt: None,
        signature: None,
        chat_type: None,
        overlay,
        filtered: false,
        fields,
    })
}

fn parse_player(data: &[u8]) -> Result<ChatLayout, ShapeError> {
    let mut reader = FieldReader::new(data);
    let sender = reader.field("sender", |c| c.read_uuid())?;
    reader.field("index", |c| c.read_varint())?;
    let signature = reader.field("signature", |c| {
        if c.read_bool()? {
            Ok(Some(c.read_bytes(SIGNATURE_LENGTH)?))
        } else {
            Ok(None)
        }
    })?;
    let body = reader.field("body", |c| c.read_string(MAX_MESSAGE_LENGTH))?;
    let timestamp = reader.field("timestamp", |c| c.read_long())?;
    let salt = reader.field("salt", |c| c.read_long())?;
    reader.field("previous_messages", |c| {
        let count = c.read_length()?;
        if count > MAX_PREVIOUS_MESSAGES {
            return Err(PacketDecodeError::InvalidLength(count as i32));
        }
        for _ in 0..count {
            // An id of 0 means the full signature follows
            if c.read_varint()? == 0 {
                c.read_bytes(SIGNATURE_LENGTH)?;
            }
        }
        Ok(())
    })?;
    let unsigned = reader.field("unsigned_content", read_optional_chat)?;
    let filter_type = reader.field("filter", |c| {
        let filter_type = c.read_varint()?;
        if filter_type == 2 {
            // Partially filtered messages carry a bitset of hidden characters
            let longs = c.read_length()?;
            c.read_bytes(longs * 8)?;
        }
        Ok(filter_type)
    })?;
    let chat_type = reader.field("chat_type", |c| c.read_varint())?;
    reader.field("sender_name", |c| c.read_string(MAX_CHAT_LENGTH))?;
    reader.field("target_name", read_optional_chat)?;
    let mut fields = reader.finish()?;
    let text_field = fields.shift_remove("unsigned_content").unwrap_or_default();

    let content = match unsigned {
        Some(json) => ChatContent::Component(RichText::from_json(&json)?),
        None => ChatContent::Plain(body),
    };
    Ok(ChatLayout {
        kind: ChatKind::Player,
        text_field,
        content,
        sender: Some(sender),
        timestamp: Some(timestamp),
        salt: Some(salt),
        signature,
        chat_type: Some(chat_type),
        overlay: false,
        filtered: filter_type != 0,
        fields,
    })
}

fn parse_disguised(data: &[u8]) -> Result<ChatLayout, ShapeError> {
    let mut reader = FieldReader::new(data);
    let json = reader.field("message", |c| c.read_string(MAX_CHAT_LENGTH))?;
    let chat_type = reader.field("chat_type", |c| c.read_varint())?;
    reader.field("sender_name", |c| c.read_string(MAX_CHAT_LENGTH))?;
    reader.field("target_name", read_optional_chat)?;
    let mut fields = reader.finish()?;
    let text_field = fields.shift_remove("message").unwrap_or_default();

    Ok(ChatLayout {
        kind: ChatKind::Disguised,
        text_field,
        content: ChatContent::Component(RichText::from_json(&json)?),
        sender: None,
        timestamp: None,
        salt: None,
        signature: None,
        chat_type: Some(chat_type),
        overlay: false,
        filtered: false,
        fields,
    })
}

/// Encodes `component` the way the text field of a `kind` packet expects it.
pub fn encode_text_field(
    kind: ChatKind,
    component: &TextComponent,
) -> Result<Vec<u8>, PacketEncodeError> {
    let json = component.encode_json()?;
    let mut buf = Vec::with_capacity(json.len() + 4);
    if kind == ChatKind::Player {
        buf.write_bool(true);
    }
    buf.write_string(MAX_CHAT_LENGTH, &json)?;
    Ok(buf)
}
