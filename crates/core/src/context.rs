use chatr_network::chat::{ChatKind, ChatLayout};
use chatr_text::RichText;
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifies a message across every connection it is sent to.
///
/// Derived from the bytes of the packet that carry the message itself, so
/// the copies a server sends to each player share one id while the fields
/// that differ per recipient (like the chat index) are left out. The same
/// text sent to a connection again is a new message, see
/// [`MessageId::occurrence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u128);

/// Fields that identify a message. Everything else in the packet can differ
/// per recipient.
const IDENTITY_FIELDS: &[&str] = &[
    "sender",
    "signature",
    "body",
    "timestamp",
    "salt",
    "chat_type",
    "sender_name",
    "target_name",
    "overlay",
];

impl MessageId {
    pub fn of_packet(layout: &ChatLayout, data: &[u8]) -> MessageId {
        let mut hasher = Sha256::new();
        hasher.update([match layout.kind {
            ChatKind::System => 0u8,
            ChatKind::Player => 1,
            ChatKind::Disguised => 2,
        }]);
        for name in IDENTITY_FIELDS {
            if let Some(bytes) = layout.field(data, name) {
                hasher.update(name.as_bytes());
                hasher.update((bytes.len() as u32).to_be_bytes());
                hasher.update(bytes);
            }
        }
        if let Some(text) = data.get(layout.text_field.clone()) {
            hasher.update(text);
        }
        MessageId::from_digest(hasher)
    }

    /// The id of the `n`th repeat of this message on one connection. The
    /// first copy keeps the packet's id.
    pub fn occurrence(self, n: u32) -> MessageId {
        if n == 0 {
            return self;
        }
        let mut hasher = Sha256::new();
        hasher.update(self.0.to_be_bytes());
        hasher.update(n.to_be_bytes());
        MessageId::from_digest(hasher)
    }

    fn from_digest(hasher: Sha256) -> MessageId {
        let digest = hasher.finalize();
        let mut id = [0; 16];
        id.copy_from_slice(&digest[..16]);
        MessageId(u128::from_be_bytes(id))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", (self.0 >> 64) as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatType {
    pub kind: ChatKind,
    /// Chat type registry id, for player and disguised chat.
    pub registry_id: Option<i32>,
}

impl ChatType {
    pub fn system() -> ChatType {
        ChatType {
            kind: ChatKind::System,
            registry_id: None,
        }
    }
}

/// Everything known about a captured message. Never changes after capture.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub id: MessageId,
    pub sender_id: Option<u128>,
    /// The text as the client would have shown it, without styling.
    pub raw_text: String,
    pub body: RichText,
    /// Milliseconds since the unix epoch.
    pub timestamp: i64,
    pub chat_type: ChatType,
    pub signature: Option<Vec<u8>>,
    /// Raw bytes of the fields the renderer does not interpret.
    pub extra_fields: IndexMap<&'static str, Vec<u8>>,
}

impl MessageContext {
    pub fn new(id: MessageId, chat_type: ChatType, sender_id: Option<u128>, body: RichText) -> Self {
        MessageContext {
            id,
            sender_id,
            raw_text: body.plain_text(),
            body,
            timestamp: chrono::Utc::now().timestamp_millis(),
            chat_type,
            signature: None,
            extra_fields: IndexMap::new(),
        }
    }
}
