//! Packet ids of the clientbound chat packets for each supported protocol
//! version.
//!
//! Only versions that send chat as json strings are listed. From 1.20.3 on
//! chat components are sent as nbt, so those versions have no entry and
//! their traffic passes through untouched.

use crate::chat::ChatKind;

/// Maximum length of a json chat component, in characters.
pub const MAX_CHAT_LENGTH: usize = 262_144;
/// Maximum length of the signed body of a player chat message.
pub const MAX_MESSAGE_LENGTH: usize = 256;
/// Fixed size of a message signature.
pub const SIGNATURE_LENGTH: usize = 256;
/// Most previous messages a player chat message may reference.
pub const MAX_PREVIOUS_MESSAGES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatSchema {
    pub protocol: i32,
    pub minecraft: &'static str,
    pub system_chat: i32,
    pub player_chat: i32,
    pub disguised_chat: i32,
}

impl ChatSchema {
    pub fn kind_of(&self, packet_id: i32) -> Option<ChatKind> {
        if packet_id == self.system_chat {
            Some(ChatKind::System)
        } else if packet_id == self.player_chat {
            Some(ChatKind::Player)
        } else if packet_id == self.disguised_chat {
            Some(ChatKind::Disguised)
        } else {
            None
        }
    }

    pub fn packet_id(&self, kind: ChatKind) -> i32 {
        match kind {
            ChatKind::System => self.system_chat,
            ChatKind::Player => self.player_chat,
            ChatKind::Disguised => self.disguised_chat,
        }
    }
}

static SCHEMAS: &[ChatSchema] = &[
    ChatSchema {
        protocol: 761,
        minecraft: "1.19.3",
        system_chat: 0x60,
        player_chat: 0x31,
        disguised_chat: 0x18,
    },
    ChatSchema {
        protocol: 762,
        minecraft: "1.19.4",
        system_chat: 0x64,
        player_chat: 0x35,
        disguised_chat: 0x1C,
    },
    ChatSchema {
        protocol: 763,
        minecraft: "1.20.1",
        system_chat: 0x64,
        player_chat: 0x35,
        disguised_chat: 0x1C,
    },
    ChatSchema {
        protocol: 764,
        minecraft: "1.20.2",
        system_chat: 0x67,
        player_chat: 0x37,
        disguised_chat: 0x1B,
    },
];

pub fn schema_for(protocol: i32) -> Option<&'static ChatSchema> {
    SCHEMAS.iter().find(|schema| schema.protocol == protocol)
}

pub fn supported_protocols() -> impl Iterator<Item = i32> {
    SCHEMAS.iter().map(|schema| schema.protocol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        let schema = schema_for(763).unwrap();
        assert_eq!(schema.kind_of(0x64), Some(ChatKind::System));
        assert_eq!(schema.kind_of(0x35), Some(ChatKind::Player));
        assert_eq!(schema.kind_of(0x1C), Some(ChatKind::Disguised));
        assert_eq!(schema.kind_of(0x00), None);
        assert!(schema_for(765).is_none());
        assert!(schema_for(47).is_none());
    }

    #[test]
    fn ids_are_distinct_per_version() {
        for schema in SCHEMAS {
            for kind in [ChatKind::System, ChatKind::Player, ChatKind::Disguised] {
                assert_eq!(schema.kind_of(schema.packet_id(kind)), Some(kind));
            }
        }
    }
}
