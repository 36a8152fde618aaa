use crate::context::{ChatType, MessageContext, MessageId};
use crate::error::InterceptError;
use crate::registry::PlayerRegistry;
use chatr_network::RawPacket;
use chatr_network::chat::{ChatContent, ChatLayout, parse_chat};
use chatr_network::schema::schema_for;
use chatr_text::RichText;
use std::sync::Arc;

/// A chat packet taken out of the outbound stream for rendering.
#[derive(Debug, Clone)]
pub struct Captured {
    pub context: MessageContext,
    pub layout: ChatLayout,
}

pub struct PacketInterceptor {
    registry: Arc<dyn PlayerRegistry>,
    color_permission: String,
}

impl PacketInterceptor {
    pub fn new(registry: Arc<dyn PlayerRegistry>, color_permission: impl Into<String>) -> Self {
        PacketInterceptor {
            registry,
            color_permission: color_permission.into(),
        }
    }

    /// Reads the message out of a chat packet.
    ///
    /// `Ok(None)` means the packet is not a chat line that can be rendered:
    /// other packets, action bar messages and messages the server filtered.
    pub fn capture(
        &self,
        protocol: i32,
        packet: &RawPacket,
    ) -> Result<Option<Captured>, InterceptError> {
        let schema = schema_for(protocol).ok_or(InterceptError::UnknownProtocol(protocol))?;
        let layout = parse_chat(schema, packet).map_err(|source| {
            InterceptError::UnrecognizedPacketShape {
                packet_id: packet.id,
                source,
            }
        })?;
        let Some(layout) = layout else {
            return Ok(None);
        };
        if layout.overlay || layout.filtered {
            return Ok(None);
        }

        let body = match &layout.content {
            ChatContent::Component(rich) => rich.clone(),
            ChatContent::Plain(body) => {
                let may_style = layout
                    .sender
                    .and_then(|uuid| self.registry.snapshot(uuid))
                    .is_some_and(|sender| sender.has_permission(&self.color_permission));
                if may_style {
                    RichText::markup(body.as_str())
                } else {
                    RichText::literal(body.as_str())
                }
            }
        };
        let extra_fields = layout
            .fields
            .iter()
            .filter_map(|(name, range)| Some((*name, packet.data.get(range.clone())?.to_vec())))
            .collect();

        let context = MessageContext {
            id: MessageId::of_packet(&layout, &packet.data),
            sender_id: layout.sender,
            raw_text: body.plain_text(),
            body,
            timestamp: layout
                .timestamp
                .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
            chat_type: ChatType {
                kind: layout.kind,
                registry_id: layout.chat_type,
            },
            signature: layout.signature.clone(),
            extra_fields,
        };
        Ok(Some(Captured { context, layout }))
    }
}
