use chatr_core::config::ChatConfig;
use chatr_core::registry::SnapshotRegistry;
use chatr_core::{ChatPipeline, Interception};
use chatr_network::chat::{ChatContent, ChatLayout, parse_chat};
use chatr_network::codec::PacketEncoderExt;
use chatr_network::schema::{MAX_CHAT_LENGTH, MAX_MESSAGE_LENGTH, schema_for};
use chatr_network::{ConnectionId, PacketSink, RawPacket};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

pub const PROTOCOL: i32 = 763;
pub const SYSTEM_CHAT: i32 = 0x64;
pub const PLAYER_CHAT: i32 = 0x35;

pub fn system_chat(json: &str) -> RawPacket {
    let mut data = Vec::new();
    data.write_string(MAX_CHAT_LENGTH, json).unwrap();
    data.write_bool(false);
    RawPacket::new(SYSTEM_CHAT, data)
}

pub fn player_chat(sender: u128, body: &str) -> RawPacket {
    let mut data = Vec::new();
    data.write_uuid(sender);
    data.write_varint(12);
    data.write_bool(true);
    data.write_bytes(&(0..=255).collect::<Vec<u8>>());
    data.write_string(MAX_MESSAGE_LENGTH, body).unwrap();
    data.write_long(1_700_000_000_000);
    data.write_long(0x1234_5678);
    data.write_varint(1);
    data.write_varint(0);
    data.write_bytes(&[0x42; 256]);
    data.write_bool(false);
    data.write_varint(0);
    data.write_varint(0);
    data.write_string(MAX_CHAT_LENGTH, r#"{"text":"Steve"}"#).unwrap();
    data.write_bool(false);
    RawPacket::new(PLAYER_CHAT, data)
}

/// Disguised chat, as sent for `/say` and console messages.
pub fn disguised_chat(id: i32, json: &str) -> RawPacket {
    let mut data = Vec::new();
    data.write_string(MAX_CHAT_LENGTH, json).unwrap();
    data.write_varint(1);
    data.write_string(MAX_CHAT_LENGTH, r#""Server""#).unwrap();
    data.write_bool(false);
    RawPacket::new(id, data)
}

/// `packet` under the id another protocol version uses.
pub fn with_id(packet: RawPacket, id: i32) -> RawPacket {
    RawPacket::new(id, packet.data)
}

/// A packet that is not chat.
pub fn other(id: i32) -> RawPacket {
    RawPacket::new(id, vec![id as u8; 4])
}

pub fn layout(packet: &RawPacket) -> ChatLayout {
    layout_for(PROTOCOL, packet)
}

pub fn layout_for(protocol: i32, packet: &RawPacket) -> ChatLayout {
    parse_chat(schema_for(protocol).unwrap(), packet)
        .unwrap()
        .expect("not a chat packet")
}

/// The text a client would display for a chat packet.
pub fn chat_text(packet: &RawPacket) -> String {
    chat_text_for(PROTOCOL, packet)
}

pub fn chat_text_for(protocol: i32, packet: &RawPacket) -> String {
    match layout_for(protocol, packet).content {
        ChatContent::Component(text) => text.plain_text(),
        ChatContent::Plain(body) => body,
    }
}

pub fn config(toml: &str) -> ChatConfig {
    ChatConfig::from_toml(toml).unwrap()
}

/// Collects what one connection would have put on the wire, both packets
/// the pipeline delivered and packets handed back to the host.
#[derive(Clone, Default)]
pub struct Recorder {
    packets: Arc<(Mutex<Vec<RawPacket>>, Condvar)>,
}

impl Recorder {
    pub fn push(&self, packet: RawPacket) {
        let (packets, changed) = &*self.packets;
        packets.lock().unwrap().push(packet);
        changed.notify_all();
    }

    pub fn sink(&self) -> Box<dyn PacketSink> {
        let recorder = self.clone();
        Box::new(move |packet: RawPacket| recorder.push(packet))
    }

    /// Waits until `count` packets were recorded and returns them.
    pub fn wait_for(&self, count: usize) -> Vec<RawPacket> {
        let (packets, changed) = &*self.packets;
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut guard = packets.lock().unwrap();
        while guard.len() < count {
            let now = Instant::now();
            assert!(now < deadline, "only {} of {} packets arrived", guard.len(), count);
            guard = changed.wait_timeout(guard, deadline - now).unwrap().0;
        }
        guard.clone()
    }
}

pub struct Host {
    pub pipeline: ChatPipeline,
    pub registry: Arc<SnapshotRegistry>,
}

impl Host {
    pub fn new(config: &ChatConfig, registry: SnapshotRegistry) -> Host {
        let registry = Arc::new(registry);
        let pipeline = ChatPipeline::new(config, registry.clone()).unwrap();
        Host { pipeline, registry }
    }

    pub fn connect(&self, connection: ConnectionId, player: u128) -> Recorder {
        self.connect_with(connection, player, PROTOCOL)
    }

    pub fn connect_with(&self, connection: ConnectionId, player: u128, protocol: i32) -> Recorder {
        let recorder = Recorder::default();
        self.pipeline
            .open_connection(connection, player, protocol, recorder.sink());
        recorder
    }

    /// Sends a packet the way a server would: through the pipeline, writing
    /// anything handed back itself.
    pub fn send(&self, connection: ConnectionId, recorder: &Recorder, packet: RawPacket) {
        if let Interception::PassThrough(packet) = self.pipeline.intercept(connection, packet) {
            recorder.push(packet);
        }
    }
}
