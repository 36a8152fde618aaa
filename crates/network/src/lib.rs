pub mod chat;
pub mod codec;
mod frame;
pub mod schema;

use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::warn;

pub use codec::{DecodeResult, PacketDecodeError, PacketEncodeError};
pub use frame::{COMPRESSION_THRESHOLD, MAX_FRAME_LENGTH, read_frame};

/// Identifies one client connection. Assigned by the host.
pub type ConnectionId = u32;

/// A packet without its frame: the packet id and the bytes that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub id: i32,
    pub data: Vec<u8>,
}

impl RawPacket {
    pub fn new(id: i32, data: Vec<u8>) -> RawPacket {
        RawPacket { id, data }
    }
}

/// The outbound path of a single connection.
///
/// Packets are handed over in the order the client must receive them.
/// Implementations should hand the packet off quickly (e.g. into a socket
/// buffer or a channel) since other packets of the connection wait behind it.
pub trait PacketSink: Send {
    fn send_packet(&mut self, packet: RawPacket);
}

impl<F> PacketSink for F
where
    F: FnMut(RawPacket) + Send,
{
    fn send_packet(&mut self, packet: RawPacket) {
        self(packet)
    }
}

/// Writes framed packets to a shared stream.
pub struct StreamSink<W> {
    stream: Arc<Mutex<W>>,
    compression: Option<usize>,
}

impl<W: Write + Send> StreamSink<W> {
    /// `compression` is the threshold announced by Set Compression, or `None`
    /// if the connection is not compressed.
    pub fn new(stream: Arc<Mutex<W>>, compression: Option<usize>) -> StreamSink<W> {
        StreamSink {
            stream,
            compression,
        }
    }
}

impl<W: Write + Send> PacketSink for StreamSink<W> {
    fn send_packet(&mut self, packet: RawPacket) {
        let Ok(mut stream) = self.stream.lock() else {
            warn!("Dropping packet {:#04x}, stream lock is poisoned", packet.id);
            return;
        };
        let result = match self.compression {
            Some(threshold) => packet.write_compressed(&mut *stream, threshold),
            None => packet.write_uncompressed(&mut *stream),
        };
        if let Err(err) = result {
            warn!("Failed to write packet {:#04x}: {}", packet.id, err);
        }
    }
}
