use crate::RawPacket;
use crate::codec::{DecodeResult, PacketDecodeError, PacketDecoderExt, varint};
use flate2::Compression;
use flate2::bufread::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{self, Cursor, Read, Write};

/// Packets with a body at least this large get compressed.
pub const COMPRESSION_THRESHOLD: usize = 256;
/// The largest length a 3 byte VarInt frame header can describe.
pub const MAX_FRAME_LENGTH: usize = 2_097_151;

impl RawPacket {
    /// Parses a packet id followed by its body.
    pub fn decode_unframed(bytes: &[u8]) -> DecodeResult<RawPacket> {
        let mut cursor = Cursor::new(bytes);
        let id = cursor.read_varint()?;
        let data = cursor.read_remaining()?;
        Ok(RawPacket { id, data })
    }

    pub fn encode_unframed(&self) -> Vec<u8> {
        [varint(self.id).as_slice(), self.data.as_slice()].concat()
    }

    pub fn write_uncompressed(&self, mut w: impl Write) -> io::Result<()> {
        let packet_id = varint(self.id);
        let length = varint((self.data.len() + packet_id.len()) as i32);

        w.write_all(&length)?;
        w.write_all(&packet_id)?;
        w.write_all(&self.data)?;
        Ok(())
    }

    /// Writes the packet using the compressed frame format, which is in use
    /// once the server has sent Set Compression.
    pub fn write_compressed(&self, mut w: impl Write, threshold: usize) -> io::Result<()> {
        let data = self.encode_unframed();
        if data.len() < threshold {
            // Data Length adds another byte
            let packet_length = varint((1 + data.len()) as i32);

            w.write_all(&packet_length)?;
            // Data Length: 0 because uncompressed
            w.write_all(&[0])?;
            w.write_all(&data)?;
        } else {
            let data_length = varint(data.len() as i32);
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            let compressed = encoder.finish()?;
            let packet_length = varint((data_length.len() + compressed.len()) as i32);

            w.write_all(&packet_length)?;
            w.write_all(&data_length)?;
            w.write_all(&compressed)?;
        }
        Ok(())
    }
}

/// Reads one frame. Returns `None` if the stream ended cleanly before the
/// frame started.
pub fn read_frame<R: Read>(reader: &mut R, compressed: bool) -> DecodeResult<Option<RawPacket>> {
    let mut first = [0u8; 1];
    if reader.read(&mut first)? == 0 {
        return Ok(None);
    }
    let length = Cursor::new(first).chain(reader.by_ref()).read_length()?;
    if length > MAX_FRAME_LENGTH {
        return Err(PacketDecodeError::InvalidLength(length as i32));
    }
    let frame = reader.read_bytes(length)?;
    if !compressed {
        return RawPacket::decode_unframed(&frame).map(Some);
    }

    let mut cursor = Cursor::new(frame.as_slice());
    let decompressed_length = cursor.read_length()?;
    let rest = &frame[cursor.position() as usize..];
    // `rest` is not compressed if `decompressed_length` is 0
    if decompressed_length == 0 {
        return RawPacket::decode_unframed(rest).map(Some);
    }
    if decompressed_length > MAX_FRAME_LENGTH * 4 {
        return Err(PacketDecodeError::InvalidLength(decompressed_length as i32));
    }
    let mut decompressed = Vec::with_capacity(decompressed_length);
    ZlibDecoder::new(rest)
        .take(decompressed_length as u64 + 1)
        .read_to_end(&mut decompressed)?;
    if decompressed.len() != decompressed_length {
        return Err(PacketDecodeError::CompressedLengthMismatch);
    }
    RawPacket::decode_unframed(&decompressed).map(Some)
}
