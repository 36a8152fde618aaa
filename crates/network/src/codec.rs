use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, Read};
use std::string::FromUtf8Error;
use thiserror::Error;

pub type DecodeResult<T> = std::result::Result<T, PacketDecodeError>;

#[derive(Debug, Error)]
pub enum PacketDecodeError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    FromUtf8(#[from] FromUtf8Error),
    #[error("VarInt is too big")]
    VarIntTooBig,
    #[error("invalid length {0}")]
    InvalidLength(i32),
    #[error("string of {len} characters exceeds the maximum of {max}")]
    StringTooLong { len: usize, max: usize },
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
    #[error("decompressed length does not match the frame header")]
    CompressedLengthMismatch,
}

#[derive(Debug, Error)]
pub enum PacketEncodeError {
    #[error("string of {len} characters exceeds the maximum of {max}")]
    StringTooLong { len: usize, max: usize },
    #[error("could not encode json: {0}")]
    Json(#[from] serde_json::Error),
}

impl<R: Read> PacketDecoderExt for R {}

pub trait PacketDecoderExt: Read + Sized {
    fn read_unsigned_byte(&mut self) -> DecodeResult<u8> {
        Ok(self.read_u8()?)
    }

    fn read_byte(&mut self) -> DecodeResult<i8> {
        Ok(self.read_i8()?)
    }

    fn read_bytes(&mut self, bytes: usize) -> DecodeResult<Vec<u8>> {
        // Grows as data arrives so a bogus length can't force a huge allocation
        let mut read = Vec::new();
        Read::read_to_end(&mut self.by_ref().take(bytes as u64), &mut read)?;
        if read.len() != bytes {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        Ok(read)
    }

    fn read_long(&mut self) -> DecodeResult<i64> {
        Ok(self.read_i64::<BigEndian>()?)
    }

    fn read_int(&mut self) -> DecodeResult<i32> {
        Ok(self.read_i32::<BigEndian>()?)
    }

    fn read_uuid(&mut self) -> DecodeResult<u128> {
        Ok(self.read_u128::<BigEndian>()?)
    }

    fn read_bool(&mut self) -> DecodeResult<bool> {
        Ok(self.read_u8()? == 1)
    }

    fn read_varint(&mut self) -> DecodeResult<i32> {
        let mut num_read = 0;
        let mut result = 0i32;
        loop {
            let read = self.read_unsigned_byte()?;
            let value = (read & 0b0111_1111) as i32;
            result |= value << (7 * num_read);

            num_read += 1;
            if read & 0b1000_0000 == 0 {
                break;
            }
            if num_read >= 5 {
                return Err(PacketDecodeError::VarIntTooBig);
            }
        }
        Ok(result)
    }

    /// Reads a length that must not be negative.
    fn read_length(&mut self) -> DecodeResult<usize> {
        let length = self.read_varint()?;
        usize::try_from(length).map_err(|_| PacketDecodeError::InvalidLength(length))
    }

    /// Reads a string of at most `max` characters.
    fn read_string(&mut self, max: usize) -> DecodeResult<String> {
        let length = self.read_length()?;
        if length > max * 4 {
            return Err(PacketDecodeError::StringTooLong { len: length, max });
        }
        let string = String::from_utf8(self.read_bytes(length)?)?;
        let chars = string.chars().count();
        if chars > max {
            return Err(PacketDecodeError::StringTooLong { len: chars, max });
        }
        Ok(string)
    }

    fn read_remaining(&mut self) -> DecodeResult<Vec<u8>> {
        let mut data = Vec::new();
        Read::read_to_end(self, &mut data)?;
        Ok(data)
    }
}

pub(crate) fn varint(val: i32) -> Vec<u8> {
    let mut val = val as u32;
    let mut buf = Vec::with_capacity(5);
    loop {
        let mut temp = (val & 0b0111_1111) as u8;
        val >>= 7;
        if val != 0 {
            temp |= 0b1000_0000;
        }
        buf.push(temp);
        if val == 0 {
            return buf;
        }
    }
}

pub trait PacketEncoderExt {
    fn write_bytes(&mut self, val: &[u8]);

    fn write_varint(&mut self, val: i32) {
        self.write_bytes(&varint(val));
    }

    fn write_bool(&mut self, val: bool) {
        self.write_bytes(&[val as u8]);
    }

    fn write_long(&mut self, val: i64) {
        self.write_bytes(&val.to_be_bytes());
    }

    fn write_uuid(&mut self, val: u128) {
        self.write_bytes(&val.to_be_bytes());
    }

    /// Writes a string of at most `max` characters.
    fn write_string(&mut self, max: usize, val: &str) -> Result<(), PacketEncodeError> {
        let chars = val.chars().count();
        if chars > max {
            return Err(PacketEncodeError::StringTooLong { len: chars, max });
        }
        self.write_varint(val.len() as i32);
        self.write_bytes(val.as_bytes());
        Ok(())
    }
}

impl PacketEncoderExt for Vec<u8> {
    fn write_bytes(&mut self, val: &[u8]) {
        self.extend_from_slice(val);
    }
}
