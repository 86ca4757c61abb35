use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Error during record encoding
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error
    Io(std::io::Error),
}

/// Error during record decoding
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error
    Io(std::io::Error),
}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// A fixed-size value that can live inside an external-memory block
///
/// Records are encoded back to back into block-sized byte buffers; the
/// encoded width is a compile-time constant so a block holds exactly
/// `block_size / SIZE` records and the record at logical index `i` can be
/// located by pure arithmetic.
pub trait Record: Clone {
    /// Encoded width in bytes
    const SIZE: usize;

    /// Encode to bytes
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Decode from bytes
    fn decode<R: Read>(reader: &mut R) -> Result<Self, DecodeError>
    where
        Self: Sized;
}

impl Record for u8 {
    const SIZE: usize = 1;

    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u8(*self)?;
        Ok(())
    }

    fn decode<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(reader.read_u8()?)
    }
}

macro_rules! int_record {
    ($t:ty, $w:ident, $r:ident, $n:expr) => {
        impl Record for $t {
            const SIZE: usize = $n;

            fn encode<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
                writer.$w::<BigEndian>(*self)?;
                Ok(())
            }

            fn decode<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
                Ok(reader.$r::<BigEndian>()?)
            }
        }
    };
}

int_record!(u16, write_u16, read_u16, 2);
int_record!(u32, write_u32, read_u32, 4);
int_record!(u64, write_u64, read_u64, 8);
int_record!(i32, write_i32, read_i32, 4);
int_record!(i64, write_i64, read_i64, 8);

macro_rules! tuple_record {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Record),+> Record for ($($name,)+) {
            const SIZE: usize = 0 $(+ $name::SIZE)+;

            fn encode<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
                $(self.$idx.encode(writer)?;)+
                Ok(())
            }

            fn decode<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
                Ok(($($name::decode(reader)?,)+))
            }
        }
    };
}

tuple_record!(A: 0, B: 1);
tuple_record!(A: 0, B: 1, C: 2);
tuple_record!(A: 0, B: 1, C: 2, D: 3);
tuple_record!(A: 0, B: 1, C: 2, D: 3, E: 4);

/// Encodes `items` into the front of `buf`, leaving the tail untouched
///
/// # Panics
///
/// Panics if the items do not fit into `buf`.
pub fn encode_block<T: Record>(items: &[T], buf: &mut [u8]) -> crate::Result<()> {
    assert!(items.len() * T::SIZE <= buf.len());

    let mut cursor = &mut buf[..];
    for item in items {
        item.encode(&mut cursor)?;
    }

    Ok(())
}

/// Decodes `count` records from the front of `buf`
///
/// # Panics
///
/// Panics if `buf` is too short to contain `count` records.
pub fn decode_block<T: Record>(buf: &[u8], count: usize) -> crate::Result<Vec<T>> {
    assert!(count * T::SIZE <= buf.len());

    let mut cursor = buf;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(T::decode(&mut cursor)?);
    }

    Ok(items)
}
