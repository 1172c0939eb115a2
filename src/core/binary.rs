//! Little-endian primitive reads shared by the container and locale parsers

use std::io::{self, Read, Seek, SeekFrom};

/// Upper bound on a single serialized string, in characters
pub const MAX_FSTRING_LEN: usize = 1 << 20;

/// Thin cursor over any `Read`, decoding engine primitives
pub struct ByteReader<R> {
    inner: R,
}

impl<R: Read> ByteReader<R> {
    pub fn new(inner: R) -> Self {
        ByteReader { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> io::Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> io::Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> io::Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> io::Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Read a count prefix, rejecting negative values
    pub fn read_count(&mut self) -> io::Result<usize> {
        let count = self.read_i32()?;
        usize::try_from(count).map_err(|_| invalid_data(format!("negative count {}", count)))
    }

    /// Read a length-prefixed engine string
    ///
    /// Positive lengths are single-byte (Latin-1) characters, negative
    /// lengths are UTF-16LE code units. Both include a trailing NUL.
    pub fn read_fstring(&mut self) -> io::Result<String> {
        let len = self.read_i32()?;
        if len == 0 {
            return Ok(String::new());
        }

        let chars = len.unsigned_abs() as usize;
        if chars > MAX_FSTRING_LEN {
            return Err(invalid_data(format!("string length {} out of range", len)));
        }

        let mut text = if len > 0 {
            let mut buf = vec![0u8; chars];
            self.inner.read_exact(&mut buf)?;
            buf.into_iter().map(char::from).collect::<String>()
        } else {
            let mut buf = vec![0u8; chars * 2];
            self.inner.read_exact(&mut buf)?;
            let units: Vec<u16> = buf
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        };

        if text.ends_with('\0') {
            text.pop();
        }
        Ok(text)
    }

    pub fn skip(&mut self, bytes: u64) -> io::Result<()> {
        let copied = io::copy(&mut (&mut self.inner).take(bytes), &mut io::sink())?;
        if copied != bytes {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "unexpected end of data while skipping",
            ));
        }
        Ok(())
    }
}

impl<R: Read + Seek> ByteReader<R> {
    pub fn position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    pub fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }
}

pub(crate) fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}
