use crate::class_parser::ParseError;

/// Cursor over a byte buffer with big-endian reads. Every parser in the crate goes
/// through this, class files as well as the code arrays inside them.
#[derive(Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

// from_be_bytes is not behind a trait, so the typed reads are stamped out by a macro
macro_rules! be_reader {
    ($name: ident, $t: ty) => {
        pub fn $name(&mut self) -> Result<$t, ParseError> {
            let bytes = self.take(std::mem::size_of::<$t>())?;
            // take() returned exactly size_of bytes
            Ok(<$t>::from_be_bytes(bytes.try_into().map_err(|_| ParseError::UnexpectedEof(self.pos))?))
        }
    }
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    be_reader!(read_u1, u8);
    be_reader!(read_u2, u16);
    be_reader!(read_u4, u32);
    be_reader!(read_i1, i8);
    be_reader!(read_i2, i16);
    be_reader!(read_i4, i32);

    /// Hands out the next `len` bytes and moves past them.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        let end = self.pos.checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(ParseError::UnexpectedEof(self.pos))?;

        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// A reader over the next `len` bytes; `self` skips past them.
    pub fn sub_reader(&mut self, len: usize) -> Result<ByteReader<'a>, ParseError> {
        Ok(ByteReader::new(self.take(len)?))
    }

    pub fn peek_u1(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.buf.get(offset).copied()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) -> Result<(), ParseError> {
        if pos > self.buf.len() {
            return Err(ParseError::UnexpectedEof(pos));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Skips padding until the position is a multiple of `n` (switch instructions).
    pub fn align(&mut self, n: usize) -> Result<(), ParseError> {
        let padding = (n - self.pos % n) % n;
        self.take(padding).map(|_| ())
    }
}

#[cfg(test)]
mod test {
    use crate::class_parser::be_reader::ByteReader;
    use crate::class_parser::ParseError;

    #[test]
    fn big_endian_reads() {
        let data = [0xCA, 0xFE, 0xBA, 0xBE, 0xFF, 0xFE, 0x01];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.read_u4().unwrap(), 0xCAFEBABE);
        assert_eq!(reader.peek_u1(), Some(0xFF));
        assert_eq!(reader.read_i2().unwrap(), -2);
        assert_eq!(reader.remaining(), 1);
        assert_eq!(reader.read_u2(), Err(ParseError::UnexpectedEof(6)));
    }

    #[test]
    fn sub_reader_and_align() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut reader = ByteReader::new(&data);
        reader.read_u1().unwrap();

        let mut inner = reader.sub_reader(2).unwrap();
        assert_eq!(inner.read_u2().unwrap(), 0x0203);
        assert!(inner.is_empty());

        reader.align(4).unwrap();
        assert_eq!(reader.position(), 4);
        assert_eq!(reader.read_u1().unwrap(), 5);
    }
}
