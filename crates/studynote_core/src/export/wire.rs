//! Big-endian primitives for the export layout.

use super::ExportError;

pub(super) struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub(super) fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub(super) fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub(super) fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub(super) fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub(super) fn put_len(&mut self, len: usize) -> Result<(), ExportError> {
        let len = u32::try_from(len)
            .map_err(|_| ExportError::Malformed(format!("length {len} exceeds u32")))?;
        self.buf.extend_from_slice(&len.to_be_bytes());
        Ok(())
    }

    pub(super) fn put_bytes(&mut self, value: &[u8]) -> Result<(), ExportError> {
        self.put_len(value.len())?;
        self.buf.extend_from_slice(value);
        Ok(())
    }

    pub(super) fn put_str(&mut self, value: &str) -> Result<(), ExportError> {
        self.put_bytes(value.as_bytes())
    }

    pub(super) fn put_raw(&mut self, value: &[u8]) {
        self.buf.extend_from_slice(value);
    }

    pub(super) fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

pub(super) struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub(super) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(super) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8], ExportError> {
        if self.remaining() < len {
            return Err(ExportError::Malformed(format!(
                "unexpected end of data reading {field} at offset {}",
                self.pos
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self, field: &str) -> Result<[u8; N], ExportError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    pub(super) fn get_u8(&mut self) -> Result<u8, ExportError> {
        Ok(self.take_array::<1>("u8")?[0])
    }

    pub(super) fn get_u32(&mut self) -> Result<u32, ExportError> {
        Ok(u32::from_be_bytes(self.take_array("u32")?))
    }

    pub(super) fn get_i32(&mut self) -> Result<i32, ExportError> {
        Ok(i32::from_be_bytes(self.take_array("i32")?))
    }

    pub(super) fn get_bytes(&mut self) -> Result<&'a [u8], ExportError> {
        let len = self.get_u32()? as usize;
        self.take(len, "length-prefixed block")
    }

    pub(super) fn get_str(&mut self) -> Result<String, ExportError> {
        let bytes = self.get_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ExportError::Malformed("string is not valid utf-8".to_string()))
    }

    /// Fails when unread bytes remain.
    pub(super) fn finish(&self) -> Result<(), ExportError> {
        if self.remaining() != 0 {
            return Err(ExportError::Malformed(format!(
                "{} trailing byte(s)",
                self.remaining()
            )));
        }
        Ok(())
    }
}
