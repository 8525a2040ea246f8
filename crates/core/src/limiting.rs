//! Size-limited output capture (used by `command/exec` and any future
//! streaming tool output). Writes past the cap are silently discarded, but
//! the writer always reports the full input length accepted so a short
//! write never propagates as an I/O error to the caller.

pub struct LimitedWriter {
    limit: usize,
    buf: Vec<u8>,
}

impl LimitedWriter {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            buf: Vec::new(),
        }
    }

    pub fn write(&mut self, data: &[u8]) -> usize {
        let remaining = self.limit.saturating_sub(self.buf.len());
        let take = remaining.min(data.len());
        self.buf.extend_from_slice(&data[..take]);
        data.len()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl std::io::Write for LimitedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(LimitedWriter::write(self, buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
