use std::time::Duration;

use bytes::{BufMut, BytesMut};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// In-memory transport with separate inbound and outbound queues.
///
/// Never blocks: `poll_read` returns whatever has been pushed with
/// [`MemoryTransport::push_inbound`], or `Ok(0)` if nothing has. Two
/// endpoints are wired together by moving `take_outbound()` of one into
/// `push_inbound()` of the other.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    inbound: BytesMut,
    outbound: BytesMut,
    closed: bool,
    flushes: usize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the next `poll_read`.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend_from_slice(bytes);
    }

    /// Drain everything written so far.
    pub fn take_outbound(&mut self) -> Vec<u8> {
        self.outbound.split().to_vec()
    }

    /// Bytes written but not yet taken.
    pub fn outbound(&self) -> &[u8] {
        &self.outbound
    }

    /// Make further reads report [`TransportError::Closed`] once the
    /// inbound queue is empty.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Number of `flush` calls observed.
    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

impl Transport for MemoryTransport {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.outbound.put_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn poll_read(&mut self, dst: &mut BytesMut, _timeout: Option<Duration>) -> Result<usize> {
        if self.inbound.is_empty() {
            if self.closed {
                return Err(TransportError::Closed);
            }
            return Ok(0);
        }
        let n = self.inbound.len();
        dst.extend_from_slice(&self.inbound.split());
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_collects_outbound() {
        let mut t = MemoryTransport::new();
        t.write(&[1, 2]).unwrap();
        t.write_byte(3).unwrap();
        t.flush().unwrap();

        assert_eq!(t.outbound(), &[1, 2, 3]);
        assert_eq!(t.take_outbound(), vec![1, 2, 3]);
        assert!(t.take_outbound().is_empty());
        assert_eq!(t.flush_count(), 1);
    }

    #[test]
    fn poll_read_drains_inbound() {
        let mut t = MemoryTransport::new();
        let mut buf = BytesMut::new();

        assert_eq!(t.poll_read(&mut buf, None).unwrap(), 0);

        t.push_inbound(&[0x7E, 0xFF]);
        t.push_inbound(&[0x63]);
        assert_eq!(t.poll_read(&mut buf, None).unwrap(), 3);
        assert_eq!(&buf[..], &[0x7E, 0xFF, 0x63]);
        assert_eq!(t.poll_read(&mut buf, Some(Duration::ZERO)).unwrap(), 0);
    }

    #[test]
    fn closed_reports_after_drain() {
        let mut t = MemoryTransport::new();
        let mut buf = BytesMut::new();
        t.push_inbound(&[9]);
        t.close();

        assert_eq!(t.poll_read(&mut buf, None).unwrap(), 1);
        assert!(matches!(
            t.poll_read(&mut buf, None),
            Err(TransportError::Closed)
        ));
    }
}
