use crate::command_parser::{CommandParser, FrameOutcome};
use crate::errors::ProtocolError;
use crate::protocol_constants::CRLF;
use bytes::{Buf, Bytes, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

const READ_CHUNK: usize = 1024;

/// One TCP connection. Reads go through an accumulation buffer so frames
/// split across reads (or pipelined together) come out whole and in order.
/// The write half is shared: a connection promoted to a replica hands a
/// clone of it to the fan-out registry while this worker keeps reading.
pub struct Client {
    reader: OwnedReadHalf,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    buffer: BytesMut,
}

impl Client {
    pub fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader,
            writer: Arc::new(Mutex::new(writer)),
            buffer: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    pub fn get_writer(&self) -> Arc<Mutex<OwnedWriteHalf>> {
        Arc::clone(&self.writer)
    }

    /// Next framed request. `None` is a clean end-of-stream between frames;
    /// end-of-stream inside a frame is a protocol error.
    pub async fn read_request(&mut self) -> Result<Option<Vec<Bytes>>, ProtocolError> {
        loop {
            if let FrameOutcome::Complete { tokens, consumed } =
                CommandParser::try_parse_request(&self.buffer)?
            {
                self.buffer.advance(consumed);
                return Ok(Some(tokens));
            }
            if self.fill_buffer().await? == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(ProtocolError::UnexpectedEof);
            }
        }
    }

    /// One CRLF-terminated reply line, prefix included. Used on the replica
    /// side of the handshake, where each reply is parsed as a framed value
    /// rather than a fixed byte count.
    pub async fn read_reply_line(&mut self) -> Result<String, ProtocolError> {
        loop {
            if let Some(end) = self
                .buffer
                .windows(2)
                .position(|w| w == CRLF.as_bytes())
            {
                let line = String::from_utf8_lossy(&self.buffer[..end]).to_string();
                self.buffer.advance(end + 2);
                return Ok(line);
            }
            if self.fill_buffer().await? == 0 {
                return Err(ProtocolError::UnexpectedEof);
            }
        }
    }

    /// The full-resync transfer: `$<n>\r\n` followed by exactly n raw bytes
    /// with no trailing CRLF.
    pub async fn read_snapshot_payload(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let header = self.read_reply_line().await?;
        let size: usize = header
            .strip_prefix('$')
            .and_then(|s| s.parse().ok())
            .ok_or(ProtocolError::InvalidBulkHeader)?;

        while self.buffer.len() < size {
            if self.fill_buffer().await? == 0 {
                return Err(ProtocolError::UnexpectedEof);
            }
        }
        let payload = self.buffer[..size].to_vec();
        self.buffer.advance(size);
        Ok(payload)
    }

    pub async fn write_all(&self, data: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await?;
        writer.flush().await
    }

    async fn fill_buffer(&mut self) -> Result<usize, ProtocolError> {
        self.buffer.reserve(READ_CHUNK);
        Ok(self.reader.read_buf(&mut self.buffer).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (Client, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        (Client::new(stream), peer)
    }

    #[tokio::test]
    async fn reassembles_a_frame_split_across_writes() {
        let (mut client, mut peer) = connected_pair().await;
        peer.write_all(b"*2\r\n$4\r\nEC").await.unwrap();
        peer.flush().await.unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            peer.write_all(b"HO\r\n$5\r\nhello\r\n").await.unwrap();
            peer.flush().await.unwrap();
        });

        let tokens = client.read_request().await.unwrap().unwrap();
        assert_eq!(
            tokens,
            vec![Bytes::from_static(b"ECHO"), Bytes::from_static(b"hello")]
        );
    }

    #[tokio::test]
    async fn drains_pipelined_frames_in_order() {
        let (mut client, mut peer) = connected_pair().await;
        peer.write_all(b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nSAVE\r\n")
            .await
            .unwrap();
        drop(peer);

        let first = client.read_request().await.unwrap().unwrap();
        assert_eq!(first, vec![Bytes::from_static(b"PING")]);
        let second = client.read_request().await.unwrap().unwrap();
        assert_eq!(second, vec![Bytes::from_static(b"SAVE")]);
        assert!(client.read_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_mid_frame_is_a_protocol_error() {
        let (mut client, mut peer) = connected_pair().await;
        peer.write_all(b"*2\r\n$4\r\nECHO\r\n$5\r\nhel").await.unwrap();
        drop(peer);

        assert!(matches!(
            client.read_request().await,
            Err(ProtocolError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn reads_snapshot_payload_without_trailing_crlf() {
        let (mut client, mut peer) = connected_pair().await;
        peer.write_all(b"+FULLRESYNC abc 0\r\n$5\r\nREDIS*1\r\n$4\r\nPING\r\n")
            .await
            .unwrap();

        assert_eq!(client.read_reply_line().await.unwrap(), "+FULLRESYNC abc 0");
        assert_eq!(client.read_snapshot_payload().await.unwrap(), b"REDIS");
        let next = client.read_request().await.unwrap().unwrap();
        assert_eq!(next, vec![Bytes::from_static(b"PING")]);
    }
}
