//! Trait abstractions for the stick transport to enable testing

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Trait for serial port write operations
#[async_trait]
pub trait SerialPortIO: Send {
    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;
}

/// Wrapper around any tokio writer (serial stream, write half, pipe) that
/// implements SerialPortIO
pub struct TokioSerialPort<W> {
    port: W,
}

impl<W> TokioSerialPort<W> {
    pub fn new(port: W) -> Self {
        Self { port }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> SerialPortIO for TokioSerialPort<W> {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.flush().await
    }
}

/// Read side of an open transport
pub type TransportReader = Box<dyn AsyncRead + Unpin + Send>;

/// Write side of an open transport
pub type TransportWriter = Box<dyn SerialPortIO>;

/// An open connection to the stick, split into independent halves
pub struct Transport {
    pub reader: TransportReader,
    pub writer: TransportWriter,
}

impl Transport {
    /// Split any bidirectional stream into a transport
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(reader),
            writer: Box::new(TokioSerialPort::new(writer)),
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Opens (and reopens) the transport to the stick
///
/// The stick controller calls this once at start-up and again every time the
/// transport closes.
#[cfg_attr(test, mockall::automock)]
pub trait Connector: Send + 'static {
    /// Open a fresh transport
    fn open(&mut self) -> Result<Transport>;

    /// Human-readable description of what is being opened
    fn describe(&self) -> String;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokio_port_writes_exact_bytes() {
        let writer = tokio_test::io::Builder::new()
            .write(&[0xAA, 0x02, 0x4A, 0x0A])
            .build();
        let mut port = TokioSerialPort::new(writer);

        port.write_all(&[0xAA, 0x02, 0x4A, 0x0A]).await.unwrap();
        port.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_tokio_port_surfaces_write_error() {
        let writer = tokio_test::io::Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
            .build();
        let mut port = TokioSerialPort::new(writer);

        let err = port.write_all(&[0xAA]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_transport_from_duplex_stream() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (local, mut remote) = tokio::io::duplex(64);
        let mut transport = Transport::from_stream(local);

        transport.writer.write_all(&[0xAA, 0x02]).await.unwrap();
        let mut buf = [0u8; 2];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0xAA, 0x02]);

        remote.write_all(&[0x4B]).await.unwrap();
        let mut byte = [0u8; 1];
        transport.reader.read_exact(&mut byte).await.unwrap();
        assert_eq!(byte, [0x4B]);
    }

    #[tokio::test]
    async fn test_mock_port_records_writes() {
        let mock = mocks::MockSerialPort::new();
        let mut port = mock.clone();

        port.write_all(&[1, 2, 3]).await.unwrap();
        assert_eq!(mock.get_written_data(), vec![vec![1, 2, 3]]);

        mock.set_write_error(io::ErrorKind::TimedOut);
        assert!(port.write_all(&[4]).await.is_err());

        mock.set_flush_error(io::ErrorKind::Other);
        assert!(port.flush().await.is_err());
    }
}
