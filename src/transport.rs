//! Socket reads with an inactivity deadline.
//!
//! The heat pump pushes its register dump unprompted. Each call to
//! [`TransportReader::read`] performs one blocking read of at most
//! [`MAX_FRAME_LEN`] bytes and classifies the outcome, so the caller can tell a
//! silent device from a broken or finished stream without inspecting errors.

use crate::protocol::MAX_FRAME_LEN;
use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Read deadline after which the device is considered silent.
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(15);

/// Classified result of one read.
#[derive(Debug)]
pub enum ReadOutcome<'a> {
    /// Bytes received by the read; a candidate frame.
    Data(&'a [u8]),
    /// Nothing arrived within the deadline.
    TimedOut,
    /// The peer closed the stream.
    Closed,
    /// Any other transport failure.
    Failed(io::Error),
}

/// Reader over a byte stream whose read timeout has been set up by its owner.
#[derive(Debug)]
pub struct TransportReader<R> {
    stream: R,
    buffer: [u8; MAX_FRAME_LEN],
}

impl<R: Read> TransportReader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            buffer: [0; MAX_FRAME_LEN],
        }
    }

    pub fn read(&mut self) -> ReadOutcome<'_> {
        loop {
            match self.stream.read(&mut self.buffer) {
                Ok(0) => return ReadOutcome::Closed,
                Ok(size) => return ReadOutcome::Data(&self.buffer[..size]),
                Err(err) => match err.kind() {
                    io::ErrorKind::Interrupted => continue,
                    // Unix reports an expired SO_RCVTIMEO as WouldBlock, Windows as TimedOut.
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                        return ReadOutcome::TimedOut
                    }
                    _ => return ReadOutcome::Failed(err),
                },
            }
        }
    }
}

/// Opens the connections handed to the pipeline.
pub trait Dial {
    type Stream: Read;

    fn dial(&mut self) -> io::Result<Self::Stream>;

    /// Human readable name of the remote end, used in logs and errors.
    fn peer(&self) -> &str;
}

/// Dials a TCP endpoint and arms the inactivity deadline on the socket.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    address: String,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl TcpDialer {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: INACTIVITY_TIMEOUT,
            read_timeout: INACTIVITY_TIMEOUT,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl Dial for TcpDialer {
    type Stream = TcpStream;

    fn dial(&mut self) -> io::Result<TcpStream> {
        let mut last_error = None;
        for addr in self.address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.read_timeout))?;
                    return Ok(stream);
                }
                Err(err) => last_error = Some(err),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} did not resolve to any address", self.address),
            )
        }))
    }

    fn peer(&self) -> &str {
        &self.address
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::net::TcpListener;

    /// Stream replaying scripted read results.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedStream {
        pub reads: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedStream {
        pub fn new(reads: impl IntoIterator<Item = io::Result<Vec<u8>>>) -> Self {
            Self {
                reads: reads.into_iter().collect(),
            }
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(bytes)) => {
                    let size = bytes.len().min(buf.len());
                    buf[..size].copy_from_slice(&bytes[..size]);
                    Ok(size)
                }
                Some(Err(err)) => Err(err),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn classifies_outcomes() {
        let stream = ScriptedStream::new([
            Ok(vec![1, 2, 3]),
            Err(io::ErrorKind::Interrupted.into()),
            Ok(vec![4]),
            Err(io::ErrorKind::WouldBlock.into()),
            Err(io::ErrorKind::TimedOut.into()),
            Err(io::ErrorKind::ConnectionReset.into()),
        ]);
        let mut reader = TransportReader::new(stream);
        assert_matches!(reader.read(), ReadOutcome::Data(&[1, 2, 3]));
        assert_matches!(reader.read(), ReadOutcome::Data(&[4]));
        assert_matches!(reader.read(), ReadOutcome::TimedOut);
        assert_matches!(reader.read(), ReadOutcome::TimedOut);
        assert_matches!(reader.read(), ReadOutcome::Failed(err) if err.kind() == io::ErrorKind::ConnectionReset);
        assert_matches!(reader.read(), ReadOutcome::Closed);
    }

    #[test]
    fn reads_are_capped_at_frame_size() {
        let stream = ScriptedStream::new([Ok(vec![7; 300])]);
        let mut reader = TransportReader::new(stream);
        assert_matches!(reader.read(), ReadOutcome::Data(bytes) if bytes.len() == MAX_FRAME_LEN);
    }

    #[test]
    fn tcp_dialer_applies_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let mut dialer = TcpDialer::new(address).with_read_timeout(Duration::from_millis(50));

        let stream = dialer.dial().unwrap();
        let (mut peer, _) = listener.accept().unwrap();
        let mut reader = TransportReader::new(stream);
        assert_matches!(reader.read(), ReadOutcome::TimedOut);

        peer.write_all(&[0x01, 0x03]).unwrap();
        assert_matches!(reader.read(), ReadOutcome::Data(&[0x01, 0x03]));

        drop(peer);
        assert_matches!(reader.read(), ReadOutcome::Closed);
    }

    #[test]
    fn tcp_dialer_reports_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);
        assert!(TcpDialer::new(address).dial().is_err());
    }
}
