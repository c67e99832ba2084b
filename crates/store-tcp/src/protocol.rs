//! Wire protocol between `TcpStore` clients and the `StoreServer`.
//!
//! Every message is a frame: a 4-byte big-endian length followed by a CBOR
//! encoded [`Request`] or [`Response`].

use bytes::Bytes;
use foehn_store::StoreErrorKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::Error;

/// Largest frame accepted in either direction (10MB).
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Request {
    Add { key: String, amount: i64 },
    Check { keys: Vec<String> },
    Get { key: String },
    Ping,
    Set { key: String, value: Bytes },
    Wait { keys: Vec<String>, timeout_ms: u64 },
}

impl Request {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Check { .. } => "check",
            Self::Get { .. } => "get",
            Self::Ping => "ping",
            Self::Set { .. } => "set",
            Self::Wait { .. } => "wait",
        }
    }

    /// The single key this request targets, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Add { key, .. } | Self::Get { key } | Self::Set { key, .. } => Some(key),
            Self::Check { .. } | Self::Ping | Self::Wait { .. } => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Response {
    Counter(i64),
    Error { kind: StoreErrorKind, message: String },
    Ok,
    Pong,
    Ready(bool),
    TimedOut { missing: Vec<String> },
    Value(Bytes),
}

pub fn encode<T: Serialize>(message: &T) -> Result<Bytes, Error> {
    let mut buf = Vec::new();
    ciborium::into_writer(message, &mut buf).map_err(|e| Error::Serialize(e.to_string()))?;
    Ok(Bytes::from(buf))
}

pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, Error> {
    ciborium::from_reader(data).map_err(|e| Error::Deserialize(e.to_string()))
}

/// Reads one frame. Returns `None` on a clean end of stream, i.e. one that
/// falls between frames; a stream ending mid-header is an error.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Bytes>, Error> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let read = reader
            .read(&mut len_buf[filled..])
            .await
            .map_err(|e| Error::Io("error reading frame length", e))?;

        match (read, filled) {
            (0, 0) => return Ok(None),
            (0, _) => {
                return Err(Error::Io(
                    "error reading frame length",
                    std::io::ErrorKind::UnexpectedEof.into(),
                ));
            }
            _ => filled += read,
        }
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(len));
    }

    let mut data = vec![0u8; len];
    reader
        .read_exact(&mut data)
        .await
        .map_err(|e| Error::Io("error reading frame", e))?;

    Ok(Some(Bytes::from(data)))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> Result<(), Error> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(data.len()));
    }

    #[allow(clippy::cast_possible_truncation)]
    let len = data.len() as u32;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| Error::Io("error writing frame length", e))?;
    writer
        .write_all(data)
        .await
        .map_err(|e| Error::Io("error writing frame", e))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::Io("error flushing frame", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_frame_through_duplex() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let request = Request::Wait {
            keys: vec!["rank0".to_string(), "rank1".to_string()],
            timeout_ms: 30_000,
        };

        write_frame(&mut client, &encode(&request).unwrap())
            .await
            .unwrap();
        let frame = read_frame(&mut server).await.unwrap().unwrap();

        assert_eq!(decode::<Request>(&frame).unwrap(), request);
    }

    #[tokio::test]
    async fn test_clean_eof_is_none() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        assert_matches!(read_frame(&mut server).await, Ok(None));
    }

    #[tokio::test]
    async fn test_truncated_header_is_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0, 0]).await.unwrap();
        drop(client);

        assert_matches!(
            read_frame(&mut server).await,
            Err(Error::Io(_, e)) if e.kind() == std::io::ErrorKind::UnexpectedEof
        );
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let len = u32::try_from(MAX_FRAME_SIZE + 1).unwrap();
        client.write_all(&len.to_be_bytes()).await.unwrap();

        assert_matches!(read_frame(&mut server).await, Err(Error::FrameTooLarge(_)));
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        assert_matches!(decode::<Response>(&[0xff, 0x00]), Err(Error::Deserialize(_)));
    }

    #[test]
    fn test_request_key() {
        let request = Request::Set {
            key: "x".to_string(),
            value: Bytes::from_static(b"A"),
        };
        assert_eq!(request.key(), Some("x"));
        assert_eq!(request.name(), "set");
        assert_eq!(Request::Ping.key(), None);
    }
}
