//! Wire Protocol
//!
//! One exchange per TCP connection. Two frame shapes exist:
//!
//! - **Envelope**: `u32` big-endian length of the rest, one kind tag byte, bincode payload.
//! - **Response**: `u32` big-endian length, bincode [`JobResponse`].
//!
//! The envelope is read as a raw [`Frame`] first so the dispatcher can forward it to a
//! satellite byte for byte. Every read, write and connect is bounded by a timeout.

use super::types::*;

use bincode::Options;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Upper bound for a single frame body.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out while {0}")]
    Timeout(&'static str),

    #[error("malformed payload: {0}")]
    Codec(#[from] bincode::Error),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown message kind tag {0}")]
    UnknownKind(u8),

    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),

    #[error("empty frame")]
    EmptyFrame,
}

/// Socket deadlines. `job` bounds the wait for a tool result, which can legitimately take
/// much longer than any single read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub io: Duration,
    pub job: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            io: Duration::from_secs(30),
            job: Duration::from_secs(300),
        }
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_FRAME_LEN as u64)
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(codec().serialize(value)?)
}

/// Trailing bytes are rejected, so a payload of the wrong shape fails instead of
/// decoding as a prefix.
fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(codec().deserialize(bytes)?)
}

/// An envelope as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn encode(message: &Message) -> Result<Self, ProtocolError> {
        let payload = match message {
            Message::JobRequest(job) => encode(job)?,
            Message::RegisterSatellite(info) => encode(info)?,
        };

        Ok(Self {
            tag: message.kind().tag(),
            payload,
        })
    }

    pub fn kind(&self) -> Result<MessageKind, ProtocolError> {
        MessageKind::from_tag(self.tag).ok_or(ProtocolError::UnknownKind(self.tag))
    }

    pub fn decode(&self) -> Result<Message, ProtocolError> {
        match self.kind()? {
            MessageKind::JobRequest => Ok(Message::JobRequest(decode(&self.payload)?)),
            MessageKind::RegisterSatellite => {
                Ok(Message::RegisterSatellite(decode(&self.payload)?))
            }
        }
    }
}

pub async fn connect(
    target: &ConnectivityInfo,
    timeouts: &Timeouts,
) -> Result<TcpStream, ProtocolError> {
    let stream = tokio::time::timeout(timeouts.connect, TcpStream::connect(target.address()))
        .await
        .map_err(|_| ProtocolError::Timeout("connecting"))??;

    Ok(stream)
}

async fn write_body<W>(writer: &mut W, body: &[u8], timeout: Duration) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(body.len()));
    }

    let mut buf = Vec::with_capacity(4 + body.len());
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(body);

    tokio::time::timeout(timeout, async {
        writer.write_all(&buf).await?;
        writer.flush().await
    })
    .await
    .map_err(|_| ProtocolError::Timeout("writing"))??;

    Ok(())
}

async fn read_body<R>(reader: &mut R, timeout: Duration) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    tokio::time::timeout(timeout, async {
        let len = reader.read_u32().await? as usize;
        if len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge(len));
        }

        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).await?;
        Ok::<_, ProtocolError>(body)
    })
    .await
    .map_err(|_| ProtocolError::Timeout("reading"))?
}

pub async fn write_frame<W>(
    writer: &mut W,
    frame: &Frame,
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut body = Vec::with_capacity(1 + frame.payload.len());
    body.push(frame.tag);
    body.extend_from_slice(&frame.payload);

    write_body(writer, &body, timeout).await
}

pub async fn read_frame<R>(reader: &mut R, timeout: Duration) -> Result<Frame, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut body = read_body(reader, timeout).await?;
    if body.is_empty() {
        return Err(ProtocolError::EmptyFrame);
    }

    let payload = body.split_off(1);
    Ok(Frame {
        tag: body[0],
        payload,
    })
}

pub async fn write_message<W>(
    writer: &mut W,
    message: &Message,
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, &Frame::encode(message)?, timeout).await
}

pub async fn read_message<R>(reader: &mut R, timeout: Duration) -> Result<Message, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    read_frame(reader, timeout).await?.decode()
}

pub async fn write_response<W>(
    writer: &mut W,
    response: &JobResponse,
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    write_body(writer, &encode(response)?, timeout).await
}

pub async fn read_response<R>(
    reader: &mut R,
    timeout: Duration,
) -> Result<JobResponse, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    decode(&read_body(reader, timeout).await?)
}
