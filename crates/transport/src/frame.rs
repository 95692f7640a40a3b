// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary gate frames
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! [version u8][kind u8][client_seq u64][server_seq u64][error_code i64]
//! [service str16][method str16][error_message str16][body u32 + bytes]
//! ```
//!
//! `str16` is a u16 length followed by UTF-8 bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

pub const FRAME_VERSION: u8 = 1;

const FIXED_HEADER: usize = 1 + 1 + 8 + 8 + 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame truncated: needed {needed} bytes for {field}")]
    Truncated { field: &'static str, needed: usize },
    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown message kind {0}")]
    UnknownKind(u8),
    #[error("{field} is {len} bytes, limit is {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),
    #[error("{0} trailing bytes after frame body")]
    TrailingBytes(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    Request = 1,
    Response = 2,
    Notify = 3,
}

impl TryFrom<u8> for MessageKind {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        match value {
            1 => Ok(MessageKind::Request),
            2 => Ok(MessageKind::Response),
            3 => Ok(MessageKind::Notify),
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMeta {
    pub service: String,
    pub method: String,
    pub kind: MessageKind,
    pub client_seq: u64,
    pub server_seq: u64,
    pub error_code: i64,
    pub error_message: String,
}

impl FrameMeta {
    /// `service.method`, used in logs and errors
    pub fn method_key(&self) -> String {
        format!("{}.{}", self.service, self.method)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub meta: FrameMeta,
    pub body: Bytes,
}

impl Frame {
    pub fn request(
        service: impl Into<String>,
        method: impl Into<String>,
        client_seq: u64,
        server_seq: u64,
        body: Bytes,
    ) -> Self {
        Self {
            meta: FrameMeta {
                service: service.into(),
                method: method.into(),
                kind: MessageKind::Request,
                client_seq,
                server_seq,
                error_code: 0,
                error_message: String::new(),
            },
            body,
        }
    }

    /// Successful reply to `request`, as a server would send it
    pub fn response_to(request: &FrameMeta, server_seq: u64, body: Bytes) -> Self {
        Self {
            meta: FrameMeta {
                kind: MessageKind::Response,
                server_seq,
                error_code: 0,
                error_message: String::new(),
                ..request.clone()
            },
            body,
        }
    }

    /// Error reply to `request`
    pub fn error_to(request: &FrameMeta, server_seq: u64, code: i64, message: &str) -> Self {
        Self {
            meta: FrameMeta {
                kind: MessageKind::Response,
                server_seq,
                error_code: code,
                error_message: message.to_string(),
                ..request.clone()
            },
            body: Bytes::new(),
        }
    }

    pub fn notify(server_seq: u64, body: Bytes) -> Self {
        Self {
            meta: FrameMeta {
                service: String::new(),
                method: String::new(),
                kind: MessageKind::Notify,
                client_seq: 0,
                server_seq,
                error_code: 0,
                error_message: String::new(),
            },
            body,
        }
    }

    pub fn encode(&self) -> Result<Bytes, FrameError> {
        let meta = &self.meta;
        let mut buf = BytesMut::with_capacity(
            FIXED_HEADER
                + 6
                + meta.service.len()
                + meta.method.len()
                + meta.error_message.len()
                + 4
                + self.body.len(),
        );
        buf.put_u8(FRAME_VERSION);
        buf.put_u8(meta.kind as u8);
        buf.put_u64(meta.client_seq);
        buf.put_u64(meta.server_seq);
        buf.put_i64(meta.error_code);
        put_str16(&mut buf, "service", &meta.service)?;
        put_str16(&mut buf, "method", &meta.method)?;
        put_str16(&mut buf, "error_message", &meta.error_message)?;
        let body_len = u32::try_from(self.body.len()).map_err(|_| FrameError::TooLong {
            field: "body",
            len: self.body.len(),
            max: u32::MAX as usize,
        })?;
        buf.put_u32(body_len);
        buf.put_slice(&self.body);
        Ok(buf.freeze())
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, FrameError> {
        need(&buf, FIXED_HEADER, "header")?;
        let version = buf.get_u8();
        if version != FRAME_VERSION {
            return Err(FrameError::UnsupportedVersion(version));
        }
        let kind = MessageKind::try_from(buf.get_u8())?;
        let client_seq = buf.get_u64();
        let server_seq = buf.get_u64();
        let error_code = buf.get_i64();
        let service = get_str16(&mut buf, "service")?;
        let method = get_str16(&mut buf, "method")?;
        let error_message = get_str16(&mut buf, "error_message")?;
        need(&buf, 4, "body length")?;
        let body_len = buf.get_u32() as usize;
        need(&buf, body_len, "body")?;
        let body = Bytes::copy_from_slice(&buf[..body_len]);
        buf.advance(body_len);
        if buf.has_remaining() {
            return Err(FrameError::TrailingBytes(buf.remaining()));
        }
        Ok(Self {
            meta: FrameMeta {
                service,
                method,
                kind,
                client_seq,
                server_seq,
                error_code,
                error_message,
            },
            body,
        })
    }
}

fn need(buf: &&[u8], needed: usize, field: &'static str) -> Result<(), FrameError> {
    if buf.remaining() < needed {
        return Err(FrameError::Truncated { field, needed });
    }
    Ok(())
}

pub(crate) fn put_str16(
    buf: &mut BytesMut,
    field: &'static str,
    value: &str,
) -> Result<(), FrameError> {
    let len = u16::try_from(value.len()).map_err(|_| FrameError::TooLong {
        field,
        len: value.len(),
        max: u16::MAX as usize,
    })?;
    buf.put_u16(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

pub(crate) fn get_str16(buf: &mut &[u8], field: &'static str) -> Result<String, FrameError> {
    need(buf, 2, field)?;
    let len = buf.get_u16() as usize;
    need(buf, len, field)?;
    let value = std::str::from_utf8(&buf[..len])
        .map_err(|_| FrameError::InvalidUtf8(field))?
        .to_string();
    buf.advance(len);
    Ok(value)
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
