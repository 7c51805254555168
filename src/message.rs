//! The MessagePack-RPC message schema: `[kind, ...]` arrays tagging a
//! request, response, or notification, and the encode/decode logic that
//! validates a raw MessagePack value against that schema.

use bytes::Bytes;
use rmpv::Value;

use crate::error::{Error, Result};

/// Wire tag for the first array element, per the MessagePack-RPC spec.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Request = 0,
    Response = 1,
    Notification = 2,
}

impl TryFrom<u64> for MessageType {
    type Error = ();

    fn try_from(v: u64) -> std::result::Result<Self, ()> {
        match v {
            0 => Ok(MessageType::Request),
            1 => Ok(MessageType::Response),
            2 => Ok(MessageType::Notification),
            _ => Err(()),
        }
    }
}

/// A fully validated MessagePack-RPC message.
///
/// Each variant retains the raw encoded bytes it was parsed from, so a
/// diagnostic can quote the offending wire data and so a dispatcher that only
/// needs to forward a response untouched never has to re-encode it.
#[derive(Debug, Clone)]
pub enum Message {
    Request {
        msgid: u32,
        method: String,
        params: Vec<Value>,
        raw: Bytes,
    },
    Response {
        msgid: u32,
        error: Value,
        result: Value,
        raw: Bytes,
    },
    Notification {
        method: String,
        params: Vec<Value>,
        raw: Bytes,
    },
}

impl Message {
    /// Parse and validate a message from its raw encoded bytes.
    ///
    /// Validates: the value is an array of at least 3 elements, the first
    /// element is a recognized message type, and the arity/field types
    /// required by that type. Any failure is reported as `InvalidMessage`
    /// (for a structurally decodable value with the wrong shape) or
    /// `ParseError` (for bytes that are not MessagePack at all), carrying the
    /// raw bytes for diagnostics.
    pub fn decode(raw: Bytes) -> Result<Message> {
        let value = rmpv::decode::read_value(&mut &raw[..])
            .map_err(|e| Error::parse_error_with_data(e.to_string(), raw.clone()))?;

        let array = match value {
            Value::Array(ref items) => items,
            _ => {
                return Err(Error::invalid_message_with_data(
                    "message is not an array",
                    raw,
                ));
            }
        };

        if array.len() < 3 {
            return Err(Error::invalid_message_with_data(
                "message must have at least 3 elements",
                raw,
            ));
        }

        let kind = array[0]
            .as_u64()
            .and_then(|v| MessageType::try_from(v).ok())
            .ok_or_else(|| {
                Error::invalid_message_with_data("message type is not a recognized tag", raw.clone())
            })?;

        match kind {
            MessageType::Request => Self::decode_request(array, raw),
            MessageType::Response => Self::decode_response(array, raw),
            MessageType::Notification => Self::decode_notification(array, raw),
        }
    }

    fn decode_request(array: &[Value], raw: Bytes) -> Result<Message> {
        if array.len() != 4 {
            return Err(Error::invalid_message_with_data(
                "request message must have 4 elements",
                raw,
            ));
        }

        let msgid = array[1].as_u64().and_then(|v| u32::try_from(v).ok()).ok_or_else(|| {
            Error::invalid_message_with_data(
                "message ID must be a 32-bit unsigned integer",
                raw.clone(),
            )
        })?;

        let method = array[2]
            .as_str()
            .ok_or_else(|| {
                Error::invalid_message_with_data("method name must be a string", raw.clone())
            })?
            .to_string();

        let params = match &array[3] {
            Value::Array(items) => items.clone(),
            _ => {
                return Err(Error::invalid_message_with_data(
                    "parameters must be an array",
                    raw,
                ));
            }
        };

        Ok(Message::Request {
            msgid,
            method,
            params,
            raw,
        })
    }

    fn decode_response(array: &[Value], raw: Bytes) -> Result<Message> {
        if array.len() != 4 {
            return Err(Error::invalid_message_with_data(
                "response message must have 4 elements",
                raw,
            ));
        }

        let msgid = array[1].as_u64().and_then(|v| u32::try_from(v).ok()).ok_or_else(|| {
            Error::invalid_message_with_data(
                "message ID must be a 32-bit unsigned integer",
                raw.clone(),
            )
        })?;

        Ok(Message::Response {
            msgid,
            error: array[2].clone(),
            result: array[3].clone(),
            raw,
        })
    }

    fn decode_notification(array: &[Value], raw: Bytes) -> Result<Message> {
        if array.len() != 3 {
            return Err(Error::invalid_message_with_data(
                "notification message must have 3 elements",
                raw,
            ));
        }

        let method = array[1]
            .as_str()
            .ok_or_else(|| {
                Error::invalid_message_with_data("method name must be a string", raw.clone())
            })?
            .to_string();

        let params = match &array[2] {
            Value::Array(items) => items.clone(),
            _ => {
                return Err(Error::invalid_message_with_data(
                    "parameters must be an array",
                    raw,
                ));
            }
        };

        Ok(Message::Notification {
            method,
            params,
            raw,
        })
    }

    pub fn msgid(&self) -> Option<u32> {
        match self {
            Message::Request { msgid, .. } | Message::Response { msgid, .. } => Some(*msgid),
            Message::Notification { .. } => None,
        }
    }
}

/// Encode a request `[0, msgid, method, params]`.
pub fn pack_request(msgid: u32, method: &str, params: Vec<Value>) -> Bytes {
    let value = Value::Array(vec![
        Value::from(MessageType::Request as u64),
        Value::from(msgid),
        Value::from(method),
        Value::Array(params),
    ]);
    encode(&value)
}

/// Encode a response `[1, msgid, error, result]`. `error` is `Value::Nil` on
/// success.
pub fn pack_response(msgid: u32, error: Value, result: Value) -> Bytes {
    let value = Value::Array(vec![
        Value::from(MessageType::Response as u64),
        Value::from(msgid),
        error,
        result,
    ]);
    encode(&value)
}

/// Encode a notification `[2, method, params]`.
pub fn pack_notification(method: &str, params: Vec<Value>) -> Bytes {
    let value = Value::Array(vec![
        Value::from(MessageType::Notification as u64),
        Value::from(method),
        Value::Array(params),
    ]);
    encode(&value)
}

fn encode(value: &Value) -> Bytes {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, value).expect("encoding an rmpv::Value cannot fail");
    Bytes::from(buf)
}
