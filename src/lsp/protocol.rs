/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! JSON-RPC message types and `Content-Length` framing.

use anyhow::{Context, Result, anyhow};
use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Largest message body accepted from the server.
const MAX_CONTENT_LENGTH: usize = 64 * 1024 * 1024;

/// JSON-RPC error code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;

fn default_null() -> serde_json::Value {
    serde_json::Value::Null
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RequestMessage {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default = "default_null")]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResponseMessage {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotificationMessage {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default = "default_null")]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ResponseMessage {
    /// Builds an error reply to a request the client cannot serve.
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: None,
            error: Some(ResponseError {
                code: METHOD_NOT_FOUND,
                message: format!("Method '{method}' not supported by client"),
                data: None,
            }),
        }
    }
}

/// Serializes a message with its `Content-Length` header.
pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(message)?;
    let mut framed = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Removes one complete message body from the front of `buffer`.
///
/// Returns `Ok(None)` while the header or body is still incomplete.
pub fn try_parse_message(buffer: &mut BytesMut) -> Result<Option<String>> {
    let Some(header_len) = buffer
        .windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
    else {
        return Ok(None);
    };

    let headers =
        std::str::from_utf8(&buffer[..header_len]).context("Failed to parse headers as UTF-8")?;
    let content_length = headers
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| value.trim().parse::<usize>())
        .transpose()
        .context("Invalid Content-Length")?
        .ok_or_else(|| anyhow!("Missing Content-Length header"))?;

    if content_length > MAX_CONTENT_LENGTH {
        return Err(anyhow!(
            "Content-Length {content_length} exceeds the {MAX_CONTENT_LENGTH} byte limit"
        ));
    }

    let body_start = header_len + HEADER_TERMINATOR.len();
    let body_end = body_start
        .checked_add(content_length)
        .ok_or_else(|| anyhow!("Content-Length {content_length} overflows"))?;
    if buffer.len() < body_end {
        return Ok(None);
    }

    buffer.advance(body_start);
    let body = buffer.split_to(content_length);
    Ok(Some(String::from_utf8(body.to_vec())?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(body: &str) -> String {
        format!("Content-Length: {}\r\n\r\n{body}", body.len())
    }

    #[test]
    fn test_parse_waits_for_full_body() -> Result<()> {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{}}"#;
        let raw = frame(body);
        let (head, tail) = raw.split_at(raw.len() - 5);

        let mut buffer = BytesMut::from(head);
        assert_eq!(try_parse_message(&mut buffer)?, None);

        buffer.extend_from_slice(tail.as_bytes());
        assert_eq!(try_parse_message(&mut buffer)?, Some(body.to_string()));
        assert!(buffer.is_empty());
        Ok(())
    }

    #[test]
    fn test_parse_back_to_back_messages() -> Result<()> {
        let raw = format!("{}{}", frame(r#"{"id":1}"#), frame(r#"{"id":2}"#));
        let mut buffer = BytesMut::from(raw.as_str());

        assert_eq!(try_parse_message(&mut buffer)?.as_deref(), Some(r#"{"id":1}"#));
        assert_eq!(try_parse_message(&mut buffer)?.as_deref(), Some(r#"{"id":2}"#));
        assert_eq!(try_parse_message(&mut buffer)?, None);
        Ok(())
    }

    #[test]
    fn test_parse_extra_headers_and_case() -> Result<()> {
        let body = r#"{"test":true}"#;
        let raw = format!(
            "content-type: application/vscode-jsonrpc\r\ncontent-length: {}\r\n\r\n{body}",
            body.len()
        );
        let mut buffer = BytesMut::from(raw.as_str());
        assert_eq!(try_parse_message(&mut buffer)?, Some(body.to_string()));
        Ok(())
    }

    #[test]
    fn test_parse_missing_length_is_an_error() {
        let mut buffer = BytesMut::from("Content-Type: x\r\n\r\n{}");
        assert!(try_parse_message(&mut buffer).is_err());
    }

    #[test]
    fn test_parse_rejects_oversized_length() {
        let mut buffer = BytesMut::from("Content-Length: 18446744073709551615\r\n\r\n{}");
        assert!(try_parse_message(&mut buffer).is_err());

        let huge = format!("Content-Length: {}\r\n\r\n{{}}", MAX_CONTENT_LENGTH + 1);
        let mut buffer = BytesMut::from(huge.as_str());
        assert!(try_parse_message(&mut buffer).is_err());
    }

    #[test]
    fn test_encode_is_parseable() -> Result<()> {
        let reply = ResponseMessage::method_not_found(RequestId::Number(7), "workspace/configuration");
        let mut buffer = BytesMut::from(encode_message(&reply)?.as_slice());
        let body = try_parse_message(&mut buffer)?.context("no message")?;
        let parsed: ResponseMessage = serde_json::from_str(&body)?;
        assert_eq!(parsed.id, Some(RequestId::Number(7)));
        assert_eq!(parsed.error.map(|e| e.code), Some(METHOD_NOT_FOUND));
        Ok(())
    }
}
