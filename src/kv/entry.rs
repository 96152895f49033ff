//! Key-value entries decoded from durable-stream messages.
//!
//! A bucket write is a stream message on `$KV.<bucket>.<key>`. The operation
//! travels in the `KV-Operation` header and the stream position in the ack
//! reply subject:
//!
//! ```text
//! $JS.ACK.<stream>.<consumer>.<delivered>.<stream_seq>.<consumer_seq>.<timestamp>.<pending>
//! $JS.ACK.<domain>.<account>.<stream>.<consumer>.<delivered>.<stream_seq>.<consumer_seq>.<timestamp>.<pending>.<token>
//! ```

use bytes::Bytes;

use super::KvNaming;
use crate::DecodeError;

pub const KV_OPERATION_HEADER: &str = "KV-Operation";
const KV_OPERATION_DELETE: &str = "DEL";
const KV_OPERATION_PURGE: &str = "PURGE";

const ACK_PREFIX: [&str; 2] = ["$JS", "ACK"];
const ACK_V1_TOKENS: usize = 9;
const ACK_V2_MIN_TOKENS: usize = 12;

/// Kind of change an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvOperation {
    Put,
    Delete,
    Purge,
}

impl KvOperation {
    fn from_header(value: Option<&str>) -> Result<Self, DecodeError> {
        match value {
            None | Some("") => Ok(KvOperation::Put),
            Some(KV_OPERATION_DELETE) => Ok(KvOperation::Delete),
            Some(KV_OPERATION_PURGE) => Ok(KvOperation::Purge),
            Some(other) => Err(DecodeError::UnknownOperation(other.to_string())),
        }
    }

    /// Delete and purge both remove the key
    pub fn is_removal(self) -> bool {
        !matches!(self, KvOperation::Put)
    }
}

/// Raw message as delivered by the stream consumer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamMessage {
    pub subject: String,
    /// Ack reply subject carrying the stream metadata
    pub reply: Option<String>,
    pub headers: Vec<(String, String)>,
    pub payload: Bytes,
}

impl StreamMessage {
    /// First value of header `name`, matched case-insensitively
    pub fn header(
        &self,
        name: &str,
    ) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Stream position parsed from an ack reply subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMetadata {
    pub stream: String,
    pub consumer: String,
    pub delivered: u64,
    pub stream_sequence: u64,
    pub consumer_sequence: u64,
    pub timestamp_nanos: u64,
    /// Messages still pending for the consumer after this one
    pub pending: u64,
}

impl MessageMetadata {
    pub fn parse(reply: &str) -> Result<Self, DecodeError> {
        let tokens: Vec<&str> = reply.split('.').collect();
        if tokens.len() < ACK_V1_TOKENS || tokens[..2] != ACK_PREFIX {
            return Err(DecodeError::MalformedMetadata(reply.to_string()));
        }

        // v2 subjects insert domain and account hash after the prefix
        let offset = match tokens.len() {
            ACK_V1_TOKENS => 2,
            n if n >= ACK_V2_MIN_TOKENS => 4,
            _ => return Err(DecodeError::MalformedMetadata(reply.to_string())),
        };

        let number = |i: usize| -> Result<u64, DecodeError> {
            tokens[offset + i]
                .parse::<u64>()
                .map_err(|_| DecodeError::MalformedMetadata(reply.to_string()))
        };

        Ok(Self {
            stream: tokens[offset].to_string(),
            consumer: tokens[offset + 1].to_string(),
            delivered: number(2)?,
            stream_sequence: number(3)?,
            consumer_sequence: number(4)?,
            timestamp_nanos: number(5)?,
            pending: number(6)?,
        })
    }
}

/// One decoded change record of a bucket
#[derive(Debug, Clone, PartialEq)]
pub struct KvEntry {
    pub bucket: String,
    pub key: String,
    pub value: Bytes,
    /// Stream sequence of the write
    pub revision: u64,
    /// Messages remaining before the consumer reaches its start boundary;
    /// 0 marks the last replayed message
    pub delta: u64,
    pub created_nanos: u64,
    pub operation: KvOperation,
}

impl KvEntry {
    pub fn decode(
        naming: &KvNaming,
        message: StreamMessage,
    ) -> Result<Self, DecodeError> {
        let key = naming.key_from_subject(&message.subject)?.to_string();
        let operation = KvOperation::from_header(message.header(KV_OPERATION_HEADER))?;
        let reply = message.reply.as_deref().ok_or(DecodeError::MissingMetadata)?;
        let metadata = MessageMetadata::parse(reply)?;

        Ok(Self {
            bucket: naming.bucket().to_string(),
            key,
            value: message.payload,
            revision: metadata.stream_sequence,
            delta: metadata.pending,
            created_nanos: metadata.timestamp_nanos,
            operation,
        })
    }
}
