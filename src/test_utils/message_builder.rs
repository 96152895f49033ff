use bytes::Bytes;

use crate::StreamMessage;
use crate::KV_OPERATION_HEADER;

pub const TEST_TIMESTAMP_NANOS: u64 = 1_700_000_000_000_000_000;

/// v1 ack reply subject for a message at `sequence` with `pending` left
pub fn ack_reply(
    stream: &str,
    sequence: u64,
    pending: u64,
) -> String {
    format!(
        "$JS.ACK.{stream}.watch.1.{sequence}.{sequence}.{}.{pending}",
        TEST_TIMESTAMP_NANOS + sequence
    )
}

/// Builds bucket messages with consecutive stream sequences
pub struct MessageBuilder {
    bucket: String,
    stream: String,
    sequence: u64,
}

impl MessageBuilder {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            stream: format!("KV_{bucket}"),
            sequence: 1,
        }
    }

    pub fn starting_at(
        mut self,
        sequence: u64,
    ) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn put(
        &mut self,
        key: &str,
        value: &[u8],
        pending: u64,
    ) -> StreamMessage {
        self.message(key, None, Bytes::copy_from_slice(value), pending)
    }

    pub fn delete(
        &mut self,
        key: &str,
        pending: u64,
    ) -> StreamMessage {
        self.message(key, Some("DEL"), Bytes::new(), pending)
    }

    pub fn purge(
        &mut self,
        key: &str,
        pending: u64,
    ) -> StreamMessage {
        self.message(key, Some("PURGE"), Bytes::new(), pending)
    }

    fn message(
        &mut self,
        key: &str,
        operation: Option<&str>,
        payload: Bytes,
        pending: u64,
    ) -> StreamMessage {
        let sequence = self.sequence;
        self.sequence += 1;

        StreamMessage {
            subject: format!("$KV.{}.{}", self.bucket, key),
            reply: Some(ack_reply(&self.stream, sequence, pending)),
            headers: operation
                .map(|op| vec![(KV_OPERATION_HEADER.to_string(), op.to_string())])
                .unwrap_or_default(),
            payload,
        }
    }
}
