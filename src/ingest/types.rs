use serde_json::value::RawValue;

/// One opaque log entry, kept as the exact JSON text it arrived as.
pub type LogRecord = Box<RawValue>;

pub type LogBatch = Vec<LogRecord>;

pub fn decode_batch(body: &[u8]) -> Result<LogBatch, serde_json::Error> {
    serde_json::from_slice(body)
}

pub fn encode_batch(batch: &[LogRecord]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(batch)
}
