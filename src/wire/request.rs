use super::FrameKind;
use std::collections::HashMap;

/// Client-chosen call identifier, unique per connection for the lifetime of
/// one call.
pub type CallId = u64;

pub type Metadata = HashMap<String, String>;

/// A schema-less payload value.
pub type Payload = rmpv::Value;

/// One inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: CallId,
    pub method: String,
    pub kind: FrameKind,
    pub payload: Option<Payload>,
    pub meta: Option<Metadata>,
}

impl Request {
    pub fn new(id: CallId, method: impl Into<String>, kind: FrameKind) -> Self {
        Self {
            id,
            method: method.into(),
            kind,
            payload: None,
            meta: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_meta(mut self, meta: Metadata) -> Self {
        self.meta = Some(meta);
        self
    }
}
