use super::{CallId, FrameKind, Metadata, Payload, StatusCode};

/// One outbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: CallId,
    pub method: String,
    pub kind: FrameKind,
    pub payload: Option<Payload>,
    pub status: Option<StatusCode>,
    pub meta: Option<Metadata>,
    pub error: Option<String>,
}

impl Response {
    pub fn new(id: CallId, method: impl Into<String>, kind: FrameKind) -> Self {
        Self {
            id,
            method: method.into(),
            kind,
            payload: None,
            status: None,
            meta: None,
            error: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
