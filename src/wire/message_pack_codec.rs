use super::{CallId, FrameKind, Metadata, Payload, Request, Response, StatusCode, WireCodec};
use crate::error::CodecError;
use rmpv::Value;

/// Positional MessagePack encoding.
///
/// Inbound frames are arrays `[id, method, kind, payload?, meta?]`; outbound
/// frames are arrays `[id, method, kind, payload, status, meta, error]` with
/// `nil` for absent fields. Trailing inbound fields may be omitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessagePackCodec;

impl MessagePackCodec {
    pub fn new() -> Self {
        Self
    }

    /// Client-side counterpart of [`WireCodec::decode_request`].
    pub fn encode_request(&self, request: Request) -> Result<Vec<u8>, CodecError> {
        let frame = Value::Array(vec![
            Value::from(request.id),
            Value::from(request.method),
            Value::from(u8::from(request.kind)),
            request.payload.unwrap_or(Value::Nil),
            encode_metadata(request.meta),
        ]);
        write_frame(&frame)
    }

    /// Client-side counterpart of [`WireCodec::encode_response`].
    pub fn decode_response(&self, bytes: &[u8]) -> Result<Response, CodecError> {
        let mut fields = read_frame(bytes)?.into_iter();
        let (id, method, kind) = decode_header(&mut fields)?;
        let payload = fields.next().filter(|value| !value.is_nil());
        let status = match fields.next() {
            None | Some(Value::Nil) => None,
            Some(value) => {
                let raw = value
                    .as_u64()
                    .ok_or_else(|| CodecError::InvalidFrame("status is not an integer".into()))?;
                let status = u8::try_from(raw)
                    .ok()
                    .and_then(|byte| StatusCode::try_from(byte).ok())
                    .ok_or_else(|| CodecError::InvalidFrame(format!("unknown status {raw}")))?;
                Some(status)
            }
        };
        let meta = decode_metadata(fields.next())?;
        let error = match fields.next() {
            None | Some(Value::Nil) => None,
            Some(Value::String(text)) => Some(text.into_str().ok_or_else(|| {
                CodecError::InvalidFrame("error text is not valid UTF-8".into())
            })?),
            Some(_) => return Err(CodecError::InvalidFrame("error is not a string".into())),
        };

        Ok(Response {
            id,
            method,
            kind,
            payload,
            status,
            meta,
            error,
        })
    }
}

impl WireCodec for MessagePackCodec {
    fn decode_request(&self, bytes: &[u8]) -> Result<Request, CodecError> {
        let mut fields = read_frame(bytes)?.into_iter();
        let (id, method, kind) = decode_header(&mut fields)?;
        let payload = fields.next().filter(|value| !value.is_nil());
        let meta = decode_metadata(fields.next())?;

        Ok(Request {
            id,
            method,
            kind,
            payload,
            meta,
        })
    }

    fn encode_response(&self, response: Response) -> Result<Vec<u8>, CodecError> {
        let frame = Value::Array(vec![
            Value::from(response.id),
            Value::from(response.method),
            Value::from(u8::from(response.kind)),
            response.payload.unwrap_or(Value::Nil),
            response
                .status
                .map(|status| Value::from(u8::from(status)))
                .unwrap_or(Value::Nil),
            encode_metadata(response.meta),
            response.error.map(Value::from).unwrap_or(Value::Nil),
        ]);
        write_frame(&frame)
    }
}

fn read_frame(bytes: &[u8]) -> Result<Vec<Value>, CodecError> {
    let mut cursor = bytes;
    let value = rmpv::decode::read_value(&mut cursor)
        .map_err(|err| CodecError::Decode(err.to_string()))?;
    if !cursor.is_empty() {
        return Err(CodecError::TrailingBytes);
    }
    match value {
        Value::Array(fields) => Ok(fields),
        _ => Err(CodecError::InvalidFrame("frame is not an array".into())),
    }
}

fn write_frame(frame: &Value) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::new();
    rmpv::encode::write_value(&mut bytes, frame)
        .map_err(|err| CodecError::Encode(err.to_string()))?;
    Ok(bytes)
}

fn decode_header(
    fields: &mut impl Iterator<Item = Value>,
) -> Result<(CallId, String, FrameKind), CodecError> {
    let id = fields
        .next()
        .and_then(|value| value.as_u64())
        .ok_or_else(|| CodecError::InvalidFrame("missing or invalid call id".into()))?;

    let method = match fields.next() {
        Some(Value::String(name)) => name
            .into_str()
            .ok_or_else(|| CodecError::InvalidFrame("method name is not valid UTF-8".into()))?,
        _ => return Err(CodecError::InvalidFrame("missing or invalid method name".into())),
    };

    let raw_kind = fields
        .next()
        .and_then(|value| value.as_u64())
        .ok_or_else(|| CodecError::InvalidFrame("missing or invalid frame kind".into()))?;
    let kind = u8::try_from(raw_kind)
        .ok()
        .and_then(|byte| FrameKind::try_from(byte).ok())
        .ok_or(CodecError::UnknownFrameKind(raw_kind))?;

    Ok((id, method, kind))
}

fn decode_metadata(value: Option<Value>) -> Result<Option<Metadata>, CodecError> {
    match value {
        None | Some(Value::Nil) => Ok(None),
        Some(Value::Map(entries)) => {
            let mut meta = Metadata::with_capacity(entries.len());
            for (key, value) in entries {
                match (key.as_str(), value.as_str()) {
                    (Some(key), Some(value)) => {
                        meta.insert(key.to_owned(), value.to_owned());
                    }
                    _ => {
                        return Err(CodecError::InvalidFrame(
                            "metadata entries must be strings".into(),
                        ));
                    }
                }
            }
            Ok(Some(meta))
        }
        Some(_) => Err(CodecError::InvalidFrame("metadata is not a map".into())),
    }
}

fn encode_metadata(meta: Option<Metadata>) -> Payload {
    match meta {
        None => Value::Nil,
        Some(meta) => Value::Map(
            meta.into_iter()
                .map(|(key, value)| (Value::from(key), Value::from(value)))
                .collect(),
        ),
    }
}
