use super::{Request, Response};
use crate::error::CodecError;

/// The boundary between frames and bytes on the socket.
///
/// A decode failure is a protocol violation of the whole connection, not an
/// error of a single call.
pub trait WireCodec: Send + Sync + 'static {
    fn decode_request(&self, bytes: &[u8]) -> Result<Request, CodecError>;

    fn encode_response(&self, response: Response) -> Result<Vec<u8>, CodecError>;
}
