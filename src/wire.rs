mod frame_kind;
mod message_pack_codec;
mod request;
mod response;
mod status_code;
mod wire_codec;

pub use frame_kind::FrameKind;
pub use message_pack_codec::MessagePackCodec;
pub use request::{CallId, Metadata, Payload, Request};
pub use response::Response;
pub use status_code::StatusCode;
pub use wire_codec::WireCodec;
