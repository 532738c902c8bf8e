use crate::wire::FrameKind;
use std::fmt;

/// How many messages flow in each direction of a call.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CallShape {
    Unary,
    ClientStreaming,
    ServerStreaming,
    DuplexStreaming,
}

impl CallShape {
    /// The only frame kind that may open a call of this shape.
    pub fn opening_frame(self) -> FrameKind {
        match self {
            CallShape::Unary => FrameKind::UnaryClient,
            CallShape::ClientStreaming => FrameKind::StreamClient,
            CallShape::ServerStreaming => FrameKind::StreamServer,
            CallShape::DuplexStreaming => FrameKind::StreamDuplex,
        }
    }

    /// The kind of the one frame that ends a call of this shape. Unary
    /// calls are answered with the kind that opened them.
    pub fn terminal_frame(self) -> FrameKind {
        match self {
            CallShape::Unary => FrameKind::UnaryClient,
            _ => FrameKind::StreamEnd,
        }
    }

    /// Whether the client sends a stream of messages on this call.
    pub fn accepts_client_stream(self) -> bool {
        matches!(self, CallShape::ClientStreaming | CallShape::DuplexStreaming)
    }

    pub fn returns_server_stream(self) -> bool {
        matches!(self, CallShape::ServerStreaming | CallShape::DuplexStreaming)
    }

    /// Used in mismatch errors: "Method Foo.Bar is a unary".
    pub fn describe(self) -> &'static str {
        match self {
            CallShape::Unary => "a unary",
            CallShape::ClientStreaming => "a client streaming",
            CallShape::ServerStreaming => "a server streaming",
            CallShape::DuplexStreaming => "a duplex streaming",
        }
    }
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallShape::Unary => "unary",
            CallShape::ClientStreaming => "client-streaming",
            CallShape::ServerStreaming => "server-streaming",
            CallShape::DuplexStreaming => "duplex-streaming",
        };
        f.write_str(name)
    }
}
