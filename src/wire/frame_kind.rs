use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Role of a frame in its call's state machine.
///
/// The integer values are fixed by the wire protocol.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum FrameKind {
    Connect = 1,
    Disconnect = 2,
    /// Opens a unary call, and is also the kind of its terminal frame.
    UnaryClient = 3,
    /// Reserved; never sent by this server.
    UnaryServer = 4,
    /// Opens a client-streaming call, carries client stream data, or (sent by
    /// the server) grants the client credit for its next item.
    StreamClient = 5,
    /// Opens a server-streaming call, or carries one server stream message.
    StreamServer = 6,
    /// Opens a duplex-streaming call.
    StreamDuplex = 7,
    /// End of the client's input stream, or terminal frame of a streaming call.
    StreamEnd = 8,
    /// Client abort of a call; server-side rejection of a frame that could
    /// not be routed to a call.
    Abort = 9,
}

impl FrameKind {
    /// Whether a frame of this kind ends its call when sent by the server.
    ///
    /// Unary calls are answered with the kind that opened them.
    pub fn is_terminal(self) -> bool {
        matches!(self, FrameKind::UnaryClient | FrameKind::StreamEnd)
    }
}
