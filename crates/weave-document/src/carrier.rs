use weave_codec::WireMessage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CarrierState {
    Connecting,
    Connected,
    Disconnected,
}

/// Document-side end of a transport.
///
/// Implementations may do their I/O on another thread; `process` is where
/// they hand inbound messages over to the document thread.
pub trait Carrier: Send {
    /// Move inbound traffic into the receive queue.
    fn process(&mut self);

    fn send(&mut self, msg: WireMessage);

    /// Next processed inbound message, if any.
    fn receive(&mut self) -> Option<WireMessage>;

    fn state(&self) -> CarrierState;

    /// Whether the initial backend has arrived.
    fn is_loaded(&self) -> bool;

    /// Close the connection. Safe to call more than once.
    fn disconnect(&mut self);
}
