use std::sync::Arc;

/// Destination for converted 16 kHz mono PCM bytes.
///
/// Writes arrive in capture order from a single conversion worker. There is
/// no acknowledgement: implementations own any buffering or back-pressure and
/// must not block for long, or capture falls behind and starts dropping frames.
pub trait StreamingSink: Send + Sync {
    fn write(&self, bytes: Vec<u8>);
}

/// Type alias for a shared sink reference.
pub type SinkRef = Arc<dyn StreamingSink>;

impl<S: StreamingSink + ?Sized> StreamingSink for Arc<S> {
    fn write(&self, bytes: Vec<u8>) {
        (**self).write(bytes);
    }
}
