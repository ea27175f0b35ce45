//! Websocket push channel carrying mutation notifications.

mod backoff;
mod channel;
mod codec;

pub use backoff::ReconnectPolicy;
pub use channel::{ChannelError, ChannelState, LiveChannel, LiveChannelConfig, LiveChannelHandle};
pub use codec::{DecodeError, decode_event};
