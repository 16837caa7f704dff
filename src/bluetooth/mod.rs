pub mod bluez;
#[cfg(test)]
pub mod mock;
pub mod session;
pub mod transport;

pub use bluez::BluezTransport;
pub use session::{LogSession, SessionConfig};
pub use transport::Transport;
