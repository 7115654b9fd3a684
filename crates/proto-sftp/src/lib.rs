//! SFTP session engine: wire framing, out-of-order request/reply
//! correlation, and the `ssh`-subprocess transport the protocol runs over.

mod engine;
mod packet;
mod pending;
mod subprocess;

pub use engine::{SftpEngine, SftpSettings};
pub use packet::{FileAttrs, PacketType};
pub use subprocess::{default_connect_program, Subprocess};
