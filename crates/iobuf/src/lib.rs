//! # Overview
//!
//! A directed byte buffer plus a small set of composable transport layers.
//! A session stacks only the layers it needs: a raw fd at the bottom,
//! optionally a [`telnet::TelnetLayer`] for FTP control connections, and
//! optionally a [`charset::CharsetLayer`] for filename translation — the
//! two stack independently of each other, and TLS wraps underneath both
//! (see the `tls` crate, which implements [`transport::Transport`]
//! directly so it can be inserted at any point in the stack).
//!
//! # Design
//!
//! Every layer takes ownership of the one below it and implements
//! [`transport::Transport`] itself, the same adapter pattern as
//! `std::io::BufReader`. [`buffer::DirectedBuffer`] is the single-direction
//! byte queue a session pumps a transport's `read`/`write` into and out of.

mod buffer;
#[cfg(feature = "iconv")]
mod charset;
mod telnet;
mod transport;

pub use buffer::{BufferError, DirectedBuffer};
#[cfg(feature = "iconv")]
pub use charset::CharsetLayer;
pub use telnet::TelnetLayer;
pub use transport::Transport;

#[cfg(unix)]
pub use transport::FdTransport;
