//! Non-blocking client TLS, wrapped as an [`iobuf::Transport`] layer so
//! every protocol engine that needs `ftps`/`https`/`AUTH TLS` can drop it
//! into its transport stack the same way it drops in the telnet or
//! charset layer. SFTP and FISH don't use this crate — their security
//! layer is the SSH channel itself.

mod config;
mod error;
mod layer;

pub use config::{default_client_config, insecure_client_config, server_name};
pub use error::TlsError;
pub use layer::TlsLayer;
