//! URL grammar consumed by session construction.

mod percent;
mod url;

pub use percent::{url_decode, url_encode, CONNECT_UNSAFE};
pub use url::{Proto, Url, UrlError};
