//! HTTP/HTTPS/WebDAV session engine: request framing, status/chunked
//! parsing, a cookie jar, redirect policy, and a small PROPFIND reader,
//! wired into one [`session::Session`] implementation.

mod chunked;
mod cookie;
mod dial;
mod engine;
mod proxy;
mod redirect;
mod request;
mod response;
mod webdav;

pub use cookie::{Cookie, CookieJar};
pub use engine::HttpEngine;
pub use webdav::DavEntry;
