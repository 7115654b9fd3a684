//! The HTTP/HTTPS/WebDAV session engine: connect, issue one request at a
//! time over a connection kept alive across operations where the server
//! allows it, and fold PROPFIND listings into the same `open`/`read`
//! surface every other protocol engine exposes.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::SystemTime;

use config::HttpConfig;
use iobuf::Transport;
use ratelimit::TokenBucket;
use resolver::{AddressFamily, Resolver};
use scheduler::{Interest, StepResult, Task};
use session::{ConnectionPhase, OpenMode, Outcome, ReadOutcome, SeekTarget, Session, SessionIdentity, SessionState, XferError};
use xfer_path::Path;

use crate::chunked::ChunkedDecoder;
use crate::cookie::CookieJar;
use crate::dial::{Dialer, TcpTransport};
use crate::redirect;
use crate::request;
use crate::response::{self, Response};
use crate::webdav;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Connecting,
    Idle,
    AwaitingHeaders,
    Body,
    Waiting,
}

enum BodyFraming {
    ContentLength(u64),
    Chunked(ChunkedDecoder),
    UntilClose,
}

pub struct HttpEngine {
    identity: SessionIdentity,
    config: HttpConfig,
    state: SessionState<Phase>,

    transport: Option<Box<dyn Transport>>,
    resolver: Option<Resolver>,
    dialer: Option<Dialer>,

    out_buf: Vec<u8>,
    in_buf: Vec<u8>,
    read_chunk: Vec<u8>,

    response: Option<Response>,
    framing: Option<BodyFraming>,
    body_ready: Vec<u8>,
    body_done: bool,

    cookie_jar: CookieJar,
    use_propfind: bool,
    secure: bool,

    cwd: Path,
    home: Option<Path>,
    pending_path: Option<Path>,
    current_method: redirect::Method,
    redirect_budget: u32,
    store_remaining: u64,
    rate_limiter: Option<Rc<RefCell<TokenBucket>>>,
    proxy_addr: Option<(String, u16)>,
}

const DEFAULT_HTTP_PORT: u16 = 80;
const DEFAULT_HTTPS_PORT: u16 = 443;
const MAX_REDIRECTS: u32 = 5;

impl HttpEngine {
    #[must_use]
    pub fn new(identity: SessionIdentity, config: HttpConfig) -> Self {
        let secure = matches!(identity.proto, urlgrammar::Proto::Https);
        let proxy_addr = config.proxy.as_deref().and_then(parse_proxy_addr);
        Self {
            identity,
            use_propfind: config.use_propfind,
            config,
            state: SessionState::new(Phase::Connecting),
            transport: None,
            resolver: None,
            dialer: None,
            out_buf: Vec::new(),
            in_buf: Vec::new(),
            read_chunk: vec![0u8; 32 * 1024],
            response: None,
            framing: None,
            body_ready: Vec::new(),
            body_done: false,
            cookie_jar: CookieJar::new(),
            secure,
            cwd: Path::parse("/"),
            home: None,
            pending_path: None,
            pending_rename_to: None,
            current_method: redirect::Method::Get,
            redirect_budget: MAX_REDIRECTS,
            store_remaining: 0,
            rate_limiter: None,
            proxy_addr,
        }
    }

    pub fn set_rate_limiter(&mut self, bucket: Rc<RefCell<TokenBucket>>) {
        self.rate_limiter = Some(bucket);
    }

    fn default_port(&self) -> u16 {
        if self.secure { DEFAULT_HTTPS_PORT } else { DEFAULT_HTTP_PORT }
    }

    /// Dials a configured proxy instead of the origin when one is set.
    /// `https:proxy` tunneling via `CONNECT` is not wired up yet (see
    /// [`crate::proxy`] for the request/response framing it would use) —
    /// only the plain-HTTP absolute-URI form is handled below, in
    /// [`Self::start_open`].
    fn begin_connect(&mut self) {
        self.state.phase = ConnectionPhase::Resolving;
        self.state.machine = Phase::Connecting;
        let (host, port) = match &self.proxy_addr {
            Some((host, port)) if !self.secure => (host.clone(), *port),
            _ => {
                let port = if self.identity.port == 0 { self.default_port() } else { self.identity.port };
                (self.identity.host.clone(), port)
            }
        };
        self.resolver = Some(Resolver::spawn(host, port, AddressFamily::Any));
    }

    fn drive_resolver(&mut self) -> StepResult {
        let Some(resolver) = self.resolver.as_mut() else { return StepResult::Stall };
        match resolver.take_result() {
            None => {
                if resolver.step() == StepResult::Moved {
                    return self.drive_resolver();
                }
                StepResult::Stall
            }
            Some(Err(error)) => {
                self.state.set_error(XferError::LookupError { host: self.identity.host.clone(), detail: error.to_string() });
                self.resolver = None;
                StepResult::Moved
            }
            Some(Ok(addrs)) => {
                self.resolver = None;
                let Some(target) = addrs.into_iter().next() else {
                    self.state.set_error(XferError::NoHost { host: self.identity.host.clone() });
                    return StepResult::Moved;
                };
                match Dialer::start(target) {
                    Ok(dialer) => {
                        self.dialer = Some(dialer);
                        self.state.phase = ConnectionPhase::Connecting;
                    }
                    Err(e) => self.state.set_error(XferError::SeeErrno { context: "connect".into(), source: e }),
                }
                StepResult::Moved
            }
        }
    }

    fn drive_dialer(&mut self) -> StepResult {
        let Some(dialer) = self.dialer.as_ref() else { return StepResult::Stall };
        match dialer.finish() {
            Ok(None) => StepResult::Stall,
            Ok(Some(stream)) => {
                self.dialer = None;
                match TcpTransport::new(stream) {
                    Ok(transport) => {
                        if self.secure {
                            self.upgrade_to_tls(transport);
                        } else {
                            self.transport = Some(Box::new(transport));
                            self.state.phase = ConnectionPhase::LoggedIn;
                            self.state.machine = Phase::Idle;
                        }
                    }
                    Err(e) => self.state.set_error(XferError::SeeErrno { context: "set control socket non-blocking".into(), source: e }),
                }
                StepResult::Moved
            }
            Err(e) => {
                self.dialer = None;
                self.state.set_error(XferError::SeeErrno { context: "connect".into(), source: e });
                StepResult::Moved
            }
        }
    }

    /// `TlsLayer::read`/`write` pump the handshake internally and surface
    /// `WouldBlock` until it completes, so no separate handshake phase is
    /// needed here: once wrapped, the connection is treated as usable and
    /// the first real read simply blocks a little longer.
    fn upgrade_to_tls(&mut self, transport: TcpTransport) {
        let config = tls::default_client_config();
        match tls::server_name(&self.identity.host) {
            Ok(name) => match tls::TlsLayer::connect(transport, config, name) {
                Ok(layer) => {
                    self.transport = Some(Box::new(layer));
                    self.state.machine = Phase::Idle;
                    self.state.phase = ConnectionPhase::LoggedIn;
                }
                Err(e) => self.state.set_error(XferError::Fatal(format!("TLS handshake setup failed: {e}"))),
            },
            Err(e) => self.state.set_error(XferError::Fatal(e.to_string())),
        }
    }

    /// Writes `out_buf`, reads into `in_buf`, and processes whatever
    /// became available. TLS handshake progress happens transparently:
    /// every `read`/`write` on a [`tls::TlsLayer`] pumps the handshake
    /// until application data starts flowing.
    fn pump_io(&mut self) -> StepResult {
        let Some(transport) = self.transport.as_mut() else { return StepResult::Stall };
        let mut moved = false;

        if !self.out_buf.is_empty() {
            match transport.write(&self.out_buf) {
                Ok(0) => {}
                Ok(n) => {
                    self.out_buf.drain(..n);
                    moved = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    self.state.set_error(XferError::SeeErrno { context: "write to http connection".into(), source: e });
                    return StepResult::Moved;
                }
            }
        }

        match transport.read(&mut self.read_chunk) {
            Ok(0) => {
                if self.state.machine == Phase::Body {
                    self.body_done = true;
                    self.finish_response();
                    moved = true;
                }
            }
            Ok(n) => {
                self.in_buf.extend_from_slice(&self.read_chunk[..n]);
                moved = true;
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => {
                self.state.set_error(XferError::SeeErrno { context: "read from http connection".into(), source: e });
                return StepResult::Moved;
            }
        }

        if self.process_buffer() {
            moved = true;
        }

        if moved { StepResult::Moved } else { StepResult::Stall }
    }

    fn process_buffer(&mut self) -> bool {
        let mut moved = false;
        match self.state.machine {
            Phase::AwaitingHeaders => {
                if let Some((block, consumed)) = response::find_header_block(&self.in_buf) {
                    match response::parse_headers(block) {
                        Ok(response) => {
                            self.in_buf.drain(..consumed);
                            self.on_response(response);
                            moved = true;
                        }
                        Err(e) => {
                            self.state.set_error(XferError::Fatal(e.to_string()));
                            moved = true;
                        }
                    }
                }
            }
            Phase::Body => {
                if self.feed_body() {
                    moved = true;
                }
            }
            _ => {}
        }
        moved
    }

    fn feed_body(&mut self) -> bool {
        let mut moved = false;
        match self.framing.as_mut() {
            Some(BodyFraming::ContentLength(remaining)) => {
                let take = self.in_buf.len().min(*remaining as usize);
                if take > 0 {
                    self.body_ready.extend(self.in_buf.drain(..take));
                    *remaining -= take as u64;
                    moved = true;
                }
                if *remaining == 0 {
                    self.body_done = true;
                    self.finish_response();
                }
            }
            Some(BodyFraming::Chunked(decoder)) => {
                if !self.in_buf.is_empty() {
                    let consumed = decoder.feed(&self.in_buf, &mut self.body_ready);
                    if consumed > 0 {
                        self.in_buf.drain(..consumed);
                        moved = true;
                    }
                    if decoder.is_done() {
                        self.body_done = true;
                        self.finish_response();
                    }
                }
            }
            Some(BodyFraming::UntilClose) => {
                if !self.in_buf.is_empty() {
                    self.body_ready.extend(self.in_buf.drain(..));
                    moved = true;
                }
            }
            None => {
                self.body_done = true;
                self.finish_response();
            }
        }
        moved
    }

    fn on_response(&mut self, response: Response) {
        if let Some(set_cookie) = response.header("set-cookie").map(str::to_string) {
            if self.config.set_cookies {
                self.cookie_jar.store(&self.identity.host, &self.cwd.to_string(), &set_cookie);
            }
        }

        if response.is_redirect() && self.redirect_budget > 0 {
            if let Some(location) = response.header("location").map(str::to_string) {
                self.redirect_budget -= 1;
                let (method, target) = redirect::next_request(response.status, self.current_method, &location);
                self.current_method = method;
                self.reissue_for_redirect(&target);
                return;
            }
        }

        if response.status == 416 {
            if let Some(size) = response.unsatisfiable_range_size() {
                self.state.size = Some(size);
            }
            self.finish_mode(true);
            return;
        }

        if matches!(response.status, 400 | 501) && self.state.mode == OpenMode::ChangeDir && self.use_propfind {
            self.use_propfind = false;
            let path = self.pending_path.clone().unwrap_or_else(|| self.cwd.clone());
            self.send_request(request::head(&self.identity.host, &path, &self.config.user_agent));
            self.state.machine = Phase::AwaitingHeaders;
            return;
        }

        if !(200..300).contains(&response.status) {
            self.fail_for_status(&response);
            self.response = Some(response);
            return;
        }

        if self.state.mode == OpenMode::Retrieve && self.state.real_pos < 0 {
            if response.status == 206 {
                self.state.real_pos = self.state.pos;
            } else {
                // Range ignored; the server is sending the whole body from
                // byte 0, not from where we asked to resume.
                self.state.pos = 0;
                self.state.real_pos = 0;
            }
        }

        self.body_ready.clear();
        self.body_done = false;
        self.framing = Some(if response.is_chunked() {
            BodyFraming::Chunked(ChunkedDecoder::default())
        } else if let Some(len) = response.content_length() {
            if len == 0 {
                self.body_done = true;
                BodyFraming::ContentLength(0)
            } else {
                BodyFraming::ContentLength(len)
            }
        } else {
            BodyFraming::UntilClose
        });

        self.response = Some(response);
        self.state.machine = Phase::Body;
        if self.body_done {
            self.finish_response();
        }
    }

    fn fail_for_status(&mut self, response: &Response) {
        match response.status {
            404 => self.state.set_error(XferError::NoFile { path: self.pending_path.take().map(|p| p.to_string()).unwrap_or_default() }),
            301..=308 => self.state.set_error(XferError::Fatal(format!("redirect loop or missing Location ({})", response.status))),
            _ => self.state.set_error(XferError::Fatal(format!("HTTP {} {}", response.status, response.reason))),
        }
    }

    fn reissue_for_redirect(&mut self, target: &str) {
        let path = Path::parse(target);
        self.pending_path = Some(path.clone());
        let method_bytes = match (self.current_method, self.state.mode) {
            (redirect::Method::Get, _) => request::get(&self.identity.host, &path, &self.config.user_agent, None),
            (redirect::Method::Put, _) => request::put(&self.identity.host, &path, &self.config.user_agent, self.state.size.unwrap_or(0), None),
            (redirect::Method::Post, _) => request::get(&self.identity.host, &path, &self.config.user_agent, None),
        };
        self.send_request(method_bytes);
        self.state.machine = Phase::AwaitingHeaders;
    }

    fn finish_response(&mut self) {
        let keeps_alive = self.response.as_ref().is_some_and(Response::keeps_alive) && self.state.mode != OpenMode::Store;
        if !keeps_alive {
            self.transport = None;
            self.state.phase = ConnectionPhase::Disconnected;
        }
        self.finish_mode(false);
    }

    /// Completes whatever `open` mode is in flight. `synthetic_eof` marks
    /// the 416-past-end-of-file case, which counts as success with no body.
    fn finish_mode(&mut self, synthetic_eof: bool) {
        match self.state.mode {
            OpenMode::List | OpenMode::LongList => {
                if let Some(response) = &self.response {
                    let listing_body = String::from_utf8_lossy(&self.body_ready).to_string();
                    let entries = webdav::parse_multistatus(&listing_body);
                    self.body_ready = render_listing(&entries, &self.cwd, self.state.mode == OpenMode::LongList).into_bytes();
                    let _ = response;
                }
                self.state.machine = Phase::Waiting;
            }
            OpenMode::ChangeDir => {
                if let Some(path) = self.pending_path.take() {
                    self.cwd = path;
                }
                self.state.mode = OpenMode::Closed;
                self.state.machine = Phase::Idle;
            }
            OpenMode::Retrieve => {
                if synthetic_eof {
                    self.body_done = true;
                }
                self.state.machine = Phase::Waiting;
            }
            _ => {
                self.state.mode = OpenMode::Closed;
                self.state.machine = Phase::Idle;
            }
        }
    }

    fn send_request(&mut self, bytes: Vec<u8>) {
        self.out_buf.extend_from_slice(&bytes);
    }

    fn start_open(&mut self, path: &Path, mode: OpenMode, pos: u64) {
        self.state.mode = mode;
        self.state.pos = pos as i64;
        // A GET with `Range` isn't confirmed until the response status is
        // known (206 honors it, 200 means the server sent the whole body
        // instead); a PUT has no such negotiation, so it's certain upfront.
        self.state.real_pos = if mode == OpenMode::Retrieve && pos > 0 { -1 } else { pos as i64 };
        self.pending_path = Some(path.clone());
        self.current_method = redirect::Method::Get;
        self.body_ready.clear();
        self.body_done = false;
        self.redirect_budget = MAX_REDIRECTS;

        let path = path.clone();
        let host = self.identity.host.clone();
        let ua = self.config.user_agent.clone();

        let bytes = match mode {
            OpenMode::Retrieve => request::get(&host, &path, &ua, (pos > 0).then_some(request::Range::From(pos))),
            OpenMode::ConnectVerify => request::head(&host, &path, &ua),
            OpenMode::Store => match self.state.size {
                Some(size) => {
                    self.store_remaining = size;
                    self.current_method = redirect::Method::Put;
                    request::put(&host, &path, &ua, size, (pos > 0).then_some(pos))
                }
                None => {
                    self.state.set_error(XferError::Fatal("must know file size before upload".into()));
                    return;
                }
            },
            OpenMode::List | OpenMode::LongList => request::propfind(&host, &path, &ua, 1),
            OpenMode::ChangeDir if self.use_propfind => request::propfind(&host, &path, &ua, 0),
            OpenMode::ChangeDir => request::head(&host, &path, &ua),
            OpenMode::MakeDir if self.config.use_mkcol => request::mkcol(&host, &path, &ua),
            OpenMode::Remove | OpenMode::RemoveDir => request::delete(&host, &path, &ua),
            OpenMode::MakeDir => {
                self.state.set_error(XferError::NotSupp("MKCOL disabled by configuration".into()));
                return;
            }
            OpenMode::QuoteCmd | OpenMode::ArrayInfo | OpenMode::ChangeMode | OpenMode::MpList => {
                self.state.set_error(XferError::NotSupp("operation not supported over HTTP".into()));
                return;
            }
            OpenMode::Rename | OpenMode::Closed => return,
        };
        let bytes = match &self.proxy_addr {
            Some(_) if !self.secure => absolutize_request_line(bytes, &host),
            _ => bytes,
        };
        self.send_request(bytes);
        self.state.machine = Phase::AwaitingHeaders;
    }
}

/// Parses `http:proxy`/`https:proxy`'s `host:port` form.
fn parse_proxy_addr(value: &str) -> Option<(String, u16)> {
    let value = value.trim_start_matches("http://").trim_end_matches('/');
    let (host, port) = value.rsplit_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
}

/// Rewrites a request's origin-form target (`METHOD /path HTTP/1.1`) into
/// the absolute-URI form a plain proxy expects for every method but
/// `CONNECT`.
fn absolutize_request_line(bytes: Vec<u8>, host: &str) -> Vec<u8> {
    let Some(line_end) = memchr::memchr(b'\n', &bytes) else { return bytes };
    let first_line = String::from_utf8_lossy(&bytes[..line_end]).trim_end_matches('\r').to_string();
    let mut parts = first_line.splitn(3, ' ');
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next()) else { return bytes };
    let rewritten = format!("{method} {} {version}\r\n", crate::proxy::absolute_target(host, target));
    let mut out = rewritten.into_bytes();
    out.extend_from_slice(&bytes[line_end + 1..]);
    out
}

fn render_listing(entries: &[webdav::DavEntry], base: &Path, long: bool) -> String {
    let mut out = String::new();
    for entry in entries {
        let Some(name) = webdav::entry_name(entry, base) else { continue };
        if name.is_empty() {
            continue;
        }
        if long {
            let kind = if entry.is_collection { 'd' } else { '-' };
            let size = entry.size.unwrap_or(0);
            out.push_str(&format!("{kind}rw-r--r-- 1 - - {size:>10} {name}\n"));
        } else {
            out.push_str(&name);
            out.push('\n');
        }
    }
    out
}

impl Task for HttpEngine {
    fn step(&mut self) -> StepResult {
        if self.state.error.is_some() {
            return StepResult::Stall;
        }
        match self.state.phase {
            ConnectionPhase::Disconnected => {
                self.begin_connect();
                StepResult::Moved
            }
            ConnectionPhase::Resolving => self.drive_resolver(),
            ConnectionPhase::Connecting => self.drive_dialer(),
            _ => self.pump_io(),
        }
    }

    fn interest(&self) -> Interest {
        if let Some(resolver) = &self.resolver {
            return resolver.interest();
        }
        if let Some(dialer) = &self.dialer {
            return Interest::writable(dialer.raw_fd());
        }
        if let Some(transport) = &self.transport {
            if let Some(fd) = transport.raw_fd() {
                return if self.out_buf.is_empty() { Interest::readable(fd) } else { Interest::writable(fd) };
            }
        }
        Interest::none()
    }
}

impl Session for HttpEngine {
    fn open(&mut self, path: &Path, mode: OpenMode, pos: u64) -> Outcome {
        if self.state.error.is_some() {
            return Outcome::Err(self.state.error.take().unwrap());
        }
        self.start_open(path, mode, pos);
        Outcome::InProgress
    }

    fn close(&mut self) -> Outcome {
        self.state.mode = OpenMode::Closed;
        Outcome::Ok
    }

    fn read(&mut self, max: usize) -> ReadOutcome {
        if !self.body_ready.is_empty() {
            let n = max.min(self.body_ready.len());
            let bytes: Vec<u8> = self.body_ready.drain(..n).collect();
            if let Some(bucket) = &self.rate_limiter {
                bucket.borrow_mut().register(bytes.len());
            }
            self.state.pos += bytes.len() as i64;
            if self.state.real_pos >= 0 {
                self.state.real_pos += bytes.len() as i64;
            }
            return ReadOutcome::Bytes(bytes);
        }
        if self.body_done {
            return ReadOutcome::Eof;
        }
        ReadOutcome::Again
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, XferError> {
        if self.state.mode != OpenMode::Store || self.store_remaining == 0 {
            return Ok(0);
        }
        let n = bytes.len().min(self.store_remaining as usize);
        self.out_buf.extend_from_slice(&bytes[..n]);
        self.store_remaining -= n as u64;
        self.state.pos += n as i64;
        if self.state.real_pos >= 0 {
            self.state.real_pos += n as i64;
        }
        if self.store_remaining == 0 {
            self.state.machine = Phase::AwaitingHeaders;
        }
        Ok(n)
    }

    fn store_status(&self) -> Outcome {
        self.done()
    }

    fn done(&self) -> Outcome {
        if let Some(error) = &self.state.error {
            return Outcome::Err(XferError::Fatal(error.to_string()));
        }
        match self.state.machine {
            Phase::Idle | Phase::Waiting => Outcome::Ok,
            _ if self.state.mode == OpenMode::Closed => Outcome::Ok,
            _ => Outcome::InProgress,
        }
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Outcome {
        self.pending_path = Some(from.clone());
        self.pending_rename_to = Some(to.clone());
        self.state.mode = OpenMode::Rename;
        let destination = format!("http{}://{}{}", if self.secure { "s" } else { "" }, self.identity.host, to);
        let bytes = request::mv(&self.identity.host, from, &destination, &self.config.user_agent);
        self.send_request(bytes);
        self.state.machine = Phase::AwaitingHeaders;
        Outcome::InProgress
    }

    fn mkdir(&mut self, path: &Path, _all_parents: bool) -> Outcome {
        self.open(path, OpenMode::MakeDir, 0)
    }

    fn chdir(&mut self, path: &Path, _verify: bool) -> Outcome {
        self.open(path, OpenMode::ChangeDir, 0)
    }

    fn chmod(&mut self, _path: &Path, _mode: u32) -> Outcome {
        Outcome::Err(XferError::NotSupp("CHMOD not supported over HTTP".into()))
    }

    fn remove(&mut self, path: &Path) -> Outcome {
        self.open(path, OpenMode::Remove, 0)
    }

    fn remove_dir(&mut self, path: &Path) -> Outcome {
        self.open(path, OpenMode::RemoveDir, 0)
    }

    fn set_date(&mut self, date: SystemTime) {
        self.state.date = Some(date);
    }

    fn set_size(&mut self, size: u64) {
        self.state.size = Some(size);
    }

    fn want_size(&mut self) -> Option<u64> {
        self.response.as_ref().and_then(Response::content_length).or(self.state.size)
    }

    fn want_date(&mut self) -> Option<SystemTime> {
        self.response.as_ref().and_then(|r| r.header("last-modified")).and_then(crate::cookie::parse_http_date).or(self.state.date)
    }

    fn get_cwd(&self) -> &Path {
        &self.cwd
    }

    fn get_home(&self) -> Option<&Path> {
        self.home.as_ref()
    }

    fn ascii_transfer(&mut self, _enabled: bool) {}

    fn set_limit(&mut self, _end: Option<u64>) {}

    fn set_priority(&mut self, _priority: i32) {}

    fn is_connected(&self) -> bool {
        self.state.phase == ConnectionPhase::LoggedIn
    }

    fn seek(&mut self, target: SeekTarget) -> Outcome {
        match target {
            SeekTarget::Offset(pos) => {
                self.state.pos = pos as i64;
                Outcome::Ok
            }
            SeekTarget::End => Outcome::Ok,
        }
    }

    fn can_seek(&self, _to: u64) -> bool {
        true
    }

    fn get_seek_pos(&self) -> i64 {
        self.state.pos
    }

    fn get_real_pos(&self) -> i64 {
        self.state.real_pos
    }

    fn buffered(&self) -> usize {
        self.out_buf.len()
    }

    fn io_ready(&self) -> bool {
        self.state.machine == Phase::Body
    }

    fn needs_size_date_beforehand(&self) -> bool {
        true
    }

    fn put_eof(&mut self) {
        self.store_remaining = 0;
    }

    fn error(&self) -> Option<&XferError> {
        self.state.error.as_ref()
    }

    fn remove_file(&mut self) -> Outcome {
        self.remove(&self.pending_path.clone().unwrap_or_else(|| self.cwd.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use urlgrammar::Proto;

    fn identity() -> SessionIdentity {
        SessionIdentity {
            proto: Proto::Http,
            host: "www.example.com".into(),
            port: 80,
            user: None,
            password: None,
            home: None,
        }
    }

    fn config() -> HttpConfig {
        HttpConfig {
            cache: true,
            cache_control: None,
            cookie: true,
            set_cookies: true,
            use_propfind: true,
            use_mkcol: true,
            user_agent: "xfer-core/0.1".into(),
            referer: None,
            accept: None,
            accept_language: None,
            accept_charset: None,
            authorization: None,
            put_method: "PUT".into(),
            put_content_type: None,
            post_content_type: None,
            proxy: None,
        }
    }

    #[test]
    fn fresh_engine_starts_disconnected() {
        let engine = HttpEngine::new(identity(), config());
        assert!(!engine.is_connected());
        assert_eq!(engine.get_cwd(), &Path::parse("/"));
    }

    #[test]
    fn opening_a_file_queues_a_get_request() {
        let mut engine = HttpEngine::new(identity(), config());
        let outcome = engine.open(&Path::parse("/file.bin"), OpenMode::Retrieve, 0);
        assert!(outcome.is_in_progress());
        let text = String::from_utf8(engine.out_buf.clone()).unwrap();
        assert!(text.starts_with("GET /file.bin HTTP/1.1\r\n"));
    }

    #[test]
    fn store_without_known_size_fails_immediately() {
        let mut engine = HttpEngine::new(identity(), config());
        engine.open(&Path::parse("/out.bin"), OpenMode::Store, 0);
        assert!(engine.error().is_some());
    }

    #[test]
    fn a_416_response_updates_size_and_completes_retrieve() {
        let mut engine = HttpEngine::new(identity(), config());
        engine.state.mode = OpenMode::Retrieve;
        let response = response::parse_headers(b"HTTP/1.1 416 Requested Range Not Satisfiable\r\nContent-Range: bytes */500").unwrap();
        engine.on_response(response);
        assert_eq!(engine.state.size, Some(500));
        assert!(engine.body_done);
    }

    #[test]
    fn a_redirect_reissues_the_request_against_the_new_path() {
        let mut engine = HttpEngine::new(identity(), config());
        engine.state.mode = OpenMode::Retrieve;
        engine.pending_path = Some(Path::parse("/old.bin"));
        let response = response::parse_headers(b"HTTP/1.1 302 Found\r\nLocation: /new.bin").unwrap();
        engine.on_response(response);
        let text = String::from_utf8(engine.out_buf.clone()).unwrap();
        assert!(text.starts_with("GET /new.bin HTTP/1.1\r\n"));
    }

    #[test]
    fn a_404_fails_with_no_file() {
        let mut engine = HttpEngine::new(identity(), config());
        engine.state.mode = OpenMode::Retrieve;
        engine.pending_path = Some(Path::parse("/missing.bin"));
        let response = response::parse_headers(b"HTTP/1.1 404 Not Found\r\n").unwrap();
        engine.on_response(response);
        assert!(matches!(engine.error(), Some(XferError::NoFile { .. })));
    }
}
