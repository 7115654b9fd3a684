//! The FTP control-channel state machine: login, directory changes, data
//! channel negotiation (PASV/EPSV/PORT/EPRT), and the transfer commands,
//! wired together as a [`scheduler::Task`] and exposed through
//! [`session::Session`].

use std::net::{SocketAddr, TcpListener};
use std::rc::Rc;
use std::cell::RefCell;
use std::time::SystemTime;

use iobuf::{DirectedBuffer, TelnetLayer, Transport};
use ratelimit::TokenBucket;
use resolver::{AddressFamily, Resolver};
use scheduler::{Interest, StepResult, Task};
use session::{ConnectionPhase, OpenMode, Outcome, ReadOutcome, SeekTarget, Session, SessionState, SessionIdentity, XferError};
use xfer_path::Path;

use crate::datachannel::{self, DataChannelMode};
use crate::dial::{Dialer, TcpTransport};
use crate::expectation::{ExpectationKind, ExpectationQueue};
use crate::feat::Capabilities;
use crate::pathflavor::{self, PathFlavor};
use crate::response::{Reply, ReplyAccumulator};
use crate::retrypolicy;

/// The control-channel's own state machine, layered on top of
/// [`session::ConnectionPhase`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Initial,
    Connecting,
    Connected,
    UserRespWaiting,
    LoggedIn,
    CwdWaiting,
    Accepting,
    DatasocketConnecting,
    Waiting150,
    DataOpen,
    Waiting,
    Eof,
}

/// Policy knobs an `FtpEngine` is configured with; mirrors the handful of
/// per-site settings the control logic actually branches on.
#[derive(Clone, Debug)]
pub struct FtpSettings {
    pub use_epsv: bool,
    pub passive_mode: bool,
    pub verify_address: bool,
    pub ignore_pasv_address: bool,
    pub anonymous: bool,
    pub use_tls: bool,
    pub retry_530: regex::Regex,
    pub retry_530_anonymous: regex::Regex,
}

impl Default for FtpSettings {
    fn default() -> Self {
        Self {
            use_epsv: true,
            passive_mode: true,
            verify_address: true,
            ignore_pasv_address: false,
            anonymous: false,
            use_tls: false,
            retry_530: regex::Regex::new(r"(?i)temporarily|overloaded").unwrap(),
            retry_530_anonymous: regex::Regex::new(r"(?i)too many|maximum").unwrap(),
        }
    }
}

enum DataChannel {
    None,
    Listening(TcpListener, SocketAddr),
    Dialing(Dialer),
    Open(Box<dyn Transport>),
}

pub struct FtpEngine {
    identity: SessionIdentity,
    settings: FtpSettings,
    state: SessionState<Phase>,

    control: Option<Box<dyn Transport>>,
    resolver: Option<Resolver>,
    dialer: Option<Dialer>,
    control_peer: Option<SocketAddr>,

    out_buf: DirectedBuffer,
    in_buf: DirectedBuffer,
    accumulator: ReplyAccumulator,
    expectations: ExpectationQueue,
    caps: Capabilities,
    path_flavor: PathFlavor,

    data: DataChannel,
    data_mode: DataChannelMode,
    advertised_data_port: Option<u16>,
    rate_limiter: Option<Rc<RefCell<TokenBucket>>>,

    cwd: Path,
    home: Option<Path>,
    pending_path: Option<Path>,
    pending_rename_to: Option<Path>,
    ascii: bool,
    had_filename_argument: bool,

    read_chunk: Vec<u8>,
}

const DEFAULT_FTP_PORT: u16 = 21;

impl FtpEngine {
    #[must_use]
    pub fn new(identity: SessionIdentity, settings: FtpSettings) -> Self {
        Self {
            identity,
            settings,
            state: SessionState::new(Phase::Initial),
            control: None,
            resolver: None,
            dialer: None,
            control_peer: None,
            out_buf: DirectedBuffer::new(),
            in_buf: DirectedBuffer::new(),
            accumulator: ReplyAccumulator::default(),
            expectations: ExpectationQueue::default(),
            caps: Capabilities::default(),
            path_flavor: PathFlavor::Unix,
            data: DataChannel::None,
            data_mode: DataChannelMode::Passive,
            advertised_data_port: None,
            rate_limiter: None,
            cwd: Path::parse("/"),
            home: None,
            pending_path: None,
            pending_rename_to: None,
            ascii: false,
            had_filename_argument: false,
            read_chunk: vec![0u8; 32 * 1024],
        }
    }

    pub fn set_rate_limiter(&mut self, bucket: Rc<RefCell<TokenBucket>>) {
        self.rate_limiter = Some(bucket);
    }

    fn queue_command(&mut self, kind: ExpectationKind, command: impl Into<String>) {
        let command = command.into();
        self.out_buf.put(command.as_bytes());
        self.out_buf.put(b"\r\n");
        self.expectations.push(kind, command);
    }

    fn begin_connect(&mut self) {
        self.state.phase = ConnectionPhase::Resolving;
        self.state.machine = Phase::Connecting;
        let port = if self.identity.port == 0 { DEFAULT_FTP_PORT } else { self.identity.port };
        self.resolver = Some(Resolver::spawn(self.identity.host.clone(), port, AddressFamily::Any));
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
                match Dialer::start(target, None) {
                    Ok(dialer) => {
                        self.control_peer = Some(target);
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
                        self.control = Some(Box::new(TelnetLayer::new(transport)));
                        self.state.phase = ConnectionPhase::Connected;
                        self.state.machine = Phase::Connected;
                        self.expectations.push(ExpectationKind::Ready, String::new());
                    }
                    Err(e) => self.state.set_error(XferError::SeeErrno { context: "set control socket non-blocking".into(), source: e }),
                }
                StepResult::Moved
            }
            Err(e) => {
                self.dialer = None;
                self.state.set_error(XferError::SeeErrno { context: "connect to control channel".into(), source: e });
                StepResult::Moved
            }
        }
    }

    fn pump_control_io(&mut self) -> StepResult {
        let Some(control) = self.control.as_mut() else { return StepResult::Stall };
        let mut moved = false;

        if !self.out_buf.is_empty() {
            match control.write(self.out_buf.get()) {
                Ok(0) => {}
                Ok(n) => {
                    self.out_buf.skip(n);
                    moved = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    self.state.set_error(XferError::SeeErrno { context: "write to control channel".into(), source: e });
                    return StepResult::Moved;
                }
            }
        }

        match control.read(&mut self.read_chunk) {
            Ok(0) => {}
            Ok(n) => {
                self.in_buf.put(&self.read_chunk[..n]);
                moved = true;
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => {
                self.state.set_error(XferError::SeeErrno { context: "read from control channel".into(), source: e });
                return StepResult::Moved;
            }
        }

        while let Some(pos) = memchr::memchr(b'\n', self.in_buf.get()) {
            let line_bytes = &self.in_buf.get()[..pos];
            let line = String::from_utf8_lossy(line_bytes).trim_end_matches('\r').to_string();
            self.in_buf.skip(pos + 1);
            if let Some(reply) = self.accumulator.feed_line(&line) {
                self.handle_reply(reply);
                moved = true;
            }
        }

        if moved { StepResult::Moved } else { StepResult::Stall }
    }

    fn handle_reply(&mut self, reply: Reply) {
        if retrypolicy::looks_like_network_drop(&reply) {
            self.state.set_error(XferError::SeeErrno {
                context: "control channel".into(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionReset, reply.text()),
            });
            return;
        }

        let Some(expectation) = self.expectations.pop() else { return };
        match expectation.kind {
            ExpectationKind::Ready => self.on_ready(&reply),
            ExpectationKind::User => self.on_user(&reply),
            ExpectationKind::Pass => self.on_pass(&reply),
            ExpectationKind::Feat => self.on_feat(&reply),
            ExpectationKind::Pwd => self.on_pwd(&reply),
            ExpectationKind::Cwd | ExpectationKind::CwdCurr | ExpectationKind::CwdStale => self.on_cwd(&reply),
            ExpectationKind::Pasv => self.on_pasv(&reply),
            ExpectationKind::Epsv => self.on_epsv(&reply),
            ExpectationKind::Port | ExpectationKind::Eprt => self.on_port_ack(&reply),
            ExpectationKind::Rest => self.on_rest(&reply),
            ExpectationKind::Transfer => self.on_transfer_open(&reply),
            ExpectationKind::Rnfr => self.on_rnfr(&reply),
            ExpectationKind::Rnto => self.on_simple_ok(&reply),
            ExpectationKind::FileAccess => self.on_simple_ok(&reply),
            ExpectationKind::Quoted => self.on_simple_ok(&reply),
            ExpectationKind::Type | ExpectationKind::Allo => {}
            ExpectationKind::AuthTls => self.on_auth_tls(&reply),
            _ => {}
        }
    }

    fn on_ready(&mut self, reply: &Reply) {
        if !reply.is_success() {
            self.state.set_error(XferError::LoginFailed(reply.text()));
            return;
        }
        if self.settings.use_tls && !self.settings.use_tls_already_upgraded() {
            self.queue_command(ExpectationKind::AuthTls, "AUTH TLS");
        } else {
            self.start_login();
        }
    }

    fn on_auth_tls(&mut self, reply: &Reply) {
        // TLS upgrade of the control channel is layered in by the caller
        // swapping `self.control`; this engine only drives the AUTH
        // handshake reply and falls back to plaintext if the server
        // refuses it.
        if !reply.is_success() {
            tracing::warn!(host = %self.identity.host, "server refused AUTH TLS, continuing without it");
        }
        self.start_login();
    }

    fn start_login(&mut self) {
        let user = self.identity.user.clone().unwrap_or_else(|| "anonymous".to_string());
        self.queue_command(ExpectationKind::User, format!("USER {user}"));
    }

    fn on_user(&mut self, reply: &Reply) {
        if reply.code == 230 {
            self.on_pass(reply);
            return;
        }
        if reply.code == 331 || reply.code == 332 {
            let password = self.identity.password.clone().unwrap_or_else(|| "anonymous@".to_string());
            self.queue_command(ExpectationKind::Pass, format!("PASS {password}"));
            return;
        }
        self.state.set_error(XferError::LoginFailed(reply.text()));
    }

    fn on_pass(&mut self, reply: &Reply) {
        if reply.code == 530 {
            if retrypolicy::should_retry_530(reply, &self.settings.retry_530, &self.settings.retry_530_anonymous, self.settings.anonymous) {
                self.state.set_error(XferError::SeeErrno {
                    context: "login".into(),
                    source: std::io::Error::new(std::io::ErrorKind::WouldBlock, reply.text()),
                });
            } else {
                self.state.set_error(XferError::LoginFailed(reply.text()));
            }
            return;
        }
        if !reply.is_success() {
            self.state.set_error(XferError::LoginFailed(reply.text()));
            return;
        }
        self.state.phase = ConnectionPhase::LoggedIn;
        self.state.machine = Phase::LoggedIn;
        self.state.retry.record_reconnect_success();
        self.queue_command(ExpectationKind::Feat, "FEAT");
    }

    fn on_feat(&mut self, reply: &Reply) {
        if reply.is_success() {
            self.caps = Capabilities::parse(&reply.lines);
        }
        self.queue_command(ExpectationKind::Pwd, "PWD");
    }

    fn on_pwd(&mut self, reply: &Reply) {
        if let Some(text) = pathflavor::extract_quoted_path(&reply.text()) {
            self.path_flavor = pathflavor::detect_flavor(&text);
            let path = Path::parse(&text);
            self.home.get_or_insert_with(|| path.clone());
            self.cwd = path;
        }
        self.state.machine = Phase::Waiting;
    }

    fn on_cwd(&mut self, reply: &Reply) {
        if reply.is_success() {
            if let Some(path) = self.pending_path.take() {
                self.cwd = path;
            }
            self.state.mode = OpenMode::Closed;
        } else {
            self.state.set_error(XferError::NoFile { path: self.pending_path.take().map(|p| p.to_string()).unwrap_or_default() });
        }
        self.state.machine = Phase::Waiting;
    }

    fn on_pasv(&mut self, reply: &Reply) {
        if !reply.is_success() {
            self.fall_back_to_active();
            return;
        }
        match datachannel::parse_pasv(&reply.text()) {
            Some(mut addr) => {
                if let Some(control_peer) = self.control_peer {
                    if datachannel::should_substitute_address(addr.ip(), control_peer.ip(), self.settings.ignore_pasv_address) {
                        addr.set_ip(control_peer.ip());
                    }
                }
                self.advertised_data_port = Some(addr.port());
                self.open_data_dialer(addr);
            }
            None => self.fall_back_to_active(),
        }
    }

    fn on_epsv(&mut self, reply: &Reply) {
        if !reply.is_success() {
            self.queue_command(ExpectationKind::Pasv, "PASV");
            self.data_mode = DataChannelMode::Passive;
            return;
        }
        match (datachannel::parse_epsv(&reply.text()), self.control_peer) {
            (Some(port), Some(peer)) => {
                self.advertised_data_port = Some(port);
                self.open_data_dialer(SocketAddr::new(peer.ip(), port));
            }
            _ => self.fall_back_to_active(),
        }
    }

    fn fall_back_to_active(&mut self) {
        let Ok(listener) = TcpListener::bind("0.0.0.0:0") else {
            self.state.set_error(XferError::Fatal("could not open active-mode listen socket".into()));
            return;
        };
        let _ = listener.set_nonblocking(true);
        let Ok(local) = listener.local_addr() else { return };
        self.data_mode = DataChannelMode::Active;
        self.advertised_data_port = Some(local.port());
        if let Some(text) = datachannel::format_port(local) {
            self.queue_command(ExpectationKind::Port, format!("PORT {text}"));
        } else {
            self.queue_command(ExpectationKind::Eprt, format!("EPRT {}", datachannel::format_eprt(local)));
        }
        self.data = DataChannel::Listening(listener, local);
        self.state.machine = Phase::Accepting;
    }

    fn open_data_dialer(&mut self, addr: SocketAddr) {
        match Dialer::start(addr, None) {
            Ok(dialer) => {
                self.data = DataChannel::Dialing(dialer);
                self.state.machine = Phase::DatasocketConnecting;
            }
            Err(e) => self.state.set_error(XferError::SeeErrno { context: "connect to data channel".into(), source: e }),
        }
    }

    fn on_port_ack(&mut self, reply: &Reply) {
        if !reply.is_success() {
            self.state.set_error(XferError::NotSupp("PORT/EPRT rejected by server".into()));
        }
    }

    fn on_rest(&mut self, reply: &Reply) {
        if reply.code / 100 == 5 {
            // Server doesn't actually support REST despite advertising it
            // (or lost the capability mid-session); don't trust it again
            // this session and fall back as if we'd never sent it.
            self.caps.rest = false;
            if self.state.mode == OpenMode::Store {
                self.state.pos = 0;
            }
            self.state.real_pos = 0;
        } else {
            // 2xx/3xx: server accepted the restart at the offset we asked for.
            self.state.real_pos = self.state.pos;
        }
        self.send_transfer_command();
    }

    fn send_transfer_command(&mut self) {
        let command = match self.state.mode {
            OpenMode::Retrieve => format!("RETR {}", self.pending_path.as_ref().map(Path::to_string).unwrap_or_default()),
            OpenMode::Store => format!("STOR {}", self.pending_path.as_ref().map(Path::to_string).unwrap_or_default()),
            OpenMode::List | OpenMode::LongList => "LIST".to_string(),
            OpenMode::MpList => "MLSD".to_string(),
            _ => return,
        };
        self.had_filename_argument = self.pending_path.is_some();
        self.queue_command(ExpectationKind::Transfer, command);
        self.state.machine = Phase::Waiting150;
    }

    fn on_transfer_open(&mut self, reply: &Reply) {
        if reply.is_preliminary() {
            self.state.machine = Phase::DataOpen;
            return;
        }
        if retrypolicy::is_transfer_complete(reply) {
            self.state.machine = Phase::Waiting;
            self.data = DataChannel::None;
            return;
        }
        if retrypolicy::is_empty_listing(reply, self.had_filename_argument) {
            self.state.machine = Phase::Waiting;
            self.data = DataChannel::None;
            return;
        }
        self.state.set_error(XferError::NoFile { path: self.pending_path.take().map(|p| p.to_string()).unwrap_or_default() });
    }

    fn on_rnfr(&mut self, reply: &Reply) {
        if reply.code != 350 {
            self.state.set_error(XferError::NoFile { path: self.pending_path.take().map(|p| p.to_string()).unwrap_or_default() });
            return;
        }
        if let Some(to) = self.pending_rename_to.take() {
            self.queue_command(ExpectationKind::Rnto, format!("RNTO {to}"));
        }
    }

    fn on_simple_ok(&mut self, reply: &Reply) {
        if reply.is_success() {
            self.state.mode = OpenMode::Closed;
        } else {
            self.state.set_error(XferError::Fatal(reply.text()));
        }
        self.state.machine = Phase::Waiting;
    }

    fn drive_data_channel(&mut self) -> StepResult {
        enum Outcome {
            Stall,
            Opened(std::net::TcpStream),
            Failed(std::io::Error, &'static str),
        }

        let outcome = match &self.data {
            DataChannel::Dialing(dialer) => match dialer.finish() {
                Ok(Some(stream)) => Outcome::Opened(stream),
                Ok(None) => Outcome::Stall,
                Err(e) => Outcome::Failed(e, "data channel connect"),
            },
            DataChannel::Listening(listener, _) => match listener.accept() {
                Ok((stream, peer)) => {
                    let verified = match self.control_peer {
                        Some(control_peer) => datachannel::verify_data_peer(control_peer.ip(), peer, self.advertised_data_port, self.settings.verify_address),
                        None => true,
                    };
                    if verified { Outcome::Opened(stream) } else { Outcome::Stall }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Outcome::Stall,
                Err(e) => Outcome::Failed(e, "accept active-mode data connection"),
            },
            _ => Outcome::Stall,
        };

        match outcome {
            Outcome::Stall => StepResult::Stall,
            Outcome::Failed(e, context) => {
                self.state.set_error(XferError::SeeErrno { context: context.into(), source: e });
                StepResult::Moved
            }
            Outcome::Opened(stream) => {
                if let Ok(transport) = TcpTransport::new(stream) {
                    self.data = DataChannel::Open(Box::new(transport));
                    self.send_transfer_command();
                    StepResult::Moved
                } else {
                    StepResult::Stall
                }
            }
        }
    }

    fn start_open(&mut self, path: &Path, mode: OpenMode, pos: u64) {
        self.state.mode = mode;
        self.state.pos = pos as i64;
        // Unknown until REST either succeeds or is skipped; `on_rest`
        // resolves it once the reply (or the absence of a REST at all)
        // is known.
        self.state.real_pos = if pos == 0 { 0 } else { -1 };
        self.pending_path = Some(path.clone());
        self.had_filename_argument = matches!(mode, OpenMode::Retrieve | OpenMode::Store);

        if self.data_mode_is_active_only() {
            self.fall_back_to_active();
        } else if self.settings.use_epsv && self.caps.epsv {
            self.queue_command(ExpectationKind::Epsv, "EPSV");
            self.data_mode = DataChannelMode::ExtendedPassive;
        } else {
            self.queue_command(ExpectationKind::Pasv, "PASV");
            self.data_mode = DataChannelMode::Passive;
        }

        if pos > 0 {
            self.queue_command(ExpectationKind::Rest, format!("REST {pos}"));
        }
    }

    fn data_mode_is_active_only(&self) -> bool {
        !self.settings.passive_mode
    }
}

impl FtpSettings {
    fn use_tls_already_upgraded(&self) -> bool {
        false
    }
}

impl Task for FtpEngine {
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
            _ => {
                let data_moved = self.drive_data_channel();
                let control_moved = self.pump_control_io();
                if data_moved == StepResult::Moved || control_moved == StepResult::Moved {
                    StepResult::Moved
                } else {
                    StepResult::Stall
                }
            }
        }
    }

    fn interest(&self) -> Interest {
        if let Some(resolver) = &self.resolver {
            return resolver.interest();
        }
        if let Some(dialer) = &self.dialer {
            return Interest::writable(dialer.raw_fd());
        }
        if let DataChannel::Dialing(dialer) = &self.data {
            return Interest::writable(dialer.raw_fd());
        }
        if let DataChannel::Listening(listener, _) = &self.data {
            return Interest::readable(std::os::unix::io::AsRawFd::as_raw_fd(listener));
        }
        if let Some(control) = &self.control {
            if let Some(fd) = control.raw_fd() {
                return if self.out_buf.is_empty() { Interest::readable(fd) } else { Interest::writable(fd) };
            }
        }
        Interest::none()
    }
}

impl Session for FtpEngine {
    fn open(&mut self, path: &Path, mode: OpenMode, pos: u64) -> Outcome {
        if self.state.error.is_some() {
            return Outcome::Err(self.state.error.take().unwrap());
        }
        self.start_open(path, mode, pos);
        Outcome::InProgress
    }

    fn close(&mut self) -> Outcome {
        self.data = DataChannel::None;
        self.state.mode = OpenMode::Closed;
        Outcome::Ok
    }

    fn read(&mut self, max: usize) -> ReadOutcome {
        let DataChannel::Open(transport) = &mut self.data else { return ReadOutcome::Again };
        let mut buf = vec![0u8; max.min(self.read_chunk.len())];
        match transport.read(&mut buf) {
            Ok(0) => ReadOutcome::Eof,
            Ok(n) => {
                buf.truncate(n);
                if let Some(bucket) = &self.rate_limiter {
                    bucket.borrow_mut().register(n);
                }
                self.state.pos += n as i64;
                if self.state.real_pos >= 0 {
                    self.state.real_pos += n as i64;
                }
                ReadOutcome::Bytes(buf)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => ReadOutcome::Again,
            Err(e) => ReadOutcome::Err(XferError::SeeErrno { context: "read data channel".into(), source: e }),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, XferError> {
        let DataChannel::Open(transport) = &mut self.data else { return Ok(0) };
        match transport.write(bytes) {
            Ok(n) => {
                if let Some(bucket) = &self.rate_limiter {
                    bucket.borrow_mut().register(n);
                }
                self.state.pos += n as i64;
                if self.state.real_pos >= 0 {
                    self.state.real_pos += n as i64;
                }
                Ok(n)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(XferError::SeeErrno { context: "write data channel".into(), source: e }),
        }
    }

    fn store_status(&self) -> Outcome {
        self.done()
    }

    fn done(&self) -> Outcome {
        if let Some(error) = &self.state.error {
            return Outcome::Err(XferError::Fatal(error.to_string()));
        }
        match self.state.machine {
            Phase::Waiting | Phase::LoggedIn | Phase::Eof => Outcome::Ok,
            _ if self.state.mode == OpenMode::Closed => Outcome::Ok,
            _ => Outcome::InProgress,
        }
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Outcome {
        self.pending_path = Some(from.clone());
        self.pending_rename_to = Some(to.clone());
        self.state.mode = OpenMode::Rename;
        self.queue_command(ExpectationKind::Rnfr, format!("RNFR {from}"));
        Outcome::InProgress
    }

    fn mkdir(&mut self, path: &Path, _all_parents: bool) -> Outcome {
        self.state.mode = OpenMode::MakeDir;
        self.queue_command(ExpectationKind::FileAccess, format!("MKD {path}"));
        Outcome::InProgress
    }

    fn chdir(&mut self, path: &Path, _verify: bool) -> Outcome {
        self.state.mode = OpenMode::ChangeDir;
        self.pending_path = Some(path.clone());
        self.queue_command(ExpectationKind::Cwd, format!("CWD {path}"));
        Outcome::InProgress
    }

    fn chmod(&mut self, path: &Path, mode: u32) -> Outcome {
        self.state.mode = OpenMode::ChangeMode;
        self.queue_command(ExpectationKind::FileAccess, format!("SITE CHMOD {mode:o} {path}"));
        Outcome::InProgress
    }

    fn remove(&mut self, path: &Path) -> Outcome {
        self.state.mode = OpenMode::Remove;
        self.queue_command(ExpectationKind::FileAccess, format!("DELE {path}"));
        Outcome::InProgress
    }

    fn remove_dir(&mut self, path: &Path) -> Outcome {
        self.state.mode = OpenMode::RemoveDir;
        self.queue_command(ExpectationKind::FileAccess, format!("RMD {path}"));
        Outcome::InProgress
    }

    fn set_date(&mut self, date: SystemTime) {
        self.state.date = Some(date);
    }

    fn set_size(&mut self, size: u64) {
        self.state.size = Some(size);
    }

    fn want_size(&mut self) -> Option<u64> {
        self.state.size
    }

    fn want_date(&mut self) -> Option<SystemTime> {
        self.state.date
    }

    fn get_cwd(&self) -> &Path {
        &self.cwd
    }

    fn get_home(&self) -> Option<&Path> {
        self.home.as_ref()
    }

    fn ascii_transfer(&mut self, enabled: bool) {
        if self.ascii != enabled {
            self.ascii = enabled;
            let command = if enabled { "TYPE A" } else { "TYPE I" };
            self.queue_command(ExpectationKind::Type, command);
        }
    }

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
        self.caps.rest
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
        matches!(self.data, DataChannel::Open(_))
    }

    fn needs_size_date_beforehand(&self) -> bool {
        false
    }

    fn put_eof(&mut self) {
        self.data = DataChannel::None;
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
            proto: Proto::Ftp,
            host: "ftp.example.com".into(),
            port: 21,
            user: Some("anonymous".into()),
            password: Some("anon@".into()),
            home: None,
        }
    }

    #[test]
    fn fresh_engine_starts_disconnected() {
        let engine = FtpEngine::new(identity(), FtpSettings::default());
        assert!(!engine.is_connected());
        assert_eq!(engine.get_cwd(), &Path::parse("/"));
    }

    #[test]
    fn opening_a_file_marks_mode_in_progress() {
        let mut engine = FtpEngine::new(identity(), FtpSettings::default());
        let outcome = engine.open(&Path::parse("/pub/file.bin"), OpenMode::Retrieve, 0);
        assert!(outcome.is_in_progress());
        assert_eq!(engine.state.mode, OpenMode::Retrieve);
    }

    #[test]
    fn feat_reply_populates_capabilities() {
        let mut engine = FtpEngine::new(identity(), FtpSettings::default());
        let lines = vec![" MDTM".to_string(), " EPSV".to_string(), " UTF8".to_string()];
        engine.on_feat(&Reply { code: 211, lines });
        assert!(engine.caps.mdtm);
        assert!(engine.caps.epsv);
    }

    #[test]
    fn pwd_reply_sets_cwd_and_home() {
        let mut engine = FtpEngine::new(identity(), FtpSettings::default());
        engine.on_pwd(&Reply { code: 257, lines: vec![r#"257 "/home/anon" is current directory"#.to_string()] });
        assert_eq!(engine.get_cwd(), &Path::parse("/home/anon"));
        assert_eq!(engine.get_home(), Some(&Path::parse("/home/anon")));
    }
}
