//! Parses `PASV`/`EPSV`/`PORT`/`EPRT` replies and verifies a data peer
//! address against the control connection before trusting it.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use regex::Regex;
use std::sync::OnceLock;

/// Which mode the engine is currently trying for the data channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DataChannelMode {
    Passive,
    ExtendedPassive,
    Active,
    ExtendedActive,
}

/// Parses a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply.
pub fn parse_pasv(text: &str) -> Option<SocketAddr> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d+),(\d+),(\d+),(\d+),(\d+),(\d+)").unwrap());
    let caps = re.captures(text)?;
    let byte = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u8>().ok());
    let (a, b, c, d, p1, p2) = (byte(1)?, byte(2)?, byte(3)?, byte(4)?, byte(5)?, byte(6)?);
    let ip = IpAddr::V4(Ipv4Addr::new(a, b, c, d));
    let port = u16::from(p1) * 256 + u16::from(p2);
    Some(SocketAddr::new(ip, port))
}

/// Parses a `229 Entering Extended Passive Mode (|||port|)` reply. The
/// host is always the control connection's peer, per RFC 2428.
pub fn parse_epsv(text: &str) -> Option<u16> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\|\|\|(\d+)\|").unwrap());
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Builds the `PORT h1,h2,h3,h4,p1,p2` argument for an active-mode listen
/// socket bound to `addr`.
#[must_use]
pub fn format_port(addr: SocketAddr) -> Option<String> {
    let IpAddr::V4(ip) = addr.ip() else { return None };
    let [a, b, c, d] = ip.octets();
    let port = addr.port();
    Some(format!("{a},{b},{c},{d},{},{}", port / 256, port % 256))
}

/// Builds the `EPRT |1|addr|port|` argument (RFC 2428), `|2|` for IPv6.
#[must_use]
pub fn format_eprt(addr: SocketAddr) -> String {
    let proto = if addr.is_ipv4() { 1 } else { 2 };
    format!("|{proto}|{}|{}|", addr.ip(), addr.port())
}

/// Standard FTP data ports a verified peer address is additionally
/// allowed to connect from, besides the port the server just advertised.
const STANDARD_DATA_PORTS: [u16; 1] = [20];

/// Whether a connecting/connected data peer is acceptable: its IP must
/// match the control connection's peer (unless verification is disabled),
/// and its port must be the advertised one or a standard ftp-data port.
#[must_use]
pub fn verify_data_peer(
    control_peer_ip: IpAddr,
    data_peer: SocketAddr,
    advertised_port: Option<u16>,
    verify_address: bool,
) -> bool {
    if verify_address && data_peer.ip() != control_peer_ip {
        return false;
    }
    advertised_port.is_some_and(|p| p == data_peer.port()) || STANDARD_DATA_PORTS.contains(&data_peer.port())
}

/// Whether an advertised PASV/EPSV address should be substituted with the
/// control peer's address instead (`ignore-pasv-address`, `0.0.0.0`, or a
/// privacy-class mismatch between the advertised and control addresses).
#[must_use]
pub fn should_substitute_address(advertised: IpAddr, control_peer: IpAddr, ignore_pasv_address: bool) -> bool {
    ignore_pasv_address || advertised.is_unspecified() || privacy_class(advertised) != privacy_class(control_peer)
}

/// RFC 1918 / link-local vs globally routable, as a coarse proxy for "is
/// this the same kind of network as the control connection".
fn privacy_class(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pasv_address_and_port() {
        let addr = parse_pasv("227 Entering Passive Mode (192,168,1,5,19,136)").unwrap();
        assert_eq!(addr, "192.168.1.5:5000".parse().unwrap());
    }

    #[test]
    fn parses_epsv_port_only() {
        let port = parse_epsv("229 Entering Extended Passive Mode (|||6446|)").unwrap();
        assert_eq!(port, 6446);
    }

    #[test]
    fn formats_port_command_argument() {
        let addr: SocketAddr = "10.0.0.2:5001".parse().unwrap();
        assert_eq!(format_port(addr).unwrap(), "10,0,0,2,19,137");
    }

    #[test]
    fn formats_eprt_command_argument() {
        let addr: SocketAddr = "10.0.0.2:5001".parse().unwrap();
        assert_eq!(format_eprt(addr), "|1|10.0.0.2|5001|");
    }

    #[test]
    fn verify_rejects_mismatched_ip_when_enabled() {
        let control: IpAddr = "1.2.3.4".parse().unwrap();
        let data: SocketAddr = "5.6.7.8:20".parse().unwrap();
        assert!(!verify_data_peer(control, data, Some(20), true));
        assert!(verify_data_peer(control, data, Some(20), false));
    }

    #[test]
    fn verify_accepts_standard_data_port() {
        let control: IpAddr = "1.2.3.4".parse().unwrap();
        let data: SocketAddr = "1.2.3.4:20".parse().unwrap();
        assert!(verify_data_peer(control, data, Some(9999), true));
    }

    #[test]
    fn substitutes_unspecified_advertised_address() {
        let advertised: IpAddr = "0.0.0.0".parse().unwrap();
        let control: IpAddr = "1.2.3.4".parse().unwrap();
        assert!(should_substitute_address(advertised, control, false));
    }
}
