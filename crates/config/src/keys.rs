//! Typed views over [`crate::Settings`] for each key namespace. Every
//! field's doc comment names the raw key it resolves so the source stays
//! greppable by key name.

use std::time::Duration;

use crate::settings::Settings;

fn duration_secs(settings: &Settings, key: &str, closure: Option<&str>, default: u64) -> Duration {
    Duration::from_secs(settings.lookup_parsed(key, closure).unwrap_or(default))
}

fn flag(settings: &Settings, key: &str, closure: Option<&str>, default: bool) -> bool {
    settings.lookup_bool(key, closure).unwrap_or(default)
}

/// `net:*` — connection-lifecycle defaults shared by every protocol engine.
#[derive(Clone, Debug, PartialEq)]
pub struct NetConfig {
    /// `net:reconnect-interval-base`
    pub reconnect_interval_base: Duration,
    /// `net:reconnect-interval-multiplier`
    pub reconnect_interval_multiplier: f64,
    /// `net:reconnect-interval-max`
    pub reconnect_interval_max: Duration,
    /// `net:max-retries` (0 = unlimited)
    pub max_retries: u32,
    /// `net:persist-retries`
    pub persist_retries: u32,
    /// `net:socket-buffer`
    pub socket_buffer: Option<usize>,
    /// `net:socket-maxseg`
    pub socket_maxseg: Option<usize>,
    /// `net:connection-limit`
    pub connection_limit: u32,
    /// `net:connection-takeover`
    pub connection_takeover: bool,
    /// `net:timeout`
    pub timeout: Duration,
    /// `net:idle`
    pub idle: Duration,
    /// `net:no-proxy`
    pub no_proxy: Vec<String>,
}

impl NetConfig {
    #[must_use]
    pub fn from_settings(settings: &Settings, closure: Option<&str>) -> Self {
        Self {
            reconnect_interval_base: duration_secs(settings, "net:reconnect-interval-base", closure, 30),
            reconnect_interval_multiplier: settings
                .lookup_parsed("net:reconnect-interval-multiplier", closure)
                .unwrap_or(1.5),
            reconnect_interval_max: duration_secs(settings, "net:reconnect-interval-max", closure, 600),
            max_retries: settings.lookup_parsed("net:max-retries", closure).unwrap_or(0),
            persist_retries: settings.lookup_parsed("net:persist-retries", closure).unwrap_or(0),
            socket_buffer: settings.lookup_parsed("net:socket-buffer", closure),
            socket_maxseg: settings.lookup_parsed("net:socket-maxseg", closure),
            connection_limit: settings.lookup_parsed("net:connection-limit", closure).unwrap_or(0),
            connection_takeover: flag(settings, "net:connection-takeover", closure, true),
            timeout: duration_secs(settings, "net:timeout", closure, 600),
            idle: duration_secs(settings, "net:idle", closure, 600),
            no_proxy: settings
                .lookup("net:no-proxy", closure)
                .map(|v| v.split(',').map(str::to_owned).collect())
                .unwrap_or_default(),
        }
    }
}

/// `ftp:*` — the FTP/FTPS/HFTP engine.
#[derive(Clone, Debug, PartialEq)]
pub struct FtpConfig {
    pub sync_mode: bool,
    pub passive_mode: bool,
    pub use_abor: bool,
    pub use_quit: bool,
    pub use_site_idle: bool,
    pub use_site_chmod: bool,
    pub use_site_utime: bool,
    pub use_site_utime2: bool,
    pub use_mdtm: bool,
    pub use_mdtm_overloaded: bool,
    pub use_size: bool,
    pub use_pret: bool,
    pub use_feat: bool,
    pub use_mlsd: bool,
    pub use_stat: bool,
    pub use_stat_for_list: bool,
    pub use_telnet_iac: bool,
    pub use_allo: bool,
    pub use_hftp: bool,
    pub use_fxp: bool,
    pub fxp_passive_source: bool,
    pub retry_530: String,
    pub retry_530_anonymous: String,
    pub auto_sync_mode: String,
    pub auto_passive_mode: bool,
    pub bind_data_socket: bool,
    pub port_ipv4: Option<String>,
    pub port_range: Option<(u16, u16)>,
    pub ignore_pasv_address: bool,
    pub fix_pasv_address: bool,
    pub prefer_epsv: bool,
    pub nop_interval: Duration,
    pub rest_list: bool,
    pub rest_stor: bool,
    pub verify_address: bool,
    pub verify_port: bool,
    pub web_mode: bool,
    pub home: Option<String>,
    pub lang: Option<String>,
    pub charset: Option<String>,
    pub trust_feat: bool,
    pub ssl_allow: bool,
    pub ssl_force: bool,
    pub ssl_protect_data: bool,
    pub ssl_protect_list: bool,
    pub ssl_use_ccc: bool,
    pub waiting_150_timeout: Duration,
    pub abor_max_wait: Duration,
    pub stat_interval: Duration,
    pub initial_prot: char,
}

impl FtpConfig {
    #[must_use]
    pub fn from_settings(settings: &Settings, closure: Option<&str>) -> Self {
        Self {
            sync_mode: flag(settings, "ftp:sync-mode", closure, false),
            passive_mode: flag(settings, "ftp:passive-mode", closure, true),
            use_abor: flag(settings, "ftp:use-abor", closure, true),
            use_quit: flag(settings, "ftp:use-quit", closure, true),
            use_site_idle: flag(settings, "ftp:use-site-idle", closure, false),
            use_site_chmod: flag(settings, "ftp:use-site-chmod", closure, true),
            use_site_utime: flag(settings, "ftp:use-site-utime", closure, true),
            use_site_utime2: flag(settings, "ftp:use-site-utime2", closure, true),
            use_mdtm: flag(settings, "ftp:use-mdtm", closure, true),
            use_mdtm_overloaded: flag(settings, "ftp:use-mdtm-overloaded", closure, false),
            use_size: flag(settings, "ftp:use-size", closure, true),
            use_pret: flag(settings, "ftp:use-pret", closure, true),
            use_feat: flag(settings, "ftp:use-feat", closure, true),
            use_mlsd: flag(settings, "ftp:use-mlsd", closure, true),
            use_stat: flag(settings, "ftp:use-stat", closure, true),
            use_stat_for_list: flag(settings, "ftp:use-stat-for-list", closure, false),
            use_telnet_iac: flag(settings, "ftp:use-telnet-iac", closure, true),
            use_allo: flag(settings, "ftp:use-allo", closure, false),
            use_hftp: flag(settings, "ftp:use-hftp", closure, false),
            use_fxp: flag(settings, "ftp:use-fxp", closure, false),
            fxp_passive_source: flag(settings, "ftp:fxp-passive-source", closure, true),
            retry_530: settings
                .lookup("ftp:retry-530", closure)
                .unwrap_or("Login incorrect|Login authentication failed")
                .to_owned(),
            retry_530_anonymous: settings
                .lookup("ftp:retry-530-anonymous", closure)
                .unwrap_or("Too many")
                .to_owned(),
            auto_sync_mode: settings
                .lookup("ftp:auto-sync-mode", closure)
                .unwrap_or("Turning off sync-mode")
                .to_owned(),
            auto_passive_mode: flag(settings, "ftp:auto-passive-mode", closure, true),
            bind_data_socket: flag(settings, "ftp:bind-data-socket", closure, true),
            port_ipv4: settings.lookup("ftp:port-ipv4", closure).map(str::to_owned),
            port_range: settings.lookup("ftp:port-range", closure).and_then(parse_port_range),
            ignore_pasv_address: flag(settings, "ftp:ignore-pasv-address", closure, false),
            fix_pasv_address: flag(settings, "ftp:fix-pasv-address", closure, true),
            prefer_epsv: flag(settings, "ftp:prefer-epsv", closure, true),
            nop_interval: duration_secs(settings, "ftp:nop-interval", closure, 120),
            rest_list: flag(settings, "ftp:rest-list", closure, false),
            rest_stor: flag(settings, "ftp:rest-stor", closure, true),
            verify_address: flag(settings, "ftp:verify-address", closure, true),
            verify_port: flag(settings, "ftp:verify-port", closure, false),
            web_mode: flag(settings, "ftp:web-mode", closure, false),
            home: settings.lookup("ftp:home", closure).map(str::to_owned),
            lang: settings.lookup("ftp:lang", closure).map(str::to_owned),
            charset: settings.lookup("ftp:charset", closure).map(str::to_owned),
            trust_feat: flag(settings, "ftp:trust-feat", closure, true),
            ssl_allow: flag(settings, "ftp:ssl-allow", closure, true),
            ssl_force: flag(settings, "ftp:ssl-force", closure, false),
            ssl_protect_data: flag(settings, "ftp:ssl-protect-data", closure, true),
            ssl_protect_list: flag(settings, "ftp:ssl-protect-list", closure, true),
            ssl_use_ccc: flag(settings, "ftp:ssl-use-ccc", closure, false),
            waiting_150_timeout: duration_secs(settings, "ftp:waiting-150-timeout", closure, 120),
            abor_max_wait: duration_secs(settings, "ftp:abor-max-wait", closure, 5),
            stat_interval: duration_secs(settings, "ftp:stat-interval", closure, 1),
            initial_prot: settings
                .lookup("ftp:initial-prot", closure)
                .and_then(|s| s.chars().next())
                .unwrap_or('C'),
        }
    }
}

fn parse_port_range(text: &str) -> Option<(u16, u16)> {
    let (lo, hi) = text.split_once('-')?;
    Some((lo.trim().parse().ok()?, hi.trim().parse().ok()?))
}

/// `http:*` / `https:*` / `hftp:*` — the HTTP/WebDAV engine.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpConfig {
    pub cache: bool,
    pub cache_control: Option<String>,
    pub cookie: bool,
    pub set_cookies: bool,
    pub use_propfind: bool,
    pub use_mkcol: bool,
    pub user_agent: String,
    pub referer: Option<String>,
    pub accept: Option<String>,
    pub accept_language: Option<String>,
    pub accept_charset: Option<String>,
    pub authorization: Option<String>,
    pub put_method: String,
    pub put_content_type: Option<String>,
    pub post_content_type: Option<String>,
    pub proxy: Option<String>,
}

impl HttpConfig {
    #[must_use]
    pub fn from_settings(settings: &Settings, closure: Option<&str>) -> Self {
        Self {
            cache: flag(settings, "http:cache", closure, true),
            cache_control: settings.lookup("http:cache-control", closure).map(str::to_owned),
            cookie: flag(settings, "http:cookie", closure, false),
            set_cookies: flag(settings, "http:set-cookies", closure, true),
            use_propfind: flag(settings, "http:use-propfind", closure, true),
            use_mkcol: flag(settings, "http:use-mkcol", closure, true),
            user_agent: settings
                .lookup("http:user-agent", closure)
                .unwrap_or("xfer-core/0.1")
                .to_owned(),
            referer: settings.lookup("http:referer", closure).map(str::to_owned),
            accept: settings.lookup("http:accept", closure).map(str::to_owned),
            accept_language: settings.lookup("http:accept-language", closure).map(str::to_owned),
            accept_charset: settings.lookup("http:accept-charset", closure).map(str::to_owned),
            authorization: settings.lookup("http:authorization", closure).map(str::to_owned),
            put_method: settings.lookup("http:put-method", closure).unwrap_or("PUT").to_owned(),
            put_content_type: settings.lookup("http:put-content-type", closure).map(str::to_owned),
            post_content_type: settings.lookup("http:post-content-type", closure).map(str::to_owned),
            proxy: settings
                .lookup("https:proxy", closure)
                .or_else(|| settings.lookup("http:proxy", closure))
                .map(str::to_owned),
        }
    }
}

/// `sftp:*` — the SFTP engine.
#[derive(Clone, Debug, PartialEq)]
pub struct SftpConfig {
    pub charset: Option<String>,
    pub max_packets_in_flight: u32,
    pub size_read: usize,
    pub size_write: usize,
    pub protocol_version: u32,
    pub connect_program: Vec<String>,
    pub server_program: String,
    pub auto_confirm: bool,
}

impl SftpConfig {
    #[must_use]
    pub fn from_settings(settings: &Settings, closure: Option<&str>) -> Self {
        Self {
            charset: settings.lookup("sftp:charset", closure).map(str::to_owned),
            max_packets_in_flight: settings.lookup_parsed("sftp:max-packets-in-flight", closure).unwrap_or(16),
            size_read: settings.lookup_parsed("sftp:size-read", closure).unwrap_or(32 * 1024),
            size_write: settings.lookup_parsed("sftp:size-write", closure).unwrap_or(32 * 1024),
            protocol_version: settings.lookup_parsed("sftp:protocol-version", closure).unwrap_or(3),
            connect_program: settings
                .lookup("sftp:connect-program", closure)
                .map(|v| v.split_whitespace().map(str::to_owned).collect())
                .unwrap_or_else(|| vec!["ssh".to_owned(), "-a".to_owned(), "-x".to_owned()]),
            server_program: settings.lookup("sftp:server-program", closure).unwrap_or("sftp").to_owned(),
            auto_confirm: flag(settings, "sftp:auto-confirm", closure, false),
        }
    }
}

/// `fish:*` — the FISH engine.
#[derive(Clone, Debug, PartialEq)]
pub struct FishConfig {
    pub charset: Option<String>,
    pub auto_confirm: bool,
}

impl FishConfig {
    #[must_use]
    pub fn from_settings(settings: &Settings, closure: Option<&str>) -> Self {
        Self {
            charset: settings.lookup("fish:charset", closure).map(str::to_owned),
            auto_confirm: flag(settings, "fish:auto-confirm", closure, false),
        }
    }
}

/// `xfer:*` — copy-pipeline tuning.
#[derive(Clone, Debug, PartialEq)]
pub struct XferConfig {
    pub rate_period: Duration,
    pub eta_period: Duration,
    pub max_redirections: u32,
}

impl XferConfig {
    #[must_use]
    pub fn from_settings(settings: &Settings, closure: Option<&str>) -> Self {
        Self {
            rate_period: duration_secs(settings, "xfer:rate-period", closure, 30),
            eta_period: duration_secs(settings, "xfer:eta-period", closure, 120),
            max_redirections: settings.lookup_parsed("xfer:max-redirections", closure).unwrap_or(5),
        }
    }
}

/// `cache:*` — the response cache.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheConfig {
    pub enable: bool,
    pub size: usize,
    pub expire: Duration,
}

impl CacheConfig {
    #[must_use]
    pub fn from_settings(settings: &Settings, closure: Option<&str>) -> Self {
        Self {
            enable: flag(settings, "cache:enable", closure, true),
            size: settings.lookup_parsed("cache:size", closure).unwrap_or(1 << 20),
            expire: duration_secs(settings, "cache:expire", closure, 3600),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn net_config_uses_compiled_defaults() {
        let settings = Settings::new();
        let net = NetConfig::from_settings(&settings, None);
        assert_eq!(net.timeout, Duration::from_secs(600));
        assert_eq!(net.max_retries, 0);
    }

    #[test]
    fn ftp_config_honors_closure_override() {
        let mut settings = Settings::new();
        settings.set_for_closure("ftp:passive-mode", "strict.example.com", "no");
        let ftp = FtpConfig::from_settings(&settings, Some("strict.example.com"));
        assert!(!ftp.passive_mode);
        let ftp_default = FtpConfig::from_settings(&settings, Some("other.example.com"));
        assert!(ftp_default.passive_mode);
    }

    #[test]
    fn sftp_connect_program_defaults_match_spec() {
        let settings = Settings::new();
        let sftp = SftpConfig::from_settings(&settings, None);
        assert_eq!(sftp.connect_program, vec!["ssh", "-a", "-x"]);
    }

    #[test]
    fn port_range_parses_lo_hi() {
        let mut settings = Settings::new();
        settings.set_default("ftp:port-range", "60000-61000");
        let ftp = FtpConfig::from_settings(&settings, None);
        assert_eq!(ftp.port_range, Some((60000, 61000)));
    }
}
