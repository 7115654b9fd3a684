//! Parses a `FEAT` reply into the capability booleans the rest of the
//! engine consults before trying an optional command.

/// Server capabilities discovered via `FEAT`, plus the `AUTH` argument
/// list it advertised (e.g. `["TLS", "SSL"]`).
#[derive(Clone, Debug, Default)]
pub struct Capabilities {
    pub mdtm: bool,
    pub size: bool,
    pub rest: bool,
    pub mlst: bool,
    pub mlsd: bool,
    pub epsv: bool,
    pub pret: bool,
    pub clnt: bool,
    pub host: bool,
    pub lang: bool,
    pub utf8: bool,
    pub mfmt: bool,
    pub auth_tls: bool,
    pub auth_args: Vec<String>,
    pub cpsv: bool,
    pub sscn: bool,
    /// The MLST fact names the server advertised (narrowed further by
    /// `OPTS MLST` to the subset this engine parses).
    pub mlst_facts: Vec<String>,
}

impl Capabilities {
    /// Parses the continuation lines of a `FEAT` reply (each starting
    /// with a single space, per RFC 2389).
    #[must_use]
    pub fn parse(lines: &[String]) -> Self {
        let mut caps = Capabilities::default();
        for raw in lines {
            let line = raw.trim();
            let mut parts = line.splitn(2, ' ');
            let Some(verb) = parts.next() else { continue };
            let arg = parts.next().unwrap_or("").trim();
            match verb.to_ascii_uppercase().as_str() {
                "MDTM" => caps.mdtm = true,
                "SIZE" => caps.size = true,
                "REST" => caps.rest = true,
                "MLST" => {
                    caps.mlst = true;
                    caps.mlst_facts = arg.split(';').map(|s| s.trim().trim_end_matches('*').to_ascii_lowercase()).filter(|s| !s.is_empty()).collect();
                }
                "MLSD" => caps.mlsd = true,
                "EPSV" => caps.epsv = true,
                "PRET" => caps.pret = true,
                "CLNT" => caps.clnt = true,
                "HOST" => caps.host = true,
                "LANG" => caps.lang = true,
                "UTF8" => caps.utf8 = true,
                "MFMT" => caps.mfmt = true,
                "AUTH" => {
                    caps.auth_tls = true;
                    caps.auth_args = arg.split_whitespace().map(str::to_owned).collect();
                }
                "CPSV" => caps.cpsv = true,
                "SSCN" => caps.sscn = true,
                _ => {}
            }
        }
        caps
    }

    /// The MLST fact subset both the server advertises and this engine
    /// knows how to parse; used to build the `OPTS MLST` argument.
    #[must_use]
    pub fn supported_mlst_facts(&self) -> Vec<&str> {
        const KNOWN: [&str; 6] = ["type", "size", "modify", "perm", "unix.mode", "unix.owner"];
        self.mlst_facts.iter().map(String::as_str).filter(|f| KNOWN.contains(f)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_simple_capability_flags() {
        let caps = Capabilities::parse(&lines(&[" MDTM", " SIZE", " REST STREAM", " UTF8"]));
        assert!(caps.mdtm);
        assert!(caps.size);
        assert!(caps.rest);
        assert!(caps.utf8);
    }

    #[test]
    fn parses_auth_argument_list() {
        let caps = Capabilities::parse(&lines(&[" AUTH TLS SSL"]));
        assert!(caps.auth_tls);
        assert_eq!(caps.auth_args, vec!["TLS", "SSL"]);
    }

    #[test]
    fn parses_mlst_fact_list_and_narrows_to_supported() {
        let caps = Capabilities::parse(&lines(&[" MLST type*;size*;modify*;create;unix.mode;"]));
        assert!(caps.mlst);
        assert!(caps.mlst_facts.contains(&"type".to_string()));
        let supported = caps.supported_mlst_facts();
        assert!(supported.contains(&"type"));
        assert!(!supported.contains(&"create"));
    }
}
