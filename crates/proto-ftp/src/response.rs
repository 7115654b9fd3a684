//! Accumulates raw control-channel bytes into complete FTP replies: a
//! three-digit code, optional continuation lines (`NNN-...` until a line
//! starting `NNN ` is seen), and the text.

/// A complete, possibly multi-line, server reply.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    #[must_use]
    pub fn is_preliminary(&self) -> bool {
        self.code / 100 == 1
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.code / 100, 2 | 3)
    }

    #[must_use]
    pub fn is_transient_failure(&self) -> bool {
        self.code / 100 == 4
    }

    #[must_use]
    pub fn is_permanent_failure(&self) -> bool {
        self.code / 100 == 5
    }
}

/// Feeds raw lines (already split on `\r\n` or `\n`) into a reply, tracking
/// the continuation state across calls so a multi-line reply split across
/// several reads reassembles correctly.
#[derive(Default)]
pub struct ReplyAccumulator {
    code: Option<u16>,
    lines: Vec<String>,
}

impl ReplyAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line (without its line terminator). Returns `Some(reply)`
    /// once the reply is complete.
    pub fn feed_line(&mut self, line: &str) -> Option<Reply> {
        match self.code {
            None => {
                let (code, is_multi) = parse_first_line(line)?;
                self.lines.push(line.to_owned());
                if is_multi {
                    self.code = Some(code);
                    None
                } else {
                    Some(Reply { code, lines: std::mem::take(&mut self.lines) })
                }
            }
            Some(code) => {
                self.lines.push(line.to_owned());
                if is_terminator(line, code) {
                    self.code = None;
                    Some(Reply { code, lines: std::mem::take(&mut self.lines) })
                } else {
                    None
                }
            }
        }
    }
}

fn parse_first_line(line: &str) -> Option<(u16, bool)> {
    if line.len() < 3 {
        return None;
    }
    let code = line[..3].parse::<u16>().ok()?;
    let is_multi = line.as_bytes().get(3) == Some(&b'-');
    Some((code, is_multi))
}

fn is_terminator(line: &str, code: u16) -> bool {
    line.len() >= 4 && line.as_bytes()[3] == b' ' && line[..3].parse::<u16>() == Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_reply_completes_immediately() {
        let mut acc = ReplyAccumulator::new();
        let reply = acc.feed_line("230 Logged in").unwrap();
        assert_eq!(reply.code, 230);
        assert_eq!(reply.lines, vec!["230 Logged in"]);
    }

    #[test]
    fn multi_line_reply_waits_for_terminator() {
        let mut acc = ReplyAccumulator::new();
        assert!(acc.feed_line("220-Welcome").is_none());
        assert!(acc.feed_line("220-line two").is_none());
        let reply = acc.feed_line("220 ready").unwrap();
        assert_eq!(reply.code, 220);
        assert_eq!(reply.lines.len(), 3);
    }

    #[test]
    fn terminator_requires_matching_code() {
        let mut acc = ReplyAccumulator::new();
        assert!(acc.feed_line("257-has (quotes)").is_none());
        assert!(acc.feed_line("250 not the terminator").is_none());
        let reply = acc.feed_line("257 End").unwrap();
        assert_eq!(reply.lines.len(), 3);
    }

    #[test]
    fn classifies_reply_code_classes() {
        let ok = Reply { code: 226, lines: vec![] };
        assert!(ok.is_success());
        let transient = Reply { code: 450, lines: vec![] };
        assert!(transient.is_transient_failure());
        let permanent = Reply { code: 550, lines: vec![] };
        assert!(permanent.is_permanent_failure());
    }
}
