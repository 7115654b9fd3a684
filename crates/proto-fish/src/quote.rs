//! Backslash-quoting for arguments interpolated into the remote shell
//! command line. The metacharacter set matches what a POSIX `sh` treats
//! specially: reserved words, expansion characters, globbing characters,
//! IFS whitespace, and quoting characters themselves.

/// Escapes every shell metacharacter in `text` with a leading backslash.
/// `~` and `#` are only escaped at the start of the string, where they'd
/// otherwise trigger tilde expansion or start a comment.
#[must_use]
pub fn shell_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for (i, c) in text.chars().enumerate() {
        match c {
            '\'' | '(' | ')' | '!' | '{' | '}' | '^' | '$' | '`' | '*' | '[' | '?' | ']' | ' ' | '\t' | '\n' | '"'
            | '\\' | '|' | '&' | ';' | '<' | '>' => {
                out.push('\\');
                out.push(c);
            }
            '~' | '#' if i == 0 => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_path_is_unchanged() {
        assert_eq!(shell_encode("/pub/file.bin"), "/pub/file.bin");
    }

    #[test]
    fn spaces_and_quotes_are_escaped() {
        assert_eq!(shell_encode("a b'c"), r"a\ b\'c");
    }

    #[test]
    fn leading_tilde_is_escaped_but_interior_is_not() {
        assert_eq!(shell_encode("~/a~b"), r"\~/a~b");
    }
}
