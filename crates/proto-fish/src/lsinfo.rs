//! Extracts a file's size from the `ls -lLd`/`ls -lL` preamble the
//! `RETR`/`INFO` commands prefix onto their output, so a retrieve knows
//! the size before a single data byte has arrived.

const MONTHS: [&str; 12] =
    ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];

/// `message` is either a bare number (some shells' `ls` is configured to
/// print only the size) or a standard `ls -l` line; either way this
/// extracts the size field.
#[must_use]
pub fn parse_size(message: &str) -> Option<u64> {
    let trimmed = message.trim();
    if let Ok(size) = trimmed.parse::<u64>() {
        return Some(size);
    }
    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    let month_index = fields.iter().position(|f| MONTHS.contains(f))?;
    let size_index = month_index.checked_sub(1)?;
    fields.get(size_index)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_number_is_the_size() {
        assert_eq!(parse_size("4096"), Some(4096));
    }

    #[test]
    fn standard_ls_line_extracts_the_size_field() {
        let line = "-rw-r--r-- 1 user group 123456 Jan  1 00:00 file.bin";
        assert_eq!(parse_size(line), Some(123456));
    }

    #[test]
    fn unparseable_text_yields_none() {
        assert_eq!(parse_size("No such file or directory"), None);
    }
}
