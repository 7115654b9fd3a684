//! # Overview
//!
//! [`Path`] models the ordered-component path described in the core data
//! model: a sequence of components plus the three attributes that let a
//! single representation tolerate POSIX, DOS/VMS, and UNC roots without a
//! separate type per remote filesystem flavor.
//!
//! # Invariants
//!
//! - A path with `is_file = false` never has a trailing empty component; a
//!   path with `is_file = true` always has a non-empty last component.
//! - [`Path::optimize`] is idempotent and never crosses a `Root::Device`
//!   boundary or the synthetic `~` boundary of a home-relative path.
//! - `p.change(x).change(y) == p.change(&format!("{x}/{y}"))` whenever `x`
//!   and `y` are slash-joinable and neither ascends above the prefix; this
//!   holds because [`Path::change`] never collapses `..` itself (that is
//!   [`Path::optimize`]'s job), so concatenation stays associative.

use std::fmt;

/// The root anchor of a [`Path`].
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Root {
    /// No leading slash; resolved against a session's current directory.
    Relative,
    /// A single leading `/`.
    Absolute,
    /// A double leading slash, e.g. `//host/share` (UNC-style).
    Unc,
    /// A DOS (`C:`) or VMS (`SYS$DISK:[...]`) device prefix, stored
    /// verbatim so it round-trips even though this crate does not
    /// interpret its syntax.
    Device(String),
}

impl Root {
    /// The `device_prefix_len` attribute from the data model: the byte
    /// length of the verbatim prefix, or 0 for anything but [`Root::Device`].
    #[must_use]
    pub fn device_prefix_len(&self) -> usize {
        match self {
            Root::Device(prefix) => prefix.len(),
            _ => 0,
        }
    }
}

/// An ordered path over protocol-agnostic components.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Path {
    root: Root,
    components: Vec<String>,
    is_file: bool,
    canonical_url: Option<String>,
}

impl Path {
    /// Builds a path from raw parts without any parsing or validation.
    #[must_use]
    pub fn from_parts(root: Root, components: Vec<String>, is_file: bool) -> Self {
        Self {
            root,
            components,
            is_file,
            canonical_url: None,
        }
    }

    /// Parses `text` into a [`Path`], recognizing `/`, `//`, a `~` prefix,
    /// and a DOS/VMS-style device prefix (anything before the first `/`
    /// or `[` that ends in `:`).
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let is_file = !text.is_empty() && !text.ends_with('/');

        if let Some(rest) = text.strip_prefix("//") {
            return Self {
                root: Root::Unc,
                components: split_components(rest),
                is_file,
                canonical_url: None,
            };
        }
        if let Some(rest) = text.strip_prefix('/') {
            return Self {
                root: Root::Absolute,
                components: split_components(rest),
                is_file,
                canonical_url: None,
            };
        }
        if let Some(prefix_end) = device_prefix_end(text) {
            let (prefix, rest) = text.split_at(prefix_end);
            return Self {
                root: Root::Device(prefix.to_owned()),
                components: split_components(rest.trim_start_matches('/')),
                is_file,
                canonical_url: None,
            };
        }
        Self {
            root: Root::Relative,
            components: split_components(text),
            is_file,
            canonical_url: None,
        }
    }

    /// Attaches a canonical URL form to this path (e.g. the full
    /// `ftp://user@host/path` the path was derived from).
    #[must_use]
    pub fn with_canonical_url(mut self, url: impl Into<String>) -> Self {
        self.canonical_url = Some(url.into());
        self
    }

    /// The canonical URL form, if one was attached.
    #[must_use]
    pub fn canonical_url(&self) -> Option<&str> {
        self.canonical_url.as_deref()
    }

    /// Whether the path names a file (vs. a directory).
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.is_file
    }

    /// The `device_prefix_len` attribute.
    #[must_use]
    pub fn device_prefix_len(&self) -> usize {
        self.root.device_prefix_len()
    }

    /// The path's root anchor.
    #[must_use]
    pub fn root(&self) -> &Root {
        &self.root
    }

    /// The ordered path components, excluding the root.
    #[must_use]
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// The final component, if any (the file or directory name).
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// The parent directory of this path (drops the final component).
    #[must_use]
    pub fn dirname(&self) -> Path {
        let mut components = self.components.clone();
        components.pop();
        Path {
            root: self.root.clone(),
            components,
            is_file: false,
            canonical_url: None,
        }
    }

    fn is_home_relative(&self) -> bool {
        matches!(self.root, Root::Relative) && self.components.first().is_some_and(|c| c == "~")
    }

    /// Removes `.` components and collapses `..` wherever doing so does
    /// not cross a device prefix or the `~` boundary of a home-relative
    /// path. Absolute/UNC/device-rooted leading `..` are simply dropped
    /// (there is nowhere to ascend to); relative and home-relative leading
    /// `..` are preserved verbatim.
    #[must_use]
    pub fn optimize(&self) -> Path {
        let protect_home = self.is_home_relative();
        let absorbs_leading_dotdot = matches!(self.root, Root::Absolute | Root::Unc | Root::Device(_));

        let mut out: Vec<String> = Vec::with_capacity(self.components.len());
        for component in &self.components {
            if component == "." {
                continue;
            }
            if component == ".." {
                let can_pop = match out.last() {
                    Some(last) if last != ".." => !(protect_home && out.len() == 1),
                    _ => false,
                };
                if can_pop {
                    out.pop();
                } else if absorbs_leading_dotdot && out.is_empty() {
                    // Nothing above the root; `..` is a no-op.
                } else {
                    out.push("..".to_owned());
                }
                continue;
            }
            out.push(component.clone());
        }

        Path {
            root: self.root.clone(),
            components: out,
            is_file: self.is_file,
            canonical_url: self.canonical_url.clone(),
        }
    }

    /// Composes a new path given a relative or absolute `rel` input,
    /// matching the shell semantics of `cd`: an absolute/UNC/device/`~`
    /// `rel` replaces the whole path; otherwise `rel`'s components are
    /// appended after dropping this path's file component (if any).
    #[must_use]
    pub fn change(&self, rel: &str) -> Path {
        if rel.is_empty() {
            return self.clone();
        }
        if rel.starts_with('/') || rel.starts_with('~') || device_prefix_end(rel).is_some() {
            return Path::parse(rel);
        }

        let mut components = if self.is_file {
            let mut c = self.components.clone();
            c.pop();
            c
        } else {
            self.components.clone()
        };
        components.extend(split_components(rel));

        Path {
            root: self.root.clone(),
            components,
            is_file: !rel.ends_with('/'),
            canonical_url: None,
        }
    }

    /// Replaces a leading `~` component with `home`'s components and root,
    /// preserving this path's trailing-slash (file/directory) semantics.
    #[must_use]
    pub fn expand_tilde(&self, home: &Path) -> Path {
        if !self.is_home_relative() {
            return self.clone();
        }
        let mut components = home.components.clone();
        components.extend(self.components.iter().skip(1).cloned());
        Path {
            root: home.root.clone(),
            components,
            is_file: self.is_file,
            canonical_url: None,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            Root::Relative => {}
            Root::Absolute => write!(f, "/")?,
            Root::Unc => write!(f, "//")?,
            Root::Device(prefix) => write!(f, "{prefix}")?,
        }
        write!(f, "{}", self.components.join("/"))?;
        if !self.is_file && !self.components.is_empty() {
            write!(f, "/")?;
        }
        Ok(())
    }
}

fn split_components(text: &str) -> Vec<String> {
    text.split('/').filter(|s| !s.is_empty()).map(str::to_owned).collect()
}

/// Returns the byte offset just past a DOS (`C:`) or VMS (`SYS$DISK:[`)
/// style device prefix, or `None` if `text` has neither.
fn device_prefix_end(text: &str) -> Option<usize> {
    let colon = text.find(':')?;
    let prefix = &text[..colon];
    if prefix.is_empty() {
        return None;
    }
    if prefix.chars().all(|c| c.is_ascii_alphabetic()) && prefix.len() <= 2 {
        // DOS drive letter, e.g. "C:".
        return Some(colon + 1);
    }
    if prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '$' || c == '_') {
        // VMS device, e.g. "SYS$DISK:".
        return Some(colon + 1);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimize_collapses_dot_and_dotdot() {
        let p = Path::parse("/a/./b/../c");
        assert_eq!(p.optimize().to_string(), "/a/c");
    }

    #[test]
    fn optimize_is_idempotent() {
        let p = Path::parse("/a/./b/../../c/d/..");
        let once = p.optimize();
        let twice = once.optimize();
        assert_eq!(once, twice);
    }

    #[test]
    fn optimize_never_ascends_above_home() {
        let p = Path::parse("~/../x");
        assert_eq!(p.optimize().to_string(), "~/../x");
    }

    #[test]
    fn optimize_preserves_unc_prefix() {
        let p = Path::parse("//host/dir");
        assert_eq!(p.optimize().to_string(), "//host/dir");
    }

    #[test]
    fn optimize_drops_leading_dotdot_above_absolute_root() {
        let p = Path::parse("/../etc");
        assert_eq!(p.optimize().to_string(), "/etc");
    }

    #[test]
    fn change_is_associative_with_concatenation() {
        let base = Path::parse("/home/user/");
        let direct = base.change("a/b");
        let chained = base.change("a").change("b");
        assert_eq!(direct, chained);
    }

    #[test]
    fn change_with_absolute_replaces_path() {
        let base = Path::parse("/home/user/file.txt");
        let changed = base.change("/etc/passwd");
        assert_eq!(changed.to_string(), "/etc/passwd");
        assert!(changed.is_file());
    }

    #[test]
    fn change_drops_file_component_of_base() {
        let base = Path::parse("/home/user/file.txt");
        let changed = base.change("sibling.txt");
        assert_eq!(changed.to_string(), "/home/user/sibling.txt");
    }

    #[test]
    fn device_prefix_round_trips() {
        let p = Path::parse("C:/Windows/System32/");
        assert_eq!(p.device_prefix_len(), 2);
        assert_eq!(p.to_string(), "C:Windows/System32/");
    }

    #[test]
    fn expand_tilde_preserves_trailing_slash() {
        let home = Path::parse("/home/user");
        let p = Path::parse("~/docs/");
        let expanded = p.expand_tilde(&home);
        assert_eq!(expanded.to_string(), "/home/user/docs/");
        assert!(!expanded.is_file());
    }

    #[test]
    fn is_file_requires_nonempty_component() {
        let dir = Path::parse("/a/b/");
        assert!(!dir.is_file());
        let file = Path::parse("/a/b");
        assert!(file.is_file());
    }
}
