//! # Overview
//!
//! [`FileMeta`] is the per-entry metadata record described in the data
//! model: every optional field is tracked through an explicit "defined"
//! bitmap rather than relying on `Option` alone to distinguish "unknown"
//! from "zero", matching how MLSD/SFTP attribute bits and plain `LIST`
//! parsing report different subsets of fields per server.

use std::time::SystemTime;

/// The kind of filesystem entry a [`FileMeta`] describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FileKind {
    File,
    Dir,
    Symlink,
    Special,
    Unknown,
}

bitflags::bitflags! {
    /// Which optional [`FileMeta`] fields are actually populated.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct DefinedFlags: u16 {
        const SIZE = 1 << 0;
        const MTIME = 1 << 1;
        const MODE = 1 << 2;
        const OWNER = 1 << 3;
        const GROUP = 1 << 4;
        const NLINK = 1 << 5;
        const SYMLINK_TARGET = 1 << 6;
    }
}

/// Timestamp precision, since some listings only give whole minutes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MtimePrecision {
    Seconds,
    Minutes,
    Nanoseconds,
}

/// A single directory-listing entry.
#[derive(Clone, Debug, PartialEq)]
pub struct FileMeta {
    pub name: String,
    pub kind: FileKind,
    defined: DefinedFlags,
    size: u64,
    mtime: Option<SystemTime>,
    mtime_precision: MtimePrecision,
    mode: u16,
    owner: Option<String>,
    group: Option<String>,
    nlink: u32,
    symlink_target: Option<String>,
}

impl FileMeta {
    /// Creates a bare entry with only `name` and `kind` known.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FileKind) -> Self {
        Self {
            name: name.into(),
            kind,
            defined: DefinedFlags::empty(),
            size: 0,
            mtime: None,
            mtime_precision: MtimePrecision::Seconds,
            mode: 0,
            owner: None,
            group: None,
            nlink: 0,
            symlink_target: None,
        }
    }

    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self.defined.insert(DefinedFlags::SIZE);
        self
    }

    #[must_use]
    pub fn with_mtime(mut self, mtime: SystemTime, precision: MtimePrecision) -> Self {
        self.mtime = Some(mtime);
        self.mtime_precision = precision;
        self.defined.insert(DefinedFlags::MTIME);
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: u16) -> Self {
        self.mode = mode & 0o7777;
        self.defined.insert(DefinedFlags::MODE);
        self
    }

    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self.defined.insert(DefinedFlags::OWNER);
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self.defined.insert(DefinedFlags::GROUP);
        self
    }

    #[must_use]
    pub fn with_nlink(mut self, nlink: u32) -> Self {
        self.nlink = nlink;
        self.defined.insert(DefinedFlags::NLINK);
        self
    }

    #[must_use]
    pub fn with_symlink_target(mut self, target: impl Into<String>) -> Self {
        self.symlink_target = Some(target.into());
        self.defined.insert(DefinedFlags::SYMLINK_TARGET);
        self
    }

    #[must_use]
    pub fn defined(&self) -> DefinedFlags {
        self.defined
    }

    #[must_use]
    pub fn size(&self) -> Option<u64> {
        self.defined.contains(DefinedFlags::SIZE).then_some(self.size)
    }

    #[must_use]
    pub fn mtime(&self) -> Option<(SystemTime, MtimePrecision)> {
        self.mtime.map(|t| (t, self.mtime_precision))
    }

    #[must_use]
    pub fn mode(&self) -> Option<u16> {
        self.defined.contains(DefinedFlags::MODE).then_some(self.mode)
    }

    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    #[must_use]
    pub fn nlink(&self) -> Option<u32> {
        self.defined.contains(DefinedFlags::NLINK).then_some(self.nlink)
    }

    #[must_use]
    pub fn symlink_target(&self) -> Option<&str> {
        self.symlink_target.as_deref()
    }

    /// Merges `other`'s defined fields on top of `self`, keeping `self`'s
    /// value for any field `other` does not define. Used when a cheap
    /// listing (e.g. plain `LIST`) is later augmented by a targeted `SIZE`
    /// or `MDTM` fetch.
    #[must_use]
    pub fn merged_with(mut self, other: &FileMeta) -> Self {
        if other.defined.contains(DefinedFlags::SIZE) {
            self.size = other.size;
            self.defined.insert(DefinedFlags::SIZE);
        }
        if other.defined.contains(DefinedFlags::MTIME) {
            self.mtime = other.mtime;
            self.mtime_precision = other.mtime_precision;
            self.defined.insert(DefinedFlags::MTIME);
        }
        if other.defined.contains(DefinedFlags::MODE) {
            self.mode = other.mode;
            self.defined.insert(DefinedFlags::MODE);
        }
        if other.defined.contains(DefinedFlags::OWNER) {
            self.owner = other.owner.clone();
            self.defined.insert(DefinedFlags::OWNER);
        }
        if other.defined.contains(DefinedFlags::GROUP) {
            self.group = other.group.clone();
            self.defined.insert(DefinedFlags::GROUP);
        }
        if other.defined.contains(DefinedFlags::NLINK) {
            self.nlink = other.nlink;
            self.defined.insert(DefinedFlags::NLINK);
        }
        if other.defined.contains(DefinedFlags::SYMLINK_TARGET) {
            self.symlink_target = other.symlink_target.clone();
            self.defined.insert(DefinedFlags::SYMLINK_TARGET);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_fields_read_as_none() {
        let meta = FileMeta::new("a", FileKind::File);
        assert_eq!(meta.size(), None);
        assert_eq!(meta.mode(), None);
    }

    #[test]
    fn builder_marks_fields_defined() {
        let meta = FileMeta::new("a", FileKind::File).with_size(42).with_mode(0o644);
        assert_eq!(meta.size(), Some(42));
        assert_eq!(meta.mode(), Some(0o644));
        assert!(meta.defined().contains(DefinedFlags::SIZE | DefinedFlags::MODE));
    }

    #[test]
    fn merge_keeps_base_value_when_other_undefined() {
        let base = FileMeta::new("a", FileKind::File).with_size(10).with_mode(0o600);
        let patch = FileMeta::new("a", FileKind::File).with_size(20);
        let merged = base.merged_with(&patch);
        assert_eq!(merged.size(), Some(20));
        assert_eq!(merged.mode(), Some(0o600));
    }
}
