//! [`FileSet`] is an ordered, name-keyed collection of [`FileMeta`] records
//! with merge and sort operators, backing both directory listings and
//! cached listing entries.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::meta::FileMeta;

/// How a [`FileSet`] should be ordered for presentation or comparison.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SortOrder {
    ByName,
    BySize,
    ByDate,
    DirsFirst,
}

/// An ordered set of [`FileMeta`] records keyed by name.
#[derive(Clone, Debug, Default)]
pub struct FileSet {
    entries: BTreeMap<String, FileMeta>,
}

impl FileSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, meta: FileMeta) {
        self.entries.insert(meta.name.clone(), meta);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FileMeta> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges `other` into `self`: entries present in both are combined
    /// field-by-field via [`FileMeta::merged_with`]; entries only in
    /// `other` are added as-is.
    pub fn merge(&mut self, other: &FileSet) {
        for (name, meta) in &other.entries {
            match self.entries.remove(name) {
                Some(existing) => self.entries.insert(name.clone(), existing.merged_with(meta)),
                None => self.entries.insert(name.clone(), meta.clone()),
            };
        }
    }

    /// Returns the entries ordered per `order`.
    #[must_use]
    pub fn sorted(&self, order: SortOrder) -> Vec<&FileMeta> {
        let mut items: Vec<&FileMeta> = self.entries.values().collect();
        items.sort_by(|a, b| compare(a, b, order));
        items
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileMeta> {
        self.entries.values()
    }
}

fn compare(a: &FileMeta, b: &FileMeta, order: SortOrder) -> Ordering {
    match order {
        SortOrder::ByName => a.name.cmp(&b.name),
        SortOrder::BySize => a.size().unwrap_or(0).cmp(&b.size().unwrap_or(0)).then_with(|| a.name.cmp(&b.name)),
        SortOrder::ByDate => a
            .mtime()
            .map(|(t, _)| t)
            .cmp(&b.mtime().map(|(t, _)| t))
            .then_with(|| a.name.cmp(&b.name)),
        SortOrder::DirsFirst => {
            let a_is_dir = matches!(a.kind, crate::meta::FileKind::Dir);
            let b_is_dir = matches!(b.kind, crate::meta::FileKind::Dir);
            b_is_dir.cmp(&a_is_dir).then_with(|| a.name.cmp(&b.name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::FileKind;

    fn entry(name: &str, kind: FileKind, size: u64) -> FileMeta {
        FileMeta::new(name, kind).with_size(size)
    }

    #[test]
    fn sorted_by_name_is_alphabetic() {
        let mut set = FileSet::new();
        set.insert(entry("b.txt", FileKind::File, 1));
        set.insert(entry("a.txt", FileKind::File, 2));
        let names: Vec<_> = set.sorted(SortOrder::ByName).iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
    }

    #[test]
    fn sorted_dirs_first_puts_directories_ahead() {
        let mut set = FileSet::new();
        set.insert(entry("z.txt", FileKind::File, 1));
        set.insert(entry("a_dir", FileKind::Dir, 0));
        let names: Vec<_> = set.sorted(SortOrder::DirsFirst).iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["a_dir", "z.txt"]);
    }

    #[test]
    fn merge_combines_fields_for_shared_names() {
        let mut base = FileSet::new();
        base.insert(FileMeta::new("f", FileKind::File).with_mode(0o644));
        let mut patch = FileSet::new();
        patch.insert(FileMeta::new("f", FileKind::File).with_size(99));
        base.merge(&patch);
        let merged = base.get("f").unwrap();
        assert_eq!(merged.size(), Some(99));
        assert_eq!(merged.mode(), Some(0o644));
    }
}
