//! Named buffers and the registries that own them.
//!
//! Buffer and variable names starting with [`GLOBAL_MARKER`] are global:
//! they live in the engine and are shared by every script. A doubled marker
//! denotes a read-only intrinsic variable.

use std::collections::BTreeMap;

use crate::line_list::LineList;

/// Prefix of global buffer and variable names.
pub const GLOBAL_MARKER: char = '_';

/// Name of the engine's main buffer, holding the current input file.
pub const MAIN_BUFFER: &str = "_main";

pub fn is_global_name(name: &str) -> bool {
    name.starts_with(GLOBAL_MARKER)
}

pub fn is_intrinsic_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some(GLOBAL_MARKER) && chars.next() == Some(GLOBAL_MARKER)
}

/// A [`LineList`] with a name.
#[derive(Debug, Clone, Default)]
pub struct LineBuffer {
    name: String,
    list: LineList,
}

impl LineBuffer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            list: LineList::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_global(&self) -> bool {
        is_global_name(&self.name)
    }

    pub fn list(&self) -> &LineList {
        &self.list
    }

    pub fn list_mut(&mut self) -> &mut LineList {
        &mut self.list
    }
}

/// Access to a set of named buffers.
pub trait BufferRegistry {
    /// Look up a buffer without creating it.
    fn buffer(&self, name: &str) -> Option<&LineBuffer>;

    /// Look up a buffer, creating an empty one on first reference.
    fn buffer_mut(&mut self, name: &str) -> &mut LineBuffer;
}

/// A name-ordered collection of buffers.
#[derive(Debug, Clone, Default)]
pub struct Buffers {
    buffers: BTreeMap<String, LineBuffer>,
}

impl Buffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }
}

impl BufferRegistry for Buffers {
    fn buffer(&self, name: &str) -> Option<&LineBuffer> {
        self.buffers.get(name)
    }

    fn buffer_mut(&mut self, name: &str) -> &mut LineBuffer {
        self.buffers
            .entry(name.to_string())
            .or_insert_with(|| LineBuffer::new(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_classes() {
        assert!(is_global_name("_shared"));
        assert!(!is_global_name("local"));
        assert!(is_intrinsic_name("__line"));
        assert!(!is_intrinsic_name("_line"));
    }

    #[test]
    fn buffers_are_created_on_first_reference() {
        let mut buffers = Buffers::new();
        assert!(buffers.buffer("tmp").is_none());
        buffers.buffer_mut("tmp").list_mut().append_lines(["x".to_string()]);
        assert_eq!(buffers.buffer("tmp").unwrap().list().lines(), ["x"]);
        assert_eq!(buffers.names().collect::<Vec<_>>(), ["tmp"]);
    }
}
