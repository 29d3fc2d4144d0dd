use arena::{Arena, new_id};
use std::path::{Path, PathBuf};

new_id!(SourceFileKey, u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

// WARNING: Don't implement PartialEq, Eq, or Hash for this.
// It's too easy to accidentally define constructs that are only equal
// depending on source, which is usually not what we want.
#[derive(Copy, Clone, Debug)]
pub struct Source {
    pub key: SourceFileKey,
    pub location: Location,
}

impl Source {
    pub fn new(key: SourceFileKey, location: Location) -> Self {
        Self { key, location }
    }

    pub fn internal() -> Self {
        Self {
            key: SourceFiles::INTERNAL_KEY,
            location: Location { line: 1, column: 1 },
        }
    }

    pub fn is_internal(&self) -> bool {
        self.key == SourceFiles::INTERNAL_KEY
    }
}

#[derive(Debug)]
pub struct SourceFile {
    filepath: PathBuf,
    content: String,
}

impl SourceFile {
    pub fn new(filepath: PathBuf, content: String) -> Self {
        Self { filepath, content }
    }

    pub fn filename(&self) -> &str {
        self.filepath
            .to_str()
            .unwrap_or("<invalid unicode filename>")
    }

    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

#[derive(Debug)]
pub struct SourceFiles {
    files: Arena<SourceFileKey, SourceFile>,
}

impl SourceFiles {
    pub const INTERNAL_KEY: SourceFileKey = SourceFileKey(0);

    pub fn new() -> Self {
        let mut files = Arena::new();
        files.alloc(SourceFile::new("<internal>".into(), String::new()));
        Self { files }
    }

    pub fn add(&mut self, filepath: PathBuf, content: String) -> SourceFileKey {
        self.files.alloc(SourceFile::new(filepath, content))
    }

    pub fn get(&self, key: SourceFileKey) -> &SourceFile {
        &self.files[key]
    }
}

impl Default for SourceFiles {
    fn default() -> Self {
        Self::new()
    }
}
