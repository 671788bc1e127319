use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Source lines of every file read during a loading session
#[derive(Debug, Default)]
pub struct LinesCollection {
    files: HashMap<PathBuf, Vec<String>>,
}

impl LinesCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &Path, code: &str) {
        let lines = code.lines().map(str::to_string).collect();
        self.files.insert(path.to_path_buf(), lines);
    }

    pub fn get(&self, path: &Path) -> Option<&[String]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// One line of a file, numbered from 1
    pub fn line(&self, path: &Path, lineno: usize) -> Option<&str> {
        let index = lineno.checked_sub(1)?;
        self.get(path)?.get(index).map(String::as_str)
    }

    /// Lines `lineno..=endlineno` joined back together
    pub fn snippet(&self, path: &Path, lineno: usize, endlineno: usize) -> Option<String> {
        let lines = self.get(path)?;
        let start = lineno.checked_sub(1)?;
        let end = endlineno.min(lines.len());
        if start >= end {
            return None;
        }
        Some(lines[start..end].join("\n"))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_lines(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_numbered_from_one() {
        let mut lines = LinesCollection::new();
        let path = Path::new("pkg/mod.py");
        lines.insert(path, "import os\n\ndef main():\n    pass\n");

        assert_eq!(lines.line(path, 1), Some("import os"));
        assert_eq!(lines.line(path, 3), Some("def main():"));
        assert_eq!(lines.line(path, 0), None);
        assert_eq!(lines.line(path, 10), None);
        assert_eq!(lines.total_lines(), 4);
    }

    #[test]
    fn test_snippet_is_clamped() {
        let mut lines = LinesCollection::new();
        let path = Path::new("mod.py");
        lines.insert(path, "a = 1\nb = 2\nc = 3");

        assert_eq!(lines.snippet(path, 2, 3).as_deref(), Some("b = 2\nc = 3"));
        assert_eq!(lines.snippet(path, 3, 99).as_deref(), Some("c = 3"));
        assert_eq!(lines.snippet(path, 4, 5), None);
        assert!(lines.contains(path));
        assert!(!lines.contains(Path::new("other.py")));
    }
}
