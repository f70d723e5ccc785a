//! Library loader for `import` declarations
//!
//! `import foo.bar;` names the header-like unit `foo/bar.hb`, located by
//! walking the configured search paths in order. Every unit is loaded at
//! most once per compilation; a unit that is still being loaded when it is
//! requested again (an import cycle) is skipped on reentry, which makes
//! cycles terminate instead of recursing forever.

use std::collections::HashSet;
use std::path::PathBuf;

/// File extension of importable units.
pub const IMPORT_EXTENSION: &str = "hb";

#[derive(Debug)]
pub enum LoadOutcome {
    /// Already merged earlier, or currently being merged (cycle).
    Skip,
    /// No search path contains the unit.
    NotFound,
    /// Freshly read source, ready to parse. `end_load` must be called
    /// with the same name once parsing finishes.
    Source { path: PathBuf, text: String },
}

#[derive(Debug)]
pub struct Loader {
    search_paths: Vec<PathBuf>,
    loading: HashSet<String>,
    loaded: HashSet<String>,
}

impl Loader {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Loader {
            search_paths,
            loading: HashSet::new(),
            loaded: HashSet::new(),
        }
    }

    /// Map `foo.bar` to its relative file path `foo/bar.hb`.
    fn relative_path(name: &str) -> PathBuf {
        let mut path: PathBuf = name.split('.').collect();
        path.set_extension(IMPORT_EXTENSION);
        path
    }

    pub fn begin_load(&mut self, name: &str) -> LoadOutcome {
        if self.loaded.contains(name) || self.loading.contains(name) {
            return LoadOutcome::Skip;
        }
        let relative = Self::relative_path(name);
        for base in &self.search_paths {
            let candidate = base.join(&relative);
            if candidate.is_file() {
                match std::fs::read_to_string(&candidate) {
                    Ok(text) => {
                        self.loading.insert(name.to_string());
                        return LoadOutcome::Source {
                            path: candidate,
                            text,
                        };
                    }
                    Err(_) => return LoadOutcome::NotFound,
                }
            }
        }
        LoadOutcome::NotFound
    }

    pub fn end_load(&mut self, name: &str) {
        self.loading.remove(name);
        self.loaded.insert(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_relative_path_mapping() {
        assert_eq!(Loader::relative_path("stdio"), PathBuf::from("stdio.hb"));
        assert_eq!(
            Loader::relative_path("sys.types"),
            PathBuf::from("sys/types.hb")
        );
    }

    #[test]
    fn test_load_once_then_skip() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stdio.hb"), "int puts(char* s);\n").unwrap();
        let mut loader = Loader::new(vec![dir.path().to_path_buf()]);

        match loader.begin_load("stdio") {
            LoadOutcome::Source { text, .. } => assert!(text.contains("puts")),
            other => panic!("expected source, got {:?}", other),
        }
        loader.end_load("stdio");
        assert!(matches!(loader.begin_load("stdio"), LoadOutcome::Skip));
    }

    #[test]
    fn test_cycle_is_skipped_on_reentry() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.hb"), "import b;\n").unwrap();
        let mut loader = Loader::new(vec![dir.path().to_path_buf()]);
        // a is mid-load when it is requested again
        assert!(matches!(loader.begin_load("a"), LoadOutcome::Source { .. }));
        assert!(matches!(loader.begin_load("a"), LoadOutcome::Skip));
    }

    #[test]
    fn test_missing_unit() {
        let mut loader = Loader::new(vec![PathBuf::from("/nonexistent")]);
        assert!(matches!(loader.begin_load("nope"), LoadOutcome::NotFound));
    }

    #[test]
    fn test_search_path_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("m.hb"), "// first\n").unwrap();
        fs::write(second.path().join("m.hb"), "// second\n").unwrap();
        let mut loader = Loader::new(vec![
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ]);
        match loader.begin_load("m") {
            LoadOutcome::Source { text, .. } => assert!(text.contains("first")),
            other => panic!("expected source, got {:?}", other),
        }
    }
}
