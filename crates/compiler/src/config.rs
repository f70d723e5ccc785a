//! Compiler configuration
//!
//! Defaults target 32-bit ELF with the GNU toolchain. A TOML config file
//! (`--config`) can override the toolchain pieces and defaults; command
//! line flags are merged on top by the driver.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Search path for `import` units, in order.
    pub import_paths: Vec<PathBuf>,
    /// Emit position-independent calls (`call f@PLT`).
    pub pic: bool,
    /// Treat comparisons of unrelated pointer types as errors.
    pub strict_pointer_comparison: bool,
    pub assembler: String,
    pub linker: String,
    pub dynamic_linker: String,
    /// Directory holding crt1.o / crti.o / crtn.o.
    pub crt_dir: PathBuf,
    /// Libraries appended to the link line (`-l` names).
    pub libraries: Vec<String>,
    /// Skip the dynamic linker, CRT objects and default libraries.
    pub no_default_link: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            import_paths: vec![PathBuf::from("."), PathBuf::from("/usr/local/cbc/import")],
            pic: false,
            strict_pointer_comparison: false,
            assembler: "as".to_string(),
            linker: "ld".to_string(),
            dynamic_linker: "/lib/ld-linux.so.2".to_string(),
            crt_dir: PathBuf::from("/usr/lib"),
            libraries: vec!["c".to_string()],
            no_default_link: false,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Extra import path searched before the defaults.
    pub fn with_import_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.import_paths.insert(0, path.into());
        self
    }

    pub fn with_pic(mut self, pic: bool) -> Self {
        self.pic = pic;
        self
    }

    /// Load overrides from a TOML file and merge them over `self`.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {}", path.display(), e))?;
        let file: ConfigFile = toml::from_str(&text)
            .map_err(|e| format!("failed to parse config {}: {}", path.display(), e))?;
        if let Some(paths) = file.import_paths {
            self.import_paths = paths.into_iter().map(PathBuf::from).collect();
        }
        if let Some(pic) = file.pic {
            self.pic = pic;
        }
        if let Some(strict) = file.strict_pointer_comparison {
            self.strict_pointer_comparison = strict;
        }
        if let Some(assembler) = file.assembler {
            self.assembler = assembler;
        }
        if let Some(linker) = file.linker {
            self.linker = linker;
        }
        if let Some(dynamic_linker) = file.dynamic_linker {
            self.dynamic_linker = dynamic_linker;
        }
        if let Some(crt_dir) = file.crt_dir {
            self.crt_dir = PathBuf::from(crt_dir);
        }
        if let Some(libraries) = file.libraries {
            self.libraries = libraries;
        }
        if let Some(no_default_link) = file.no_default_link {
            self.no_default_link = no_default_link;
        }
        Ok(())
    }
}

/// On-disk shape; every field optional so a file may override one knob.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    import_paths: Option<Vec<String>>,
    pic: Option<bool>,
    strict_pointer_comparison: Option<bool>,
    assembler: Option<String>,
    linker: Option<String>,
    dynamic_linker: Option<String>,
    crt_dir: Option<String>,
    libraries: Option<Vec<String>>,
    no_default_link: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.assembler, "as");
        assert_eq!(config.linker, "ld");
        assert_eq!(config.dynamic_linker, "/lib/ld-linux.so.2");
        assert!(!config.pic);
        assert_eq!(config.libraries, vec!["c".to_string()]);
    }

    #[test]
    fn test_merge_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cbc.toml");
        std::fs::write(
            &path,
            "pic = true\nassembler = \"i686-as\"\nimport_paths = [\"lib\"]\n",
        )
        .unwrap();
        let mut config = CompilerConfig::default();
        config.merge_file(&path).unwrap();
        assert!(config.pic);
        assert_eq!(config.assembler, "i686-as");
        assert_eq!(config.import_paths, vec![PathBuf::from("lib")]);
        // untouched fields keep their defaults
        assert_eq!(config.linker, "ld");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cbc.toml");
        std::fs::write(&path, "no_such_option = 1\n").unwrap();
        let mut config = CompilerConfig::default();
        assert!(config.merge_file(&path).is_err());
    }
}
