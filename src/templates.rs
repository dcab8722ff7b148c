// Template sources: the set compiled into the binary, or a directory on disk.
use std::path::{Path, PathBuf};

use rust_embed::RustEmbed;

use crate::error::{Error, Result};

pub const TEMPLATE_SUFFIX: &str = ".tmpl";

/// One named template; resolves to exactly one generated file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TemplateUnit {
    /// path relative to the source root, `/`-separated
    pub name: String,
}

impl TemplateUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Output path relative to the output root: the name without its suffix.
    pub fn output_name(&self) -> &str {
        self.name.strip_suffix(TEMPLATE_SUFFIX).unwrap_or(&self.name)
    }

    /// Units whose output stem ends in `_test` only render with `--include-test`.
    pub fn is_test_only(&self) -> bool {
        let output = Path::new(self.output_name());
        output
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.ends_with("_test"))
    }
}

pub trait TemplateSource: Send + Sync {
    fn describe(&self) -> String;
    /// Every unit, sorted by name.
    fn list_units(&self) -> Result<Vec<TemplateUnit>>;
    fn load(&self, unit: &TemplateUnit) -> Result<String>;
}

// ————————————————————————————————————————————————————————————————————————————
// EMBEDDED
// ————————————————————————————————————————————————————————————————————————————

#[derive(RustEmbed)]
#[folder = "templates/"]
struct Embedded;

#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedTemplates;

impl TemplateSource for EmbeddedTemplates {
    fn describe(&self) -> String {
        "embedded templates".into()
    }

    fn list_units(&self) -> Result<Vec<TemplateUnit>> {
        let mut units: Vec<TemplateUnit> = Embedded::iter()
            .filter(|name| name.ends_with(TEMPLATE_SUFFIX))
            .map(|name| TemplateUnit::new(name.into_owned()))
            .collect();
        units.sort();
        Ok(units)
    }

    fn load(&self, unit: &TemplateUnit) -> Result<String> {
        let file = Embedded::get(&unit.name)
            .ok_or_else(|| Error::template(&unit.name, "no such embedded template"))?;
        String::from_utf8(file.data.into_owned())
            .map_err(|_| Error::template(&unit.name, "template is not valid UTF-8"))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DIRECTORY
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone)]
pub struct DirectoryTemplates {
    root: PathBuf,
}

impl DirectoryTemplates {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::io(
                &root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "template directory not found"),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TemplateSource for DirectoryTemplates {
    fn describe(&self) -> String {
        format!("templates from {}", self.root.display())
    }

    fn list_units(&self) -> Result<Vec<TemplateUnit>> {
        let pattern = self.root.join("**").join(format!("*{TEMPLATE_SUFFIX}"));
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern)
            .map_err(|e| Error::template(pattern.to_string(), format!("bad template pattern: {e}")))?;

        let mut units = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| Error::io(e.path().to_path_buf(), std::io::Error::from(e)))?;
            if !path.is_file() {
                continue;
            }
            let relative = path.strip_prefix(&self.root).unwrap_or(&path);
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            units.push(TemplateUnit::new(name));
        }
        units.sort();
        Ok(units)
    }

    fn load(&self, unit: &TemplateUnit) -> Result<String> {
        let path = self.root.join(&unit.name);
        std::fs::read_to_string(&path).map_err(|e| Error::io(path, e))
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn output_names_and_test_units() {
        let unit = TemplateUnit::new("image.go.tmpl");
        assert_eq!(unit.output_name(), "image.go");
        assert!(!unit.is_test_only());
        assert!(TemplateUnit::new("image_test.go.tmpl").is_test_only());
        assert!(TemplateUnit::new("sub/vips_test.c.tmpl").is_test_only());
        assert!(!TemplateUnit::new("testdata.go.tmpl").is_test_only());
    }

    #[test]
    fn embedded_set_is_complete_and_sorted() {
        let units = EmbeddedTemplates.list_units().unwrap();
        let names: Vec<_> = units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "enums.go.tmpl",
                "image.go.tmpl",
                "image_test.go.tmpl",
                "types.go.tmpl",
                "vips.c.tmpl",
                "vips.go.tmpl",
                "vips.h.tmpl",
            ]
        );
        for unit in &units {
            assert!(!EmbeddedTemplates.load(unit).unwrap().is_empty());
        }
    }

    #[test]
    fn directory_source_globs_nested_templates() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.go.tmpl"), "b").unwrap();
        fs::write(dir.path().join("sub/a.h.tmpl"), "a").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = DirectoryTemplates::new(dir.path()).unwrap();
        let units = source.list_units().unwrap();
        let names: Vec<_> = units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["b.go.tmpl", "sub/a.h.tmpl"]);
        assert_eq!(source.load(&units[1]).unwrap(), "a");
        assert_eq!(units[1].output_name(), "sub/a.h");
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let err = DirectoryTemplates::new("/definitely/not/here").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
