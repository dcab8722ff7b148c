//! Generation driver: discovery → normalization → contract check → render →
//! consistency check → write.
//!
//! Nothing touches the output directory until every unit has rendered and the
//! rendered set agrees with itself. Each file is then written through a
//! sibling temp file and renamed into place.
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::error::{ArgumentMappingWarning, Error, Result, TemplateFailure};
use crate::lower::{self, Binding};
use crate::normalize;
use crate::registry::{self, Registry};
use crate::render::Renderer;
use crate::template_data::{self, TemplateData};
use crate::templates::{TemplateSource, TemplateUnit};

pub const DEBUG_DUMP: &str = "debug.json";

static NATIVE_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bvipsgen_[A-Za-z0-9_]+").expect("static pattern"));

static WRAPPER_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bvipsgen[A-Z][A-Za-z0-9_]*").expect("static pattern"));

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// The single upfront time budget for a run.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn start(budget: Duration) -> Self {
        Self { started: Instant::now(), budget }
    }

    pub fn check(&self, stage: &'static str) -> Result<()> {
        if self.started.elapsed() >= self.budget {
            return Err(Error::Deadline { stage, budget: self.budget });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub output_root: PathBuf,
    pub include_test: bool,
    pub debug: bool,
    pub timeout: Duration,
}

/// Normalized snapshot plus every argument that was dropped on the way.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub data: TemplateData,
    pub warnings: Vec<ArgumentMappingWarning>,
}

#[derive(Debug, Clone, Default)]
pub struct Report {
    /// sorted by unit name
    pub written: Vec<PathBuf>,
    pub skipped: Vec<TemplateUnit>,
    pub warnings: usize,
    pub debug_dump: Option<PathBuf>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

/// Full run: everything from registry discovery to files on disk.
pub fn run(
    registry: &dyn Registry,
    source: &dyn TemplateSource,
    options: &GenerateOptions,
) -> Result<Report> {
    let deadline = Deadline::start(options.timeout);
    let prepared = prepare(registry, options.include_test, &deadline)?;
    let renderer = Renderer::new(source)?;
    let mut report = generate(&renderer, &prepared.data, &options.output_root, &deadline)?;
    report.warnings = prepared.warnings.len();
    if options.debug {
        let path = write_debug_dump(&prepared.data, &prepared.warnings, &options.output_root)?;
        report.debug_dump = Some(path);
    }
    Ok(report)
}

pub fn prepare(registry: &dyn Registry, include_test: bool, deadline: &Deadline) -> Result<Prepared> {
    let found = registry::discover(registry)?;
    deadline.check("discovery")?;

    let catalog = Catalog::build(&found.enum_types, &found.image_types)?;
    let normalized = normalize::normalize_all(&found.operations, &catalog);
    let (enum_types, image_types) = catalog.into_parts();
    deadline.check("normalization")?;

    let data = template_data::aggregate(
        normalized.operations,
        enum_types,
        image_types,
        found.version,
        include_test,
    );
    Ok(Prepared { data, warnings: normalized.warnings })
}

/// Render every applicable unit and write the results under `output_root`.
pub fn generate(
    renderer: &Renderer,
    data: &TemplateData,
    output_root: &Path,
    deadline: &Deadline,
) -> Result<Report> {
    for op in data.operations() {
        lower::verify(op)?;
    }
    deadline.check("consistency check")?;

    let mut report = Report::default();
    let mut units = Vec::new();
    for unit in renderer.list_units() {
        if unit.is_test_only() && !data.include_test() {
            info!(unit = %unit.name, "skipping test-only template (use --include-test)");
            report.skipped.push(unit.clone());
        } else {
            units.push(unit.clone());
        }
    }

    // ---- render ---- //
    let context = Renderer::context(data)?;
    let mut rendered: Vec<(TemplateUnit, Result<Vec<u8>>)> = units
        .into_par_iter()
        .map(|unit| {
            let out = renderer.render_with(&unit, &context);
            (unit, out)
        })
        .collect();
    rendered.sort_by(|a, b| a.0.cmp(&b.0));

    let mut failures: Vec<TemplateFailure> = Vec::new();
    let mut outputs: Vec<(TemplateUnit, Vec<u8>)> = Vec::with_capacity(rendered.len());
    for (unit, result) in rendered {
        match result {
            Ok(bytes) => {
                debug!(unit = %unit.name, bytes = bytes.len(), "rendered");
                outputs.push((unit, bytes));
            }
            Err(Error::Template(mut unit_failures)) => failures.append(&mut unit_failures),
            Err(other) => return Err(other),
        }
    }
    if !failures.is_empty() {
        return Err(Error::Template(failures));
    }
    deadline.check("rendering")?;

    check_consistency(data, &outputs)?;

    // ---- write ---- //
    fs::create_dir_all(output_root).map_err(|e| Error::io(output_root, e))?;
    for (unit, bytes) in &outputs {
        deadline.check("output")?;
        let path = output_root.join(unit.output_name());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        write_atomic(&path, bytes)?;
        info!(path = %path.display(), "generated");
        report.written.push(path);
    }
    Ok(report)
}

/// Every native shim and Go wrapper referenced by the output must be one the
/// templates emit: Layer A always, Layer B only for operations with options.
pub fn check_consistency(data: &TemplateData, outputs: &[(TemplateUnit, Vec<u8>)]) -> Result<()> {
    let known = emitted_symbols(data);

    let mut problems = Vec::new();
    for (unit, bytes) in outputs {
        let text = String::from_utf8_lossy(bytes);
        for (pattern, what) in [(&*NATIVE_CALL, "native call"), (&*WRAPPER_CALL, "wrapper")] {
            let unknown: BTreeSet<&str> = pattern
                .find_iter(&text)
                .map(|m| m.as_str())
                .filter(|symbol| !known.contains(*symbol))
                .collect();
            for symbol in unknown {
                problems.push(format!("{} references unknown {what} `{symbol}`", unit.output_name()));
            }
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::Consistency(problems.join("; ")))
    }
}

fn emitted_symbols(data: &TemplateData) -> BTreeSet<String> {
    let mut known = BTreeSet::new();
    for op in data.operations() {
        let binding = lower::lower_operation(op);
        let wrapper = format!("vipsgen{}", binding.layer_c.name);
        if binding.layer_c.options.is_some() {
            known.insert(binding.layer_b.symbol);
            known.insert(format!("{wrapper}WithOptions"));
        }
        known.insert(binding.layer_a.symbol);
        known.insert(wrapper);
    }
    known
}

/// Copy every template of `source` into `dir`, keeping unit names.
pub fn extract(source: &dyn TemplateSource, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for unit in source.list_units()? {
        let text = source.load(&unit)?;
        let path = dir.join(&unit.name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        write_atomic(&path, text.as_bytes())?;
        info!(path = %path.display(), "extracted");
        written.push(path);
    }
    Ok(written)
}

#[derive(Serialize)]
struct DebugDump<'a> {
    snapshot: &'a TemplateData,
    bindings: Vec<Binding>,
    warnings: &'a [ArgumentMappingWarning],
}

/// Write the normalized model, lowered bindings and dropped arguments.
pub fn write_debug_dump(
    data: &TemplateData,
    warnings: &[ArgumentMappingWarning],
    dir: &Path,
) -> Result<PathBuf> {
    let dump = DebugDump {
        snapshot: data,
        bindings: data.operations().map(lower::lower_operation).collect(),
        warnings,
    };
    let path = dir.join(DEBUG_DUMP);
    let json = serde_json::to_vec_pretty(&dump).map_err(|e| Error::io(&path, e.into()))?;
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    write_atomic(&path, &json)?;
    info!(path = %path.display(), warnings = warnings.len(), "wrote debug dump");
    Ok(path)
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(parent).map_err(|e| Error::io(parent, e))?;
    file.write_all(bytes).map_err(|e| Error::io(path, e))?;
    file.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}

// ------------------------------- Tests ------------------------------------ //
