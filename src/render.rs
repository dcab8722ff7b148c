//! Template rendering: pure `(unit, snapshot) → bytes`.
//!
//! Undefined variables and unknown filters are errors (tera's default), and
//! autoescaping is off since nothing rendered here is HTML.
use tera::{Context, Tera};
use tracing::debug;

use crate::error::{Error, Result, TemplateFailure};
use crate::helpers;
use crate::template_data::TemplateData;
use crate::templates::{TemplateSource, TemplateUnit};

pub struct Renderer {
    tera: Tera,
    units: Vec<TemplateUnit>,
    source: String,
}

impl Renderer {
    /// Load and compile every unit of `source`. Every unit that fails to
    /// compile is reported, not just the first.
    pub fn new(source: &dyn TemplateSource) -> Result<Self> {
        let units = source.list_units()?;
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        helpers::register(&mut tera);

        let mut failures = Vec::new();
        for unit in &units {
            let text = source.load(unit)?;
            if let Err(error) = tera.add_raw_template(&unit.name, &text) {
                failures.push(TemplateFailure { unit: unit.name.clone(), message: describe(&error) });
            }
        }
        if !failures.is_empty() {
            return Err(Error::Template(failures));
        }
        debug!(source = %source.describe(), units = units.len(), "templates compiled");
        Ok(Self { tera, units, source: source.describe() })
    }

    pub fn list_units(&self) -> &[TemplateUnit] {
        &self.units
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn context(data: &TemplateData) -> Result<Context> {
        Context::from_serialize(data)
            .map_err(|e| Error::template("<context>", describe(&e)))
    }

    pub fn render(&self, unit: &TemplateUnit, data: &TemplateData) -> Result<Vec<u8>> {
        self.render_with(unit, &Self::context(data)?)
    }

    /// Render against a prepared context, so a batch serializes the snapshot once.
    pub fn render_with(&self, unit: &TemplateUnit, context: &Context) -> Result<Vec<u8>> {
        self.tera
            .render(&unit.name, context)
            .map(String::into_bytes)
            .map_err(|e| Error::template(&unit.name, describe(&e)))
    }
}

/// tera nests the useful part (which variable, which filter) in the source chain.
fn describe(error: &tera::Error) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

// ------------------------------- Tests ------------------------------------ //
