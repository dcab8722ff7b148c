//! Command surface: generate bindings from a registry snapshot, or extract
//! the embedded templates for editing.
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser};
use colored::Colorize;

use crate::generate::{self, GenerateOptions, Report};
use crate::registry::SnapshotRegistry;
use crate::templates::{DirectoryTemplates, EmbeddedTemplates, TemplateSource};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// generate layered libvips bindings from the operation registry
#[derive(Parser, Debug)]
#[command(name = "vipsgen", version)]
pub struct CommandLineInterface {
    #[command(flatten)]
    input: InputSettings,

    #[command(flatten)]
    output: OutputSettings,

    /// copy the embedded templates to --extract-dir and exit
    #[arg(long, default_value_t = false)]
    extract: bool,

    /// where --extract writes the templates
    #[arg(long, default_value = "./templates")]
    extract_dir: PathBuf,

    /// verbose logging, plus debug.json in the output directory
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// abort the run after this many seconds
    #[arg(long, default_value_t = 600)]
    timeout: u64,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// registry snapshot (JSON) written by the introspection shim
    #[arg(long, required_unless_present = "extract")]
    registry: Option<PathBuf>,

    /// template directory to use instead of the embedded set
    #[arg(long)]
    templates: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct OutputSettings {
    /// output directory
    #[arg(long, short, default_value = "./vips")]
    out: PathBuf,

    /// also render test-only templates (`*_test.*.tmpl`)
    #[arg(long, default_value_t = false)]
    include_test: bool,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    /// Filter used when `RUST_LOG` is unset; `--debug` always wins.
    pub fn log_filter(&self) -> Option<&'static str> {
        self.debug.then_some("vipsgen=debug")
    }

    pub fn run(&self) -> anyhow::Result<()> {
        if self.extract {
            let written = generate::extract(&EmbeddedTemplates, &self.extract_dir)?;
            println!(
                "{} {} templates to {}",
                "extracted".green().bold(),
                written.len(),
                self.extract_dir.display()
            );
            return Ok(());
        }

        let registry_path = self
            .input
            .registry
            .as_deref()
            .context("--registry is required unless --extract is given")?;
        let registry = SnapshotRegistry::open(registry_path)?;
        let source: Box<dyn TemplateSource> = match &self.input.templates {
            Some(dir) => Box::new(DirectoryTemplates::new(dir)?),
            None => Box::new(EmbeddedTemplates),
        };

        let report = generate::run(&registry, source.as_ref(), &self.options())?;
        print_summary(&report, &self.output.out);
        Ok(())
    }

    fn options(&self) -> GenerateOptions {
        GenerateOptions {
            output_root: self.output.out.clone(),
            include_test: self.output.include_test,
            debug: self.debug,
            timeout: Duration::from_secs(self.timeout),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn print_summary(report: &Report, out: &std::path::Path) {
    println!(
        "{} {} files in {}",
        "generated".green().bold(),
        report.written.len(),
        out.display()
    );
    if !report.skipped.is_empty() {
        println!(
            "{} {} test-only templates (pass --include-test to render them)",
            "skipped".yellow(),
            report.skipped.len()
        );
    }
    if report.warnings > 0 {
        let hint = if report.debug_dump.is_some() { "see debug.json" } else { "rerun with --debug for details" };
        println!("{} {} arguments dropped ({hint})", "warning".yellow().bold(), report.warnings);
    }
}

// ------------------------------- Tests ------------------------------------ //
