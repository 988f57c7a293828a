use std::fmt::Write as _;

use redirect_fs::{Candidate, ClassifiedPath, OpKind, PathRole, Preparation};
use serde::Serialize;

use super::EngineOpts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Op {
    #[default]
    Read,
    Write,
    CreateNew,
    CreateOrOpen,
    Delete,
}

impl From<Op> for OpKind {
    fn from(op: Op) -> Self {
        match op {
            Op::Read => OpKind::MustExistForRead,
            Op::Write => OpKind::MustExistForWrite,
            Op::CreateNew => OpKind::CreateNew,
            Op::CreateOrOpen => OpKind::CreateOrOpen,
            Op::Delete => OpKind::DeleteExisting,
        }
    }
}

#[derive(Debug, clap::Parser)]
/// The options for the `mfr resolve` subcommand
pub struct Resolve {
    /// The path the application referenced
    #[clap(name = "PATH")]
    pub path: String,

    /// The operation to select a location for
    #[clap(long, value_enum, default_value_t = Op::Read)]
    pub op: Op,

    /// Print JSON instead of text
    #[clap(long)]
    pub json: bool,

    #[clap(flatten)]
    pub engine: EngineOpts,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    classified: &'a ClassifiedPath,
    candidates: &'a [Candidate],
    #[serde(skip_serializing_if = "Option::is_none")]
    selected: Option<Selected>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct Selected {
    path: String,
    role: PathRole,
    exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    copy_from: Option<String>,
    create_parents: bool,
}

impl Resolve {
    pub fn render(&self) -> Result<String, anyhow::Error> {
        let redirector = self.engine.redirector()?;
        let set = redirector.resolve(&self.path);

        let (selected, error) = match redirector.select(&self.path, self.op.into()) {
            Ok(choice) => {
                let (copy_from, create_parents) = match choice.preparation {
                    Preparation::None => (None, false),
                    Preparation::CreateParents => (None, true),
                    Preparation::CopyUp { source } => (Some(source), true),
                };
                let selected = Selected {
                    path: choice.path,
                    role: choice.role,
                    exists: choice.existing.is_some(),
                    copy_from,
                    create_parents,
                };
                (Some(selected), None)
            }
            Err(e) => (None, Some(e.to_string())),
        };

        let report = Report {
            classified: &set.classified,
            candidates: set.candidates(),
            selected,
            error,
        };

        if self.json {
            return Ok(serde_json::to_string_pretty(&report)? + "\n");
        }

        let mut out = String::new();
        writeln!(
            out,
            "{} ({})",
            report.classified.normalized, report.classified.category
        )?;
        for candidate in report.candidates {
            writeln!(out, "  {:<22} {}", candidate.role, candidate.path)?;
        }
        match (&report.selected, &report.error) {
            (Some(selected), _) => {
                writeln!(out, "selected: {} {}", selected.role, selected.path)?;
                if let Some(source) = &selected.copy_from {
                    writeln!(out, "  copy up from {source}")?;
                } else if selected.create_parents {
                    writeln!(out, "  create parent directories")?;
                }
            }
            (None, Some(error)) => writeln!(out, "error: {error}")?,
            (None, None) => {}
        }
        Ok(out)
    }
}
