use std::fmt::Write as _;

use redirect_fs::{EnumerationEntry, RedirectError};

use super::EngineOpts;

#[derive(Debug, clap::Parser)]
/// The options for the `mfr ls` subcommand
pub struct Ls {
    /// A directory path ending in a file name pattern (`C:\dir\*.txt`)
    #[clap(name = "PATTERN")]
    pub pattern: String,

    /// Print JSON instead of text
    #[clap(long)]
    pub json: bool,

    #[clap(flatten)]
    pub engine: EngineOpts,
}

impl Ls {
    pub fn render(&self) -> Result<String, anyhow::Error> {
        let redirector = self.engine.redirector()?;
        let entries: Vec<EnumerationEntry> = match redirector.find_first(&self.pattern) {
            Ok(handle) => handle.collect(),
            Err(RedirectError::FileNotFound) => Vec::new(),
            Err(e) => anyhow::bail!("unable to list `{}`: {e}", self.pattern),
        };

        if self.json {
            return Ok(serde_json::to_string_pretty(&entries)? + "\n");
        }

        let mut out = String::new();
        for entry in &entries {
            let kind = if entry.is_dir() { "<DIR>" } else { "" };
            writeln!(
                out,
                "{:<5} {:>10} {:<22} {}",
                kind,
                entry.metadata.len,
                entry.source_role,
                entry.name
            )?;
        }
        Ok(out)
    }
}
