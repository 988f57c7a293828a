use std::fmt::Write as _;

use redirect_fs::{classify, CurrentDirectory, FixedCurrentDir, HostCurrentDir};

#[derive(Debug, clap::Parser)]
/// The options for the `mfr classify` subcommand
pub struct Classify {
    /// The path to classify
    #[clap(name = "PATH")]
    pub path: String,

    /// Directory relative paths resolve against (defaults to the working
    /// directory)
    #[clap(long)]
    pub cwd: Option<String>,

    /// Print JSON instead of text
    #[clap(long)]
    pub json: bool,
}

impl Classify {
    pub fn render(&self) -> Result<String, anyhow::Error> {
        let cwd: Box<dyn CurrentDirectory> = match &self.cwd {
            Some(dir) => Box::new(FixedCurrentDir::new(dir.clone())),
            None => Box::new(HostCurrentDir),
        };
        let classified = classify(&self.path, cwd.as_ref());

        if self.json {
            return Ok(serde_json::to_string_pretty(&classified)? + "\n");
        }

        let mut out = String::new();
        writeln!(out, "category:     {}", classified.category)?;
        writeln!(out, "redirectable: {}", classified.is_redirectable())?;
        writeln!(out, "normalized:   {}", classified.normalized)?;
        Ok(out)
    }
}
