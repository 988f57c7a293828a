use redirect_shim::{Outcome, Shim};

use super::EngineOpts;

#[derive(Debug, clap::Parser)]
/// The options for the `mfr rewrite` subcommand
pub struct Rewrite {
    /// The command line to rewrite
    #[clap(name = "CMDLINE")]
    pub command_line: String,

    #[clap(flatten)]
    pub engine: EngineOpts,
}

impl Rewrite {
    pub fn render(&self) -> Result<String, anyhow::Error> {
        let shim = Shim::new(self.engine.redirector()?);
        let rewritten = match shim.create_process(None, Some(&self.command_line)) {
            Outcome::Handled(launch) => launch
                .command_line
                .unwrap_or_else(|| self.command_line.clone()),
            Outcome::Failed(code) => anyhow::bail!("unable to rewrite the command line ({code})"),
            Outcome::PassThrough => self.command_line.clone(),
        };
        Ok(rewritten + "\n")
    }
}
