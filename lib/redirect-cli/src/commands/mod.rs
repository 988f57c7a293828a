//! The commands available in the `mfr` binary.
mod classify;
mod ls;
mod resolve;
mod rewrite;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use redirect_config::RedirectionConfig;
use redirect_fs::{host_fs, FileSystem, KnownFolders, Redirector};

pub use self::{classify::Classify, ls::Ls, resolve::Resolve, rewrite::Rewrite};

/// Command-line arguments for the `mfr` CLI.
#[derive(clap::Parser, Debug)]
#[clap(name = "mfr", version, about = concat!("mfr ", env!("CARGO_PKG_VERSION")))]
pub struct MfrCmd {
    #[clap(flatten)]
    pub output: crate::logging::Output,
    #[clap(subcommand)]
    pub cmd: Cmd,
}

#[derive(clap::Subcommand, Debug)]
pub enum Cmd {
    /// Show how a path is classified and normalized
    Classify(Classify),
    /// Show the candidate locations of a path and which one an operation uses
    Resolve(Resolve),
    /// List a directory the way a redirected process sees it
    Ls(Ls),
    /// Rewrite the paths in a command line
    Rewrite(Rewrite),
}

impl MfrCmd {
    pub fn execute(self) -> Result<(), anyhow::Error> {
        self.output.initialize_logging();
        let text = self.cmd.render()?;
        print!("{text}");
        Ok(())
    }
}

impl Cmd {
    /// Runs the command and returns what it prints.
    pub fn render(&self) -> Result<String, anyhow::Error> {
        match self {
            Cmd::Classify(cmd) => cmd.render(),
            Cmd::Resolve(cmd) => cmd.render(),
            Cmd::Ls(cmd) => cmd.render(),
            Cmd::Rewrite(cmd) => cmd.render(),
        }
    }
}

/// Where the configuration comes from and how drive paths reach the host.
#[derive(clap::Parser, Debug, Clone)]
pub struct EngineOpts {
    /// Redirection configuration file (JSON)
    #[clap(long, short = 'c', env = "MFR_CONFIG")]
    pub config: PathBuf,

    /// Host directory that holds the drives (`<DIR>/C/...`). Required on
    /// hosts without native Windows paths.
    #[clap(long, env = "MFR_HOST_ROOT")]
    pub host_root: Option<PathBuf>,
}

impl EngineOpts {
    pub fn load_config(&self) -> Result<RedirectionConfig, anyhow::Error> {
        RedirectionConfig::from_path(&self.config)
            .with_context(|| format!("failed to load `{}`", self.config.display()))
    }

    pub fn filesystem(&self) -> Result<Arc<dyn FileSystem>, anyhow::Error> {
        match &self.host_root {
            Some(root) => {
                let fs = host_fs::FileSystem::with_root(root.clone())
                    .with_context(|| format!("invalid host root `{}`", root.display()))?;
                Ok(Arc::new(fs))
            }
            None => Ok(Arc::new(host_fs::FileSystem::native())),
        }
    }

    pub fn redirector(&self) -> Result<Redirector, anyhow::Error> {
        let config = self.load_config()?;
        config
            .redirector(self.filesystem()?, KnownFolders::from_env())
            .context("unable to set up redirection")
    }
}
