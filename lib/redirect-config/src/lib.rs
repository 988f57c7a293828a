//! The JSON configuration that tells the redirection engine where the package
//! lives, where per-user writes go, and which processes it applies to.
//!
//! ```json
//! {
//!   "packageRoot": "C:\\Program Files\\WindowsApps\\Contoso_1.0_x64__abc",
//!   "writableRoot": "C:\\Users\\u\\AppData\\Local\\Packages\\Contoso_abc\\LocalCache\\Local\\WritablePackageRoot",
//!   "knownFolders": { "ProgramFilesX64": "C:\\Program Files" },
//!   "processes": [
//!     { "executable": "^Contoso.*$", "fixups": [ { "dll": "FileRedirectionFixup64.dll" } ] }
//!   ]
//! }
//! ```

mod error;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use redirect_fs::path::is_absolute;
use redirect_fs::{
    CurrentDirectory, FileSystem, FixedCurrentDir, HostCurrentDir, KnownFolder, KnownFolders,
    RedirectionRoots, Redirector, Resolver, VfsMappingTable, WhiteoutMarkers,
};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

pub use self::error::ConfigError;

/// DLL name prefix of the fixup that turns file redirection on.
pub const REDIRECTION_FIXUP_PREFIX: &str = "FileRedirectionFixup";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectionConfig {
    pub package_root: String,
    pub writable_root: String,

    /// Alternate location the package is reachable through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_package_root: Option<String>,

    /// Where deletion markers are kept. Defaults to a `DeletionMarkers`
    /// directory next to the writable root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_marker_root: Option<String>,

    /// Fixed directory relative paths resolve against, instead of the
    /// process working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_directory: Option<String>,

    /// Per-folder overrides of what the environment reports.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub known_folders: BTreeMap<KnownFolder, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processes: Vec<ProcessConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessConfig {
    /// Regular expression matched against the executable's file name.
    pub executable: String,
    #[serde(default)]
    pub fixups: Vec<FixupConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixupConfig {
    pub dll: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
}

impl FixupConfig {
    pub fn is_file_redirection(&self) -> bool {
        self.dll
            .get(..REDIRECTION_FIXUP_PREFIX.len())
            .is_some_and(|p| p.eq_ignore_ascii_case(REDIRECTION_FIXUP_PREFIX))
    }
}

impl ProcessConfig {
    fn matcher(&self) -> Result<Regex, ConfigError> {
        RegexBuilder::new(&self.executable)
            .case_insensitive(true)
            .build()
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: self.executable.clone(),
                source,
            })
    }
}

impl RedirectionConfig {
    pub fn new(package_root: impl Into<String>, writable_root: impl Into<String>) -> Self {
        RedirectionConfig {
            package_root: package_root.into(),
            writable_root: writable_root.into(),
            final_package_root: None,
            deletion_marker_root: None,
            current_directory: None,
            known_folders: BTreeMap::new(),
            processes: Vec::new(),
        }
    }

    /// Parses and validates a configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RedirectionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&json)?;
        tracing::debug!(path=%path.display(), package_root=%config.package_root, "Loaded redirection config");
        Ok(config)
    }

    /// Checks that every root is absolute and every process pattern compiles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_absolute("packageRoot", &self.package_root)?;
        require_absolute("writableRoot", &self.writable_root)?;
        let optional = [
            ("finalPackageRoot", &self.final_package_root),
            ("deletionMarkerRoot", &self.deletion_marker_root),
            ("currentDirectory", &self.current_directory),
        ];
        for (field, value) in optional {
            if let Some(value) = value {
                require_absolute(field, value)?;
            }
        }
        for (folder, value) in &self.known_folders {
            require_absolute(folder.as_str(), value)?;
        }
        for process in &self.processes {
            process.matcher()?;
        }
        Ok(())
    }

    /// Is file redirection enabled for the executable at `executable`?
    ///
    /// The first process entry whose pattern matches the file name decides.
    /// Without any process entries every process is redirected.
    pub fn redirection_enabled(&self, executable: &str) -> Result<bool, ConfigError> {
        if self.processes.is_empty() {
            return Ok(true);
        }
        let name = executable
            .rsplit(['\\', '/'])
            .next()
            .unwrap_or(executable);
        for process in &self.processes {
            if process.matcher()?.is_match(name) {
                let enabled = process.fixups.iter().any(FixupConfig::is_file_redirection);
                tracing::debug!(executable = name, pattern = %process.executable, enabled, "Matched process entry");
                return Ok(enabled);
            }
        }
        Ok(false)
    }

    /// Applies the configured overrides on top of `base`.
    pub fn known_folders(&self, mut base: KnownFolders) -> KnownFolders {
        for (folder, value) in &self.known_folders {
            base.set(*folder, value.clone());
        }
        base
    }

    pub fn roots(&self) -> Result<RedirectionRoots, ConfigError> {
        require_absolute("packageRoot", &self.package_root)?;
        require_absolute("writableRoot", &self.writable_root)?;
        let roots = RedirectionRoots::new(&self.package_root, &self.writable_root)
            .map_err(|_| not_absolute("packageRoot", &self.package_root))?;
        match &self.final_package_root {
            Some(root) => roots
                .with_final_package_root(root)
                .map_err(|_| not_absolute("finalPackageRoot", root)),
            None => Ok(roots),
        }
    }

    pub fn deletion_marker_root(&self) -> String {
        match &self.deletion_marker_root {
            Some(root) => root.clone(),
            None => WhiteoutMarkers::default_root(&self.writable_root),
        }
    }

    pub fn current_dir(&self) -> Arc<dyn CurrentDirectory> {
        match &self.current_directory {
            Some(dir) => Arc::new(FixedCurrentDir::new(dir.clone())),
            None => Arc::new(HostCurrentDir),
        }
    }

    /// Builds a ready to use [`Redirector`] over `fs`, with `base` supplying
    /// the folders the configuration does not override.
    pub fn redirector(
        &self,
        fs: Arc<dyn FileSystem>,
        base: KnownFolders,
    ) -> Result<Redirector, ConfigError> {
        let mappings = VfsMappingTable::new(&self.known_folders(base));
        let resolver = Resolver::new(Arc::new(mappings), Arc::new(self.roots()?));
        let markers = WhiteoutMarkers::new(fs.clone(), self.deletion_marker_root());
        Ok(Redirector::new(resolver, fs, Arc::new(markers)).with_current_dir(self.current_dir()))
    }
}

fn require_absolute(field: &str, value: &str) -> Result<(), ConfigError> {
    if is_absolute(value) {
        Ok(())
    } else {
        Err(not_absolute(field, value))
    }
}

fn not_absolute(field: &str, value: &str) -> ConfigError {
    ConfigError::NotAbsolute {
        field: field.to_string(),
        value: value.to_string(),
    }
}
