use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

use crate::path::{self, fold, strip_prefix_ci};

/// Well-known system folders that have a mirror inside the package's `VFS`
/// directory.
///
/// The declaration order is the order mappings are registered in, which
/// decides which folder wins when two of them resolve to the same location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum KnownFolder {
    SystemX86,
    ProgramFilesX86,
    ProgramFilesCommonX86,
    ProgramFilesX64,
    ProgramFilesCommonX64,
    SystemX64,
    Fonts,
    Windows,
    ProgramData,
    LocalAppData,
    RoamingAppData,
    PublicDesktop,
    CommonPrograms,
    LocalAppDataLow,
    Documents,
    PublicDocuments,
}

impl KnownFolder {
    pub const ALL: [KnownFolder; 16] = [
        KnownFolder::SystemX86,
        KnownFolder::ProgramFilesX86,
        KnownFolder::ProgramFilesCommonX86,
        KnownFolder::ProgramFilesX64,
        KnownFolder::ProgramFilesCommonX64,
        KnownFolder::SystemX64,
        KnownFolder::Fonts,
        KnownFolder::Windows,
        KnownFolder::ProgramData,
        KnownFolder::LocalAppData,
        KnownFolder::RoamingAppData,
        KnownFolder::PublicDesktop,
        KnownFolder::CommonPrograms,
        KnownFolder::LocalAppDataLow,
        KnownFolder::Documents,
        KnownFolder::PublicDocuments,
    ];

    /// Name of the subfolder under `<package>\VFS` that mirrors this folder.
    pub fn vfs_name(&self) -> &'static str {
        match self {
            KnownFolder::SystemX86 => "SystemX86",
            KnownFolder::ProgramFilesX86 => "ProgramFilesX86",
            KnownFolder::ProgramFilesCommonX86 => "ProgramFilesCommonX86",
            KnownFolder::ProgramFilesX64 => "ProgramFilesX64",
            KnownFolder::ProgramFilesCommonX64 => "ProgramFilesCommonX64",
            KnownFolder::SystemX64 => "SystemX64",
            KnownFolder::Fonts => "Fonts",
            KnownFolder::Windows => "Windows",
            KnownFolder::ProgramData => "Common AppData",
            KnownFolder::LocalAppData => "Local AppData",
            KnownFolder::RoamingAppData => "AppData",
            KnownFolder::PublicDesktop => "Common Desktop",
            KnownFolder::CommonPrograms => "Common Programs",
            KnownFolder::LocalAppDataLow => "LocalAppDataLow",
            KnownFolder::Documents => "Personal",
            KnownFolder::PublicDocuments => "Common Documents",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KnownFolder::SystemX86 => "SystemX86",
            KnownFolder::ProgramFilesX86 => "ProgramFilesX86",
            KnownFolder::ProgramFilesCommonX86 => "ProgramFilesCommonX86",
            KnownFolder::ProgramFilesX64 => "ProgramFilesX64",
            KnownFolder::ProgramFilesCommonX64 => "ProgramFilesCommonX64",
            KnownFolder::SystemX64 => "SystemX64",
            KnownFolder::Fonts => "Fonts",
            KnownFolder::Windows => "Windows",
            KnownFolder::ProgramData => "ProgramData",
            KnownFolder::LocalAppData => "LocalAppData",
            KnownFolder::RoamingAppData => "RoamingAppData",
            KnownFolder::PublicDesktop => "PublicDesktop",
            KnownFolder::CommonPrograms => "CommonPrograms",
            KnownFolder::LocalAppDataLow => "LocalAppDataLow",
            KnownFolder::Documents => "Documents",
            KnownFolder::PublicDocuments => "PublicDocuments",
        }
    }
}

impl fmt::Display for KnownFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown folder \"{0}\"")]
pub struct UnknownFolderError(pub String);

impl FromStr for KnownFolder {
    type Err = UnknownFolderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KnownFolder::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownFolderError(s.to_string()))
    }
}

/// Resolved real locations of the known folders on this machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownFolders {
    folders: BTreeMap<KnownFolder, String>,
}

impl KnownFolders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the folders from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolves the folders through an environment lookup function.
    ///
    /// Variables that are missing or not absolute leave their folder unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let value = lookup(name)?;
            match path::normalize_absolute(value.trim()) {
                Some(value) => Some(value),
                None => {
                    tracing::debug!(name, value = %value, "Ignoring non-absolute folder variable");
                    None
                }
            }
        };

        let mut folders = KnownFolders::new();

        let program_files_x64 = var("ProgramW6432");
        let is_64bit = program_files_x64.is_some();
        folders.set_opt(KnownFolder::ProgramFilesX64, program_files_x64);
        folders.set_opt(
            KnownFolder::ProgramFilesX86,
            var("ProgramFiles(x86)").or_else(|| var("ProgramFiles")),
        );
        folders.set_opt(
            KnownFolder::ProgramFilesCommonX64,
            var("CommonProgramW6432"),
        );
        folders.set_opt(
            KnownFolder::ProgramFilesCommonX86,
            var("CommonProgramFiles(x86)").or_else(|| var("CommonProgramFiles")),
        );

        if let Some(windows) = var("SystemRoot").or_else(|| var("windir")) {
            folders.set(KnownFolder::Fonts, path::join(&windows, "Fonts"));
            if is_64bit {
                folders.set(KnownFolder::SystemX64, path::join(&windows, "System32"));
                folders.set(KnownFolder::SystemX86, path::join(&windows, "SysWOW64"));
            } else {
                folders.set(KnownFolder::SystemX86, path::join(&windows, "System32"));
            }
            folders.set(KnownFolder::Windows, windows);
        }

        if let Some(program_data) = var("ProgramData") {
            folders.set(
                KnownFolder::CommonPrograms,
                path::join(&program_data, r"Microsoft\Windows\Start Menu\Programs"),
            );
            folders.set(KnownFolder::ProgramData, program_data);
        }

        folders.set_opt(KnownFolder::LocalAppData, var("LOCALAPPDATA"));
        folders.set_opt(KnownFolder::RoamingAppData, var("APPDATA"));

        if let Some(profile) = var("USERPROFILE") {
            folders.set(
                KnownFolder::LocalAppDataLow,
                path::join(&profile, r"AppData\LocalLow"),
            );
            folders.set(KnownFolder::Documents, path::join(&profile, "Documents"));
        }

        if let Some(public) = var("PUBLIC") {
            folders.set(
                KnownFolder::PublicDocuments,
                path::join(&public, "Documents"),
            );
            folders.set(KnownFolder::PublicDesktop, path::join(&public, "Desktop"));
        }

        folders
    }

    pub fn set(&mut self, folder: KnownFolder, real_path: impl Into<String>) -> &mut Self {
        self.folders.insert(folder, real_path.into());
        self
    }

    fn set_opt(&mut self, folder: KnownFolder, real_path: Option<String>) {
        if let Some(real_path) = real_path {
            self.set(folder, real_path);
        }
    }

    pub fn with(mut self, folder: KnownFolder, real_path: impl Into<String>) -> Self {
        self.set(folder, real_path);
        self
    }

    pub fn remove(&mut self, folder: KnownFolder) -> Option<String> {
        self.folders.remove(&folder)
    }

    pub fn get(&self, folder: KnownFolder) -> Option<&str> {
        self.folders.get(&folder).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (KnownFolder, &str)> + '_ {
        self.folders.iter().map(|(f, p)| (*f, p.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct VfsFolderMapping {
    pub folder: KnownFolder,
    pub real_folder: String,
    pub vfs_name: String,
}

/// A path that fell under one of the mapped folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingMatch<'a> {
    pub mapping: &'a VfsFolderMapping,
    /// Remainder of the path below the real folder, without a leading
    /// separator. Empty when the path is the folder itself.
    pub suffix: &'a str,
}

/// Immutable table of (real folder, VFS subfolder) pairs, ordered longest
/// real folder first so the most specific folder wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VfsMappingTable {
    mappings: Vec<VfsFolderMapping>,
}

impl VfsMappingTable {
    pub fn new(folders: &KnownFolders) -> Self {
        let mut seen = HashSet::new();
        let mut mappings = Vec::new();

        for folder in KnownFolder::ALL {
            let Some(real_folder) = folders.get(folder) else {
                tracing::debug!(%folder, "Skipping unresolved folder");
                continue;
            };
            let real_folder = path::normalize_absolute(real_folder)
                .unwrap_or_else(|| real_folder.to_string());
            if !seen.insert(fold(&real_folder)) {
                tracing::debug!(
                    %folder,
                    real_folder = %real_folder,
                    "Skipping duplicate folder mapping",
                );
                continue;
            }
            mappings.push(VfsFolderMapping {
                folder,
                real_folder,
                vfs_name: folder.vfs_name().to_string(),
            });
        }

        // stable, so equal lengths keep registration order
        mappings.sort_by(|a, b| b.real_folder.chars().count().cmp(&a.real_folder.chars().count()));

        VfsMappingTable { mappings }
    }

    pub fn find_mapping<'a>(&'a self, normalized: &'a str) -> Option<MappingMatch<'a>> {
        self.mappings.iter().find_map(|mapping| {
            strip_prefix_ci(normalized, &mapping.real_folder)
                .map(|suffix| MappingMatch { mapping, suffix })
        })
    }

    pub fn find_by_vfs_name(&self, name: &str) -> Option<&VfsFolderMapping> {
        self.mappings
            .iter()
            .find(|m| path::eq_ignore_case(&m.vfs_name, name))
    }

    pub fn find_by_folder(&self, folder: KnownFolder) -> Option<&VfsFolderMapping> {
        self.mappings.iter().find(|m| m.folder == folder)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VfsFolderMapping> {
        self.mappings.iter()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn x64_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("ProgramW6432", r"C:\Program Files"),
            ("ProgramFiles", r"C:\Program Files"),
            ("ProgramFiles(x86)", r"C:\Program Files (x86)"),
            ("CommonProgramW6432", r"C:\Program Files\Common Files"),
            ("CommonProgramFiles(x86)", r"C:\Program Files (x86)\Common Files"),
            ("SystemRoot", r"C:\Windows"),
            ("ProgramData", r"C:\ProgramData"),
            ("LOCALAPPDATA", r"C:\Users\u\AppData\Local"),
            ("APPDATA", r"C:\Users\u\AppData\Roaming"),
            ("USERPROFILE", r"C:\Users\u"),
            ("PUBLIC", r"C:\Users\Public"),
        ])
    }

    fn table() -> VfsMappingTable {
        let env = x64_env();
        VfsMappingTable::new(&KnownFolders::from_lookup(|n| {
            env.get(n).map(|v| v.to_string())
        }))
    }

    #[test]
    fn folders_resolve_from_environment() {
        let env = x64_env();
        let folders = KnownFolders::from_lookup(|n| env.get(n).map(|v| v.to_string()));
        assert_eq!(folders.get(KnownFolder::ProgramFilesX64), Some(r"C:\Program Files"));
        assert_eq!(folders.get(KnownFolder::SystemX64), Some(r"C:\Windows\System32"));
        assert_eq!(folders.get(KnownFolder::SystemX86), Some(r"C:\Windows\SysWOW64"));
        assert_eq!(
            folders.get(KnownFolder::CommonPrograms),
            Some(r"C:\ProgramData\Microsoft\Windows\Start Menu\Programs")
        );
        assert_eq!(
            folders.get(KnownFolder::LocalAppDataLow),
            Some(r"C:\Users\u\AppData\LocalLow")
        );
    }

    #[test]
    fn missing_variables_leave_folders_absent() {
        let folders = KnownFolders::from_lookup(|n| match n {
            "ProgramFiles" => Some(r"C:\Program Files".to_string()),
            "SystemRoot" => Some(r"C:\Windows".to_string()),
            "APPDATA" => Some("relative".to_string()),
            _ => None,
        });
        assert_eq!(folders.get(KnownFolder::ProgramFilesX64), None);
        assert_eq!(folders.get(KnownFolder::ProgramFilesX86), Some(r"C:\Program Files"));
        assert_eq!(folders.get(KnownFolder::SystemX86), Some(r"C:\Windows\System32"));
        assert_eq!(folders.get(KnownFolder::SystemX64), None);
        assert_eq!(folders.get(KnownFolder::RoamingAppData), None);
    }

    #[test]
    fn longest_folder_wins() {
        let table = table();
        let m = table
            .find_mapping(r"C:\Program Files\Common Files\x.dll")
            .unwrap();
        assert_eq!(m.mapping.folder, KnownFolder::ProgramFilesCommonX64);
        assert_eq!(m.suffix, "x.dll");

        let m = table.find_mapping(r"c:\windows\system32\KERNEL32.dll").unwrap();
        assert_eq!(m.mapping.vfs_name, "SystemX64");

        let m = table.find_mapping(r"C:\Program Files (x86)").unwrap();
        assert_eq!(m.mapping.folder, KnownFolder::ProgramFilesX86);
        assert_eq!(m.suffix, "");

        assert!(table.find_mapping(r"D:\data\x").is_none());
    }

    #[test]
    fn duplicate_real_folders_keep_the_first() {
        let folders = KnownFolders::new()
            .with(KnownFolder::ProgramFilesX86, r"C:\Program Files")
            .with(KnownFolder::ProgramFilesX64, r"C:\PROGRAM FILES\");
        let table = VfsMappingTable::new(&folders);
        assert_eq!(table.len(), 1);
        let m = table.find_mapping(r"C:\Program Files\App").unwrap();
        assert_eq!(m.mapping.folder, KnownFolder::ProgramFilesX86);
    }

    #[test]
    fn lookup_by_vfs_name() {
        let table = table();
        let m = table.find_by_vfs_name("common appdata").unwrap();
        assert_eq!(m.real_folder, r"C:\ProgramData");
        assert!(table.find_by_vfs_name("Nope").is_none());
        assert_eq!("documents".parse::<KnownFolder>(), Ok(KnownFolder::Documents));
    }
}
