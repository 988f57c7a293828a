use std::fmt;
use std::sync::Arc;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::RedirectError;
use crate::mapping::VfsMappingTable;
use crate::path::{self, is_separator, strip_prefix_ci, ClassifiedPath};

/// Which physical location a candidate stands for. Lower values take
/// priority over higher ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum PathRole {
    /// Per-user writable copy under the writable root.
    Redirected,
    /// Package-shipped copy under `<package>\VFS\<name>`.
    VfsMirror,
    /// The path exactly as the application named it.
    AsRequested,
    /// The real folder a `<package>\VFS\<name>` path stands for.
    DevirtualizedNative,
    /// The package path a writable-root path shadows.
    DeredirectedPackage,
}

impl PathRole {
    /// Roles whose contents ship with the package and are never modified.
    pub fn is_package(&self) -> bool {
        matches!(
            self,
            PathRole::VfsMirror | PathRole::DevirtualizedNative | PathRole::DeredirectedPackage
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PathRole::Redirected => "redirected",
            PathRole::VfsMirror => "vfs-mirror",
            PathRole::AsRequested => "as-requested",
            PathRole::DevirtualizedNative => "devirtualized-native",
            PathRole::DeredirectedPackage => "deredirected-package",
        }
    }
}

impl fmt::Display for PathRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Candidate {
    pub role: PathRole,
    pub path: String,
}

/// Every physical location a path may live in, sorted by [`PathRole`].
///
/// There is at most one candidate per role and [`PathRole::AsRequested`] is
/// always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPathSet {
    pub classified: ClassifiedPath,
    candidates: SmallVec<[Candidate; 5]>,
    logical: Option<String>,
}

impl ResolvedPathSet {
    fn new(
        classified: ClassifiedPath,
        mut candidates: SmallVec<[Candidate; 5]>,
        logical: Option<String>,
    ) -> Self {
        candidates.sort_by_key(|c| c.role);
        candidates.dedup_by_key(|c| c.role);
        ResolvedPathSet {
            classified,
            candidates,
            logical,
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.candidates.iter()
    }

    pub fn get(&self, role: PathRole) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.role == role)
    }

    pub fn as_requested(&self) -> &Candidate {
        // constructed with an AsRequested candidate, never removed
        self.get(PathRole::AsRequested)
            .unwrap_or(&self.candidates[0])
    }

    /// The key deletion markers are recorded under.
    ///
    /// Every spelling of one entry (native, package, `VFS` mirror or writable
    /// area) shares the same key.
    pub fn logical_path(&self) -> &str {
        if let Some(logical) = &self.logical {
            return logical;
        }
        self.get(PathRole::DevirtualizedNative)
            .unwrap_or_else(|| self.as_requested())
            .path
            .as_str()
    }

    /// The candidate that lives in the writable area, if any.
    ///
    /// For a path inside the writable root that is the requested path itself.
    pub fn writable(&self) -> Option<&Candidate> {
        self.get(PathRole::Redirected).or_else(|| {
            self.get(PathRole::DeredirectedPackage)
                .map(|_| self.as_requested())
        })
    }

    /// Does `role` name the writable candidate of this set?
    pub fn is_writable_role(&self, role: PathRole) -> bool {
        self.writable().is_some_and(|c| c.role == role)
    }

    /// Does anything other than the literal path take part?
    pub fn is_virtualized(&self) -> bool {
        self.candidates.len() > 1
    }
}

impl<'a> IntoIterator for &'a ResolvedPathSet {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// The package install location and the per-user writable area.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct RedirectionRoots {
    pub package_root: String,
    pub writable_root: String,
    /// Alternate spelling of the package root, mapped onto `package_root`.
    pub final_package_root: Option<String>,
}

impl RedirectionRoots {
    pub fn new(
        package_root: impl AsRef<str>,
        writable_root: impl AsRef<str>,
    ) -> Result<Self, RedirectError> {
        Ok(RedirectionRoots {
            package_root: absolute_root(package_root.as_ref())?,
            writable_root: absolute_root(writable_root.as_ref())?,
            final_package_root: None,
        })
    }

    pub fn with_final_package_root(mut self, root: impl AsRef<str>) -> Result<Self, RedirectError> {
        self.final_package_root = Some(absolute_root(root.as_ref())?);
        Ok(self)
    }

    /// The path relative to whichever package root contains it.
    pub fn package_relative<'a>(&self, path: &'a str) -> Option<&'a str> {
        strip_prefix_ci(path, &self.package_root).or_else(|| {
            self.final_package_root
                .as_deref()
                .and_then(|root| strip_prefix_ci(path, root))
        })
    }

    pub fn contains_package_path(&self, path: &str) -> bool {
        self.package_relative(path).is_some()
    }

    pub fn writable_relative<'a>(&self, path: &'a str) -> Option<&'a str> {
        strip_prefix_ci(path, &self.writable_root)
    }
}

fn absolute_root(root: &str) -> Result<String, RedirectError> {
    path::normalize_absolute(root).ok_or(RedirectError::InvalidPath)
}

/// Computes candidate locations from the mapping table and the roots.
#[derive(Debug, Clone)]
pub struct Resolver {
    mappings: Arc<VfsMappingTable>,
    roots: Arc<RedirectionRoots>,
}

impl Resolver {
    pub fn new(mappings: Arc<VfsMappingTable>, roots: Arc<RedirectionRoots>) -> Self {
        Resolver { mappings, roots }
    }

    pub fn mappings(&self) -> &VfsMappingTable {
        &self.mappings
    }

    pub fn roots(&self) -> &RedirectionRoots {
        &self.roots
    }

    pub fn resolve(&self, classified: ClassifiedPath) -> ResolvedPathSet {
        let mut candidates = SmallVec::new();

        if !classified.is_redirectable() {
            candidates.push(Candidate {
                role: PathRole::AsRequested,
                path: classified.original.clone(),
            });
            return ResolvedPathSet::new(classified, candidates, None);
        }

        let normalized = classified.normalized.as_str();
        let roots = &*self.roots;

        let mut logical = None;
        if let Some(rel) = roots.writable_relative(normalized) {
            let package = path::join(&roots.package_root, rel);
            logical = Some(self.devirtualize(rel).unwrap_or_else(|| package.clone()));
            candidates.push(Candidate {
                role: PathRole::DeredirectedPackage,
                path: package,
            });
        } else if let Some(rel) = roots.package_relative(normalized) {
            candidates.push(Candidate {
                role: PathRole::Redirected,
                path: path::join(&roots.writable_root, rel),
            });
            if let Some(native) = self.devirtualize(rel) {
                candidates.push(Candidate {
                    role: PathRole::DevirtualizedNative,
                    path: native,
                });
            }
        } else if let Some(found) = self.mappings.find_mapping(normalized) {
            let vfs_rel = path::join(&path::join("VFS", &found.mapping.vfs_name), found.suffix);
            candidates.push(Candidate {
                role: PathRole::VfsMirror,
                path: path::join(&roots.package_root, &vfs_rel),
            });
            candidates.push(Candidate {
                role: PathRole::Redirected,
                path: path::join(&roots.writable_root, &vfs_rel),
            });
        }

        candidates.push(Candidate {
            role: PathRole::AsRequested,
            path: classified.normalized.clone(),
        });

        let set = ResolvedPathSet::new(classified, candidates, logical);
        tracing::trace!(
            path = %set.classified.normalized,
            candidates = set.candidates.len(),
            "Resolved candidates",
        );
        set
    }

    /// Maps a package-relative `VFS\<name>\rest` onto the real folder.
    fn devirtualize(&self, rel: &str) -> Option<String> {
        let mut parts = rel.splitn(3, is_separator);
        let vfs = parts.next()?;
        if !vfs.eq_ignore_ascii_case("VFS") {
            return None;
        }
        let name = parts.next()?;
        let rest = parts.next().unwrap_or_default();
        let mapping = self.mappings.find_by_vfs_name(name)?;
        Some(path::join(&mapping.real_folder, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{KnownFolder, KnownFolders};
    use crate::path::{classify, FixedCurrentDir};
    use pretty_assertions::assert_eq;

    const PKG: &str = r"C:\Program Files\WindowsApps\Contoso_1.0_x64__abc";
    const WRITABLE: &str = r"C:\Users\u\AppData\Local\Packages\Contoso_abc\LocalCache\Local\WritablePackageRoot";

    fn resolver() -> Resolver {
        let folders = KnownFolders::new()
            .with(KnownFolder::ProgramFilesX64, r"C:\Program Files")
            .with(KnownFolder::ProgramFilesX86, r"C:\Program Files (x86)")
            .with(KnownFolder::Windows, r"C:\Windows")
            .with(KnownFolder::SystemX64, r"C:\Windows\System32")
            .with(KnownFolder::LocalAppData, r"C:\Users\u\AppData\Local");
        let roots = RedirectionRoots::new(PKG, WRITABLE)
            .unwrap()
            .with_final_package_root(r"D:\Staged\Contoso")
            .unwrap();
        Resolver::new(
            Arc::new(VfsMappingTable::new(&folders)),
            Arc::new(roots),
        )
    }

    fn resolve(path: &str) -> Vec<(PathRole, String)> {
        let cwd = FixedCurrentDir::new(r"C:\work");
        resolver()
            .resolve(classify(path, &cwd))
            .iter()
            .map(|c| (c.role, c.path.clone()))
            .collect()
    }

    #[test]
    fn mapped_folder_gets_mirror_and_redirected() {
        assert_eq!(
            resolve(r"C:\Program Files\App\a.ini"),
            vec![
                (
                    PathRole::Redirected,
                    format!(r"{WRITABLE}\VFS\ProgramFilesX64\App\a.ini")
                ),
                (
                    PathRole::VfsMirror,
                    format!(r"{PKG}\VFS\ProgramFilesX64\App\a.ini")
                ),
                (PathRole::AsRequested, r"C:\Program Files\App\a.ini".to_string()),
            ]
        );
    }

    #[test]
    fn package_paths_are_checked_before_folder_mapping() {
        assert_eq!(
            resolve(&format!(r"{PKG}\VFS\SystemX64\x.dll")),
            vec![
                (
                    PathRole::Redirected,
                    format!(r"{WRITABLE}\VFS\SystemX64\x.dll")
                ),
                (PathRole::AsRequested, format!(r"{PKG}\VFS\SystemX64\x.dll")),
                (
                    PathRole::DevirtualizedNative,
                    r"C:\Windows\System32\x.dll".to_string()
                ),
            ]
        );
    }

    #[test]
    fn final_package_root_maps_onto_package_root() {
        assert_eq!(
            resolve(r"D:\Staged\Contoso\app.exe"),
            vec![
                (PathRole::Redirected, format!(r"{WRITABLE}\app.exe")),
                (PathRole::AsRequested, r"D:\Staged\Contoso\app.exe".to_string()),
            ]
        );
    }

    #[test]
    fn writable_paths_point_back_into_the_package() {
        assert_eq!(
            resolve(&format!(r"{WRITABLE}\VFS\ProgramFilesX64\App\a.ini")),
            vec![
                (
                    PathRole::AsRequested,
                    format!(r"{WRITABLE}\VFS\ProgramFilesX64\App\a.ini")
                ),
                (
                    PathRole::DeredirectedPackage,
                    format!(r"{PKG}\VFS\ProgramFilesX64\App\a.ini")
                ),
            ]
        );
    }

    #[test]
    fn unmapped_and_device_paths_only_as_requested() {
        assert_eq!(
            resolve(r"E:\data\x.txt"),
            vec![(PathRole::AsRequested, r"E:\data\x.txt".to_string())]
        );
        assert_eq!(
            resolve(r"\\?\C:\Program Files\x"),
            vec![(PathRole::AsRequested, r"\\?\C:\Program Files\x".to_string())]
        );
    }

    #[test]
    fn logical_path_prefers_the_native_location() {
        let cwd = FixedCurrentDir::new(r"C:\work");
        let r = resolver();
        let set = r.resolve(classify(&format!(r"{PKG}\VFS\SystemX64\x.dll"), &cwd));
        assert_eq!(set.logical_path(), r"C:\Windows\System32\x.dll");
        let set = r.resolve(classify(r"C:\Program Files\App", &cwd));
        assert_eq!(set.logical_path(), r"C:\Program Files\App");
        assert!(set.is_virtualized());
        assert_eq!(set.writable().map(|c| c.role), Some(PathRole::Redirected));
    }

    #[test]
    fn writable_area_paths_share_the_native_key() {
        let cwd = FixedCurrentDir::new(r"C:\work");
        let r = resolver();

        let set = r.resolve(classify(
            &format!(r"{WRITABLE}\VFS\ProgramFilesX64\App\a.ini"),
            &cwd,
        ));
        assert_eq!(set.logical_path(), r"C:\Program Files\App\a.ini");
        let writable = set.writable().unwrap();
        assert_eq!(writable.role, PathRole::AsRequested);
        assert_eq!(
            writable.path,
            format!(r"{WRITABLE}\VFS\ProgramFilesX64\App\a.ini")
        );
        assert!(set.is_writable_role(PathRole::AsRequested));
        assert!(!set.is_writable_role(PathRole::DeredirectedPackage));

        let set = r.resolve(classify(&format!(r"{WRITABLE}\app.exe"), &cwd));
        assert_eq!(set.logical_path(), format!(r"{PKG}\app.exe"));

        let set = r.resolve(classify(r"E:\data\x.txt", &cwd));
        assert_eq!(set.writable(), None);
    }

    #[test]
    fn roots_must_be_absolute() {
        assert_eq!(
            RedirectionRoots::new("relative", WRITABLE),
            Err(RedirectError::InvalidPath)
        );
        let roots = RedirectionRoots::new(r"C:\pkg\", r"\\srv\share\w").unwrap();
        assert_eq!(roots.package_root, r"C:\pkg");
        assert!(roots.contains_package_path(r"c:\PKG\x"));
        assert!(!roots.contains_package_path(r"C:\pkg2\x"));
    }
}
