//! Compound file operations on top of resolution, selection and enumeration.

use std::fmt;
use std::sync::Arc;

use crate::enumerate::{self, FindHandle};
use crate::error::RedirectError;
use crate::path::{self, classify, split_parent, ClassifiedPath, CurrentDirectory, HostCurrentDir};
use crate::resolve::{PathRole, ResolvedPathSet, Resolver};
use crate::select::{self, Choice, OpKind, Preparation};
use crate::whiteout::DeletionMarkers;
use crate::{ops, FileSystem, FsError, Metadata, OpenOptionsConfig, VirtualFile};

pub type Result<T, E = RedirectError> = std::result::Result<T, E>;

/// A file opened through the redirector.
#[derive(Debug)]
pub struct OpenedFile {
    pub file: Box<dyn VirtualFile + Send + Sync + 'static>,
    /// The physical location that was opened.
    pub path: String,
    pub role: PathRole,
    /// Did the file exist before it was opened?
    pub existed: bool,
}

/// Runs file operations against the location each path resolves to.
///
/// Only redirectable paths are handled; everything else fails with
/// [`RedirectError::Unsupported`] so the caller can fall back to the
/// unmodified OS primitive.
#[derive(Clone)]
pub struct Redirector {
    resolver: Resolver,
    fs: Arc<dyn FileSystem>,
    markers: Arc<dyn DeletionMarkers>,
    cwd: Arc<dyn CurrentDirectory>,
}

impl fmt::Debug for Redirector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redirector")
            .field("resolver", &self.resolver)
            .field("fs", &self.fs)
            .field("markers", &self.markers)
            .finish()
    }
}

impl Redirector {
    pub fn new(
        resolver: Resolver,
        fs: Arc<dyn FileSystem>,
        markers: Arc<dyn DeletionMarkers>,
    ) -> Self {
        Redirector {
            resolver,
            fs,
            markers,
            cwd: Arc::new(HostCurrentDir),
        }
    }

    pub fn with_current_dir(mut self, cwd: Arc<dyn CurrentDirectory>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn markers(&self) -> &Arc<dyn DeletionMarkers> {
        &self.markers
    }

    pub fn classify(&self, path: &str) -> ClassifiedPath {
        classify(path, self.cwd.as_ref())
    }

    pub fn resolve(&self, path: &str) -> ResolvedPathSet {
        self.resolver.resolve(self.classify(path))
    }

    pub fn select(&self, path: &str, op: OpKind) -> Result<Choice> {
        select::select(&self.resolve(path), op, self.fs.as_ref(), self.markers.as_ref())
    }

    pub fn prepare(&self, choice: &Choice) -> Result<()> {
        select::prepare(choice, self.fs.as_ref())
    }

    pub fn is_package_path(&self, path: &str) -> bool {
        let classified = self.classify(path);
        classified.is_redirectable()
            && self
                .resolver
                .roots()
                .contains_package_path(&classified.normalized)
    }

    /// Resolves a path the redirector is able to handle.
    fn handled(&self, path: &str) -> Result<ResolvedPathSet> {
        let set = self.resolve(path);
        match set.classified.category {
            path::PathCategory::Unknown => Err(RedirectError::InvalidPath),
            category if !category.is_redirectable() => Err(RedirectError::Unsupported),
            _ => Ok(set),
        }
    }

    fn choose(&self, set: &ResolvedPathSet, op: OpKind) -> Result<Choice> {
        select::select(set, op, self.fs.as_ref(), self.markers.as_ref())
    }

    /// Moves a mutation of an existing entry outside the writable area into
    /// the writable location, copying the current content up when `copy` is
    /// set.
    fn redirect_mutation(&self, set: &ResolvedPathSet, choice: Choice, copy: bool) -> Choice {
        let Some(redirected) = set.writable() else {
            return choice;
        };
        if choice.role == redirected.role || choice.existing.is_none() {
            return choice;
        }
        let preparation = if copy {
            Preparation::CopyUp {
                source: choice.path.clone(),
            }
        } else if split_parent(&redirected.path).is_some_and(|(p, _)| ops::is_dir(self.fs.as_ref(), p)) {
            Preparation::None
        } else {
            Preparation::CreateParents
        };
        Choice {
            path: redirected.path.clone(),
            role: redirected.role,
            existing: if copy { choice.existing } else { None },
            preparation,
        }
    }

    /// Is any candidate below `role` still present?
    fn lower_present(&self, set: &ResolvedPathSet, role: PathRole) -> bool {
        set.iter()
            .filter(|c| c.role > role)
            .any(|c| ops::exists(self.fs.as_ref(), &c.path))
    }

    fn mark_deleted(&self, set: &ResolvedPathSet) -> Result<()> {
        self.markers.mark_deleted(set.logical_path())?;
        Ok(())
    }

    fn clear_marker(&self, set: &ResolvedPathSet) {
        if !set.is_virtualized() {
            return;
        }
        if let Err(error) = self.markers.unmark_deleted(set.logical_path()) {
            tracing::warn!(path=%set.logical_path(), %error, "Unable to clear deletion marker");
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(path = %path))]
    pub fn open(&self, path: &str, conf: &OpenOptionsConfig) -> Result<OpenedFile> {
        let set = self.handled(path)?;
        let op = if conf.create_new() {
            OpKind::CreateNew
        } else if conf.create() {
            OpKind::CreateOrOpen
        } else if conf.would_mutate() {
            OpKind::MustExistForWrite
        } else {
            OpKind::MustExistForRead
        };

        let mut choice = self.choose(&set, op)?;
        if op == OpKind::CreateOrOpen && conf.would_mutate() {
            choice = self.redirect_mutation(&set, choice, !conf.truncate());
        }
        self.prepare(&choice)?;

        let existed = choice.existing.is_some();
        let mut conf = conf.clone();
        if matches!(choice.preparation, Preparation::CopyUp { .. }) {
            conf.create_new = false;
        }
        let file = self.fs.new_open_options().options(conf).open(&choice.path)?;
        if !existed {
            self.clear_marker(&set);
        }

        tracing::debug!(target_path=%choice.path, role=?choice.role, existed, "Opened file");
        Ok(OpenedFile {
            file,
            path: choice.path,
            role: choice.role,
            existed,
        })
    }

    pub fn metadata(&self, path: &str) -> Result<Metadata> {
        let set = self.handled(path)?;
        let choice = self.choose(&set, OpKind::MustExistForRead)?;
        match choice.existing {
            Some(meta) => Ok(meta),
            None => Ok(self.fs.metadata(&choice.path)?),
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.metadata(path).is_ok()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(path = %path))]
    pub fn delete_file(&self, path: &str) -> Result<()> {
        let set = self.handled(path)?;
        let choice = self.choose(&set, OpKind::DeleteExisting)?;
        if choice.existing.as_ref().is_some_and(Metadata::is_dir) {
            return Err(RedirectError::AccessDenied);
        }
        self.remove_chosen(&set, &choice, |fs, p| fs.remove_file(p))
    }

    /// Applies the deletion policy to the chosen candidate.
    fn remove_chosen(
        &self,
        set: &ResolvedPathSet,
        choice: &Choice,
        remove: impl Fn(&dyn FileSystem, &str) -> crate::Result<()>,
    ) -> Result<()> {
        match choice.role {
            PathRole::Redirected => {
                remove(self.fs.as_ref(), &choice.path)?;
                if self.lower_present(set, choice.role) {
                    self.mark_deleted(set)?;
                }
            }
            PathRole::VfsMirror | PathRole::DevirtualizedNative | PathRole::DeredirectedPackage => {
                self.mark_deleted(set)?;
            }
            PathRole::AsRequested => match remove(self.fs.as_ref(), &choice.path) {
                Ok(()) => {
                    if self.lower_present(set, choice.role) {
                        self.mark_deleted(set)?;
                    }
                }
                Err(FsError::PermissionDenied) | Err(FsError::DirectoryNotEmpty)
                    if set.get(PathRole::Redirected).is_some() =>
                {
                    tracing::debug!(path=%choice.path, "Unable to remove native entry, hiding it instead");
                    self.mark_deleted(set)?;
                }
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(path = %path))]
    pub fn create_dir(&self, path: &str) -> Result<()> {
        let set = self.handled(path)?;
        let choice = self.choose(&set, OpKind::CreateNew)?;
        self.prepare(&choice)?;
        self.fs.create_dir(&choice.path)?;
        self.clear_marker(&set);
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(path = %path))]
    pub fn remove_dir(&self, path: &str) -> Result<()> {
        let set = self.handled(path)?;
        let choice = self.choose(&set, OpKind::DeleteExisting)?;
        if !choice.existing.as_ref().is_some_and(Metadata::is_dir) {
            return Err(RedirectError::NotADirectory);
        }

        match enumerate::find_first(&set, "*", self.fs.clone(), self.markers.as_ref()) {
            Ok(_) => return Err(RedirectError::DirectoryNotEmpty),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        self.remove_chosen(&set, &choice, |fs, p| fs.remove_dir(p))
    }

    #[tracing::instrument(level = "debug", skip_all, fields(from = %from, to = %to))]
    pub fn copy_file(&self, from: &str, to: &str, fail_if_exists: bool) -> Result<()> {
        let from_set = self.handled(from)?;
        let to_set = self.handled(to)?;

        let source = self.choose(&from_set, OpKind::MustExistForRead)?;
        if source.existing.as_ref().is_some_and(Metadata::is_dir) {
            return Err(RedirectError::AccessDenied);
        }

        let op = if fail_if_exists {
            OpKind::CreateNew
        } else {
            OpKind::CreateOrOpen
        };
        let target = self.choose(&to_set, op)?;
        if target.existing.as_ref().is_some_and(Metadata::is_dir) {
            return Err(RedirectError::AccessDenied);
        }
        let target = self.redirect_mutation(&to_set, target, false);
        self.prepare(&target)?;

        self.fs.copy_file(&source.path, &target.path)?;
        self.clear_marker(&to_set);
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(from = %from, to = %to))]
    pub fn rename(&self, from: &str, to: &str, replace_existing: bool) -> Result<()> {
        let from_set = self.handled(from)?;
        let to_set = self.handled(to)?;

        let source = self.choose(&from_set, OpKind::DeleteExisting)?;
        let source_is_dir = source.existing.as_ref().is_some_and(Metadata::is_dir);

        let op = if replace_existing {
            OpKind::CreateOrOpen
        } else {
            OpKind::CreateNew
        };
        let target = self.choose(&to_set, op)?;
        if target.existing.is_some() && (source_is_dir || target.existing.as_ref().is_some_and(Metadata::is_dir)) {
            return Err(RedirectError::AccessDenied);
        }
        let target = self.redirect_mutation(&to_set, target, false);
        self.prepare(&target)?;

        if source.role.is_package() {
            ops::copy_tree(self.fs.as_ref(), &source.path, &target.path)?;
            self.mark_deleted(&from_set)?;
        } else {
            self.fs.rename(&source.path, &target.path)?;
            if self.lower_present(&from_set, source.role) {
                self.mark_deleted(&from_set)?;
            }
        }
        self.clear_marker(&to_set);
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(link = %link, existing = %existing))]
    pub fn hard_link(&self, link: &str, existing: &str) -> Result<()> {
        let existing_set = self.handled(existing)?;
        let link_set = self.handled(link)?;

        let original = self.choose(&existing_set, OpKind::MustExistForRead)?;
        if original.existing.as_ref().is_some_and(Metadata::is_dir) {
            return Err(RedirectError::AccessDenied);
        }
        let new_link = self.choose(&link_set, OpKind::CreateNew)?;
        self.prepare(&new_link)?;

        self.fs.hard_link(&original.path, &new_link.path)?;
        self.clear_marker(&link_set);
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(link = %link, target = %target))]
    pub fn symlink(&self, link: &str, target: &str, is_dir: bool) -> Result<()> {
        let link_set = self.handled(link)?;

        let target = if path::is_absolute(target) {
            match self.select(target, OpKind::MustExistForRead) {
                Ok(choice) => choice.path,
                // dangling links are allowed
                Err(e) if e.is_not_found() => self.classify(target).normalized,
                Err(e) => return Err(e),
            }
        } else {
            target.to_string()
        };

        let new_link = self.choose(&link_set, OpKind::CreateNew)?;
        self.prepare(&new_link)?;
        self.fs.symlink(&target, &new_link.path, is_dir)?;
        self.clear_marker(&link_set);
        Ok(())
    }

    /// Starts a merged enumeration for a `dir\pattern` path.
    #[tracing::instrument(level = "debug", skip_all, fields(pattern = %pattern))]
    pub fn find_first(&self, pattern: &str) -> Result<FindHandle> {
        let classified = self.classify(pattern);
        match classified.category {
            path::PathCategory::Unknown => return Err(RedirectError::InvalidPath),
            category if !category.is_redirectable() => return Err(RedirectError::Unsupported),
            _ => {}
        }
        let (dir, fragment) =
            split_parent(&classified.normalized).ok_or(RedirectError::FileNotFound)?;
        let dir_set = self.resolve(dir);
        enumerate::find_first(&dir_set, fragment, self.fs.clone(), self.markers.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{KnownFolder, KnownFolders, VfsMappingTable};
    use crate::mem_fs::FileSystem as MemFS;
    use crate::path::FixedCurrentDir;
    use crate::resolve::RedirectionRoots;
    use crate::whiteout::WhiteoutMarkers;
    use pretty_assertions::assert_eq;
    use std::io::{Read, Seek, Write};

    const APP: &str = r"C:\Program Files\App";
    const MIRROR: &str = r"C:\pkg\VFS\ProgramFilesX64\App";
    const REDIRECTED: &str = r"C:\writable\VFS\ProgramFilesX64\App";

    fn redirector() -> (MemFS, Redirector) {
        let fs = MemFS::default();
        ops::create_dir_all(&fs, r"C:\Program Files").unwrap();
        let folders = KnownFolders::new().with(KnownFolder::ProgramFilesX64, r"C:\Program Files");
        let resolver = Resolver::new(
            Arc::new(VfsMappingTable::new(&folders)),
            Arc::new(RedirectionRoots::new(r"C:\pkg", r"C:\writable").unwrap()),
        );
        let shared: Arc<dyn FileSystem> = Arc::new(fs.clone());
        let markers = Arc::new(WhiteoutMarkers::new(shared.clone(), r"C:\DeletionMarkers"));
        let redirector = Redirector::new(resolver, shared, markers)
            .with_current_dir(Arc::new(FixedCurrentDir::new(APP)));
        (fs, redirector)
    }

    fn read(r: &Redirector, path: &str) -> String {
        let conf = OpenOptionsConfig {
            read: true,
            ..Default::default()
        };
        let mut opened = r.open(path, &conf).unwrap();
        let mut s = String::new();
        opened.file.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn writes_never_touch_the_package() {
        let (fs, r) = redirector();
        ops::write(&fs, &format!(r"{MIRROR}\settings.ini"), b"defaults").unwrap();

        let conf = OpenOptionsConfig {
            read: true,
            write: true,
            ..Default::default()
        };
        let mut opened = r.open(r"C:\Program Files\App\settings.ini", &conf).unwrap();
        assert_eq!(opened.role, PathRole::Redirected);
        assert!(opened.existed);
        opened.file.seek(std::io::SeekFrom::End(0)).unwrap();
        opened.file.write_all(b"+user").unwrap();
        drop(opened);

        assert_eq!(read(&r, "settings.ini"), "defaults+user");
        assert_eq!(
            ops::read_to_string(&fs, &format!(r"{MIRROR}\settings.ini")).unwrap(),
            "defaults"
        );
    }

    #[test]
    fn writes_through_the_writable_area_copy_up() {
        let (fs, r) = redirector();
        ops::write(&fs, &format!(r"{MIRROR}\a.ini"), b"pkg").unwrap();
        ops::write(&fs, &format!(r"{MIRROR}\b.ini"), b"pkg").unwrap();

        assert_eq!(read(&r, &format!(r"{REDIRECTED}\a.ini")), "pkg");

        let conf = OpenOptionsConfig {
            read: true,
            write: true,
            ..Default::default()
        };
        let mut opened = r.open(&format!(r"{REDIRECTED}\a.ini"), &conf).unwrap();
        assert_eq!(opened.role, PathRole::AsRequested);
        assert_eq!(opened.path, format!(r"{REDIRECTED}\a.ini"));
        opened.file.write_all(b"USER").unwrap();
        drop(opened);

        let conf = OpenOptionsConfig {
            write: true,
            create: true,
            ..Default::default()
        };
        let opened = r.open(&format!(r"{REDIRECTED}\b.ini"), &conf).unwrap();
        assert_eq!(opened.path, format!(r"{REDIRECTED}\b.ini"));
        drop(opened);

        assert_eq!(ops::read_to_string(&fs, &format!(r"{REDIRECTED}\a.ini")).unwrap(), "USER");
        assert_eq!(ops::read_to_string(&fs, &format!(r"{REDIRECTED}\b.ini")).unwrap(), "pkg");
        assert_eq!(ops::read_to_string(&fs, &format!(r"{MIRROR}\a.ini")).unwrap(), "pkg");
        assert_eq!(read(&r, r"C:\Program Files\App\a.ini"), "USER");
    }

    #[test]
    fn delete_through_the_writable_area_hides_every_view() {
        let (fs, r) = redirector();
        ops::write(&fs, &format!(r"{MIRROR}\a.ini"), b"pkg").unwrap();
        ops::write(&fs, &format!(r"{MIRROR}\b.ini"), b"pkg").unwrap();

        r.delete_file(&format!(r"{REDIRECTED}\a.ini")).unwrap();
        assert!(ops::exists(&fs, &format!(r"{MIRROR}\a.ini")));
        assert!(r.markers().is_marked_deleted(r"C:\Program Files\App\a.ini"));

        assert!(!r.exists(r"C:\Program Files\App\a.ini"));
        assert!(!r.exists(&format!(r"{MIRROR}\a.ini")));
        assert!(!r.exists(&format!(r"{REDIRECTED}\a.ini")));

        let names: Vec<String> = r
            .find_first(r"C:\Program Files\App\*")
            .unwrap()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["b.ini".to_string()]);
    }

    #[test]
    fn removed_package_directory_takes_no_new_files() {
        let (fs, r) = redirector();
        ops::write(&fs, &format!(r"{MIRROR}\data\x.bin"), b"pkg").unwrap();

        r.delete_file(r"C:\Program Files\App\data\x.bin").unwrap();
        r.remove_dir(r"C:\Program Files\App\data").unwrap();
        assert!(!r.exists(r"C:\Program Files\App\data"));

        let conf = OpenOptionsConfig {
            write: true,
            create_new: true,
            ..Default::default()
        };
        assert_eq!(
            r.open(r"C:\Program Files\App\data\new.txt", &conf).map(|o| o.path),
            Err(RedirectError::PathNotFound)
        );
        assert!(!ops::exists(&fs, &format!(r"{REDIRECTED}\data\new.txt")));

        r.create_dir(r"C:\Program Files\App\data").unwrap();
        let opened = r.open(r"C:\Program Files\App\data\new.txt", &conf).unwrap();
        assert_eq!(opened.path, format!(r"{REDIRECTED}\data\new.txt"));
    }

    #[test]
    fn open_always_on_package_file_copies_up() {
        let (fs, r) = redirector();
        ops::write(&fs, &format!(r"{MIRROR}\log.txt"), b"old").unwrap();
        let conf = OpenOptionsConfig {
            append: true,
            create: true,
            ..Default::default()
        };
        let mut opened = r.open(r"C:\Program Files\App\log.txt", &conf).unwrap();
        opened.file.write_all(b"+new").unwrap();
        assert_eq!(opened.path, format!(r"{REDIRECTED}\log.txt"));
        drop(opened);
        assert_eq!(read(&r, r"C:\Program Files\App\log.txt"), "old+new");
    }

    #[test]
    #[tracing_test::traced_test]
    fn copy_up_is_logged() {
        let (fs, r) = redirector();
        ops::write(&fs, &format!(r"{MIRROR}\x.dat"), b"").unwrap();
        let conf = OpenOptionsConfig {
            write: true,
            ..Default::default()
        };
        r.open(r"C:\Program Files\App\x.dat", &conf).unwrap();
        assert!(logs_contain("Copied into the redirected location"));
    }

    #[test]
    fn delete_of_package_file_marks_it() {
        let (fs, r) = redirector();
        ops::write(&fs, &format!(r"{MIRROR}\a.txt"), b"pkg").unwrap();
        r.delete_file(r"C:\Program Files\App\a.txt").unwrap();

        assert!(ops::exists(&fs, &format!(r"{MIRROR}\a.txt")));
        assert!(!r.exists(r"C:\Program Files\App\a.txt"));
        assert_eq!(
            r.delete_file(r"C:\Program Files\App\a.txt"),
            Err(RedirectError::FileNotFound)
        );

        let conf = OpenOptionsConfig {
            write: true,
            create_new: true,
            ..Default::default()
        };
        let opened = r.open(r"C:\Program Files\App\a.txt", &conf).unwrap();
        assert!(!opened.existed);
        drop(opened);
        assert!(r.exists(r"C:\Program Files\App\a.txt"));
    }

    #[test]
    fn delete_of_redirected_copy_keeps_package_hidden() {
        let (fs, r) = redirector();
        ops::write(&fs, &format!(r"{MIRROR}\a.txt"), b"pkg").unwrap();
        ops::write(&fs, &format!(r"{REDIRECTED}\a.txt"), b"user").unwrap();

        r.delete_file(r"C:\Program Files\App\a.txt").unwrap();
        assert!(!ops::exists(&fs, &format!(r"{REDIRECTED}\a.txt")));
        assert!(!r.exists(r"C:\Program Files\App\a.txt"));
    }

    #[test]
    fn denied_native_delete_is_hidden() {
        let (fs, r) = redirector();
        ops::write(&fs, r"C:\Program Files\App\locked.txt", b"").unwrap();
        fs.set_readonly(r"C:\Program Files\App\locked.txt", true).unwrap();

        r.delete_file(r"C:\Program Files\App\locked.txt").unwrap();
        assert!(ops::exists(&fs, r"C:\Program Files\App\locked.txt"));
        assert!(!r.exists(r"C:\Program Files\App\locked.txt"));
    }

    #[test]
    fn directories_follow_the_merged_view() {
        let (fs, r) = redirector();
        ops::write(&fs, &format!(r"{MIRROR}\data\x.bin"), b"").unwrap();

        assert_eq!(
            r.create_dir(r"C:\Program Files\App\data"),
            Err(RedirectError::AlreadyExists)
        );
        assert_eq!(
            r.remove_dir(r"C:\Program Files\App\data"),
            Err(RedirectError::DirectoryNotEmpty)
        );

        r.delete_file(r"C:\Program Files\App\data\x.bin").unwrap();
        r.remove_dir(r"C:\Program Files\App\data").unwrap();
        assert!(!r.exists(r"C:\Program Files\App\data"));

        r.create_dir(r"C:\Program Files\App\data").unwrap();
        assert!(ops::is_dir(&fs, &format!(r"{REDIRECTED}\data")));
        assert!(r.exists(r"C:\Program Files\App\data"));
    }

    #[test]
    fn copy_and_rename() {
        let (fs, r) = redirector();
        ops::write(&fs, &format!(r"{MIRROR}\a.txt"), b"pkg").unwrap();

        r.copy_file(r"C:\Program Files\App\a.txt", r"C:\Program Files\App\b.txt", true)
            .unwrap();
        assert_eq!(
            ops::read_to_string(&fs, &format!(r"{REDIRECTED}\b.txt")).unwrap(),
            "pkg"
        );
        assert_eq!(
            r.copy_file(r"C:\Program Files\App\a.txt", r"C:\Program Files\App\b.txt", true),
            Err(RedirectError::AlreadyExists)
        );

        r.rename(r"C:\Program Files\App\a.txt", r"C:\Program Files\App\c.txt", false)
            .unwrap();
        assert!(!r.exists(r"C:\Program Files\App\a.txt"));
        assert_eq!(read(&r, r"C:\Program Files\App\c.txt"), "pkg");
        assert!(ops::exists(&fs, &format!(r"{MIRROR}\a.txt")));
    }

    #[test]
    fn links() {
        let (fs, r) = redirector();
        ops::write(&fs, &format!(r"{MIRROR}\a.txt"), b"pkg").unwrap();
        r.hard_link(r"C:\Program Files\App\link.txt", r"C:\Program Files\App\a.txt")
            .unwrap();
        assert!(ops::is_file(&fs, &format!(r"{REDIRECTED}\link.txt")));

        r.symlink(r"C:\Program Files\App\sym.txt", r"C:\Program Files\App\a.txt", false)
            .unwrap();
        assert_eq!(read(&r, r"C:\Program Files\App\sym.txt"), "pkg");
    }

    #[test]
    fn find_lists_the_merged_directory() {
        let (fs, r) = redirector();
        ops::write(&fs, &format!(r"{MIRROR}\a.txt"), b"").unwrap();
        ops::write(&fs, r"C:\Program Files\App\b.txt", b"").unwrap();
        let names: Vec<_> = r.find_first("*.txt").unwrap().map(|e| e.name).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);

        let single: Vec<_> = r
            .find_first(r"C:\Program Files\App")
            .unwrap()
            .map(|e| e.name)
            .collect();
        assert_eq!(single, vec!["App"]);
    }

    #[test]
    fn device_paths_are_not_handled() {
        let (_fs, r) = redirector();
        assert_eq!(r.metadata(r"\\.\pipe\x"), Err(RedirectError::Unsupported));
        assert!(matches!(r.find_first(r"\\?\C:\*"), Err(RedirectError::Unsupported)));
        assert!(r.is_package_path(r"C:\pkg\app.exe"));
        assert!(!r.is_package_path(r"C:\Program Files\App"));
    }
}
