//! Picking the one location that services a single-target operation.

use crate::error::RedirectError;
use crate::path::{split_parent, PathCategory};
use crate::resolve::{Candidate, PathRole, ResolvedPathSet};
use crate::whiteout::DeletionMarkers;
use crate::{ops, FileSystem, FsError, Metadata};

/// What the caller is about to do with the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    MustExistForRead,
    MustExistForWrite,
    CreateNew,
    CreateOrOpen,
    DeleteExisting,
}

impl OpKind {
    fn creates(&self) -> bool {
        matches!(self, OpKind::CreateNew | OpKind::CreateOrOpen)
    }
}

/// Work that has to happen before the chosen location can be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preparation {
    None,
    /// The parent directory of the target does not exist yet.
    CreateParents,
    /// The target has to be populated from `source` first.
    CopyUp { source: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub path: String,
    pub role: PathRole,
    /// Metadata of what currently backs the choice, `None` when it will be
    /// created.
    pub existing: Option<Metadata>,
    pub preparation: Preparation,
}

impl Choice {
    fn existing(candidate: &Candidate, metadata: Metadata) -> Self {
        Choice {
            path: candidate.path.clone(),
            role: candidate.role,
            existing: Some(metadata),
            preparation: Preparation::None,
        }
    }
}

#[derive(Debug)]
enum Probe {
    Absent,
    Present(Metadata),
    Denied,
}

fn probe(fs: &dyn FileSystem, candidate: &Candidate) -> Probe {
    match fs.metadata(&candidate.path) {
        Ok(meta) => {
            tracing::trace!(path=%candidate.path, role=?candidate.role, "Candidate present");
            Probe::Present(meta)
        }
        Err(FsError::EntryNotFound) => {
            tracing::trace!(path=%candidate.path, role=?candidate.role, "Candidate absent");
            Probe::Absent
        }
        Err(FsError::PermissionDenied) => {
            tracing::trace!(path=%candidate.path, role=?candidate.role, "Candidate denied");
            Probe::Denied
        }
        Err(error) => {
            tracing::debug!(
                path=%candidate.path,
                role=?candidate.role,
                %error,
                "Probe failed, treating the candidate as absent",
            );
            Probe::Absent
        }
    }
}

fn parent_is_dir(fs: &dyn FileSystem, path: &str) -> bool {
    match split_parent(path) {
        Some((parent, _)) => ops::is_dir(fs, parent),
        None => false,
    }
}

/// Picks the candidate that satisfies `op`.
pub fn select(
    set: &ResolvedPathSet,
    op: OpKind,
    fs: &dyn FileSystem,
    markers: &dyn DeletionMarkers,
) -> Result<Choice, RedirectError> {
    let category = set.classified.category;
    if category == PathCategory::Unknown {
        return Err(RedirectError::InvalidPath);
    }
    if !category.is_redirectable() {
        if op.creates() {
            return Err(RedirectError::Unsupported);
        }
        let requested = set.as_requested();
        return Ok(Choice {
            path: requested.path.clone(),
            role: requested.role,
            existing: None,
            preparation: Preparation::None,
        });
    }

    let virtualized = set.is_virtualized();
    let deleted = virtualized && markers.is_marked_deleted(set.logical_path());
    let eligible = |c: &&Candidate| !deleted || set.is_writable_role(c.role);
    let parent_deleted = virtualized
        && split_parent(set.logical_path()).is_some_and(|(p, _)| markers.is_marked_deleted(p));
    let parent_visible = |c: &Candidate| {
        (!parent_deleted || set.is_writable_role(c.role)) && parent_is_dir(fs, &c.path)
    };

    let choice = match op {
        OpKind::MustExistForRead | OpKind::DeleteExisting => {
            match first_present(set, fs, eligible)? {
                Some((c, meta)) => Choice::existing(c, meta),
                None => return Err(not_found(set, parent_visible)),
            }
        }
        OpKind::MustExistForWrite => {
            let (source, meta) =
                first_present(set, fs, eligible)?.ok_or_else(|| not_found(set, parent_visible))?;
            match set.writable() {
                Some(writable) if source.role != writable.role => Choice {
                    path: writable.path.clone(),
                    role: writable.role,
                    existing: Some(meta),
                    preparation: Preparation::CopyUp {
                        source: source.path.clone(),
                    },
                },
                _ => Choice::existing(source, meta),
            }
        }
        OpKind::CreateNew => {
            for candidate in set.iter().filter(eligible) {
                match probe(fs, candidate) {
                    Probe::Absent => {}
                    Probe::Present(_) | Probe::Denied => return Err(RedirectError::AlreadyExists),
                }
            }
            creation_target(set, parent_visible)?
        }
        OpKind::CreateOrOpen => match first_present(set, fs, eligible)? {
            Some((c, meta)) => Choice::existing(c, meta),
            None => creation_target(set, parent_visible)?,
        },
    };

    tracing::debug!(
        path=%choice.path,
        role=?choice.role,
        ?op,
        preparation=?choice.preparation,
        "Selected candidate",
    );
    Ok(choice)
}

/// The first eligible present candidate, in priority order.
fn first_present<'a>(
    set: &'a ResolvedPathSet,
    fs: &dyn FileSystem,
    eligible: impl Fn(&&'a Candidate) -> bool,
) -> Result<Option<(&'a Candidate, Metadata)>, RedirectError> {
    for candidate in set.iter().filter(|c| eligible(c)) {
        match probe(fs, candidate) {
            Probe::Absent => continue,
            Probe::Present(meta) => return Ok(Some((candidate, meta))),
            Probe::Denied => return Err(RedirectError::AccessDenied),
        }
    }
    Ok(None)
}

/// `parent_visible` tells whether a candidate's parent directory exists and is
/// not hidden by a deletion marker.
fn not_found(set: &ResolvedPathSet, parent_visible: impl Fn(&Candidate) -> bool) -> RedirectError {
    if set.iter().any(parent_visible) {
        RedirectError::FileNotFound
    } else {
        RedirectError::PathNotFound
    }
}

/// Where a new entry is created: the writable location, or the literal path
/// when nothing is virtualized.
fn creation_target(
    set: &ResolvedPathSet,
    parent_visible: impl Fn(&Candidate) -> bool,
) -> Result<Choice, RedirectError> {
    let target = set.writable().unwrap_or_else(|| set.as_requested());

    let preparation = if parent_visible(target) {
        Preparation::None
    } else if set.iter().any(parent_visible) {
        Preparation::CreateParents
    } else {
        return Err(RedirectError::PathNotFound);
    };

    Ok(Choice {
        path: target.path.clone(),
        role: target.role,
        existing: None,
        preparation,
    })
}

/// Carries out the [`Preparation`] of a choice.
pub fn prepare(choice: &Choice, fs: &dyn FileSystem) -> Result<(), RedirectError> {
    match &choice.preparation {
        Preparation::None => Ok(()),
        Preparation::CreateParents => {
            if let Some((parent, _)) = split_parent(&choice.path) {
                ops::create_dir_all(fs, parent)?;
                tracing::debug!(parent, "Created redirected parent directories");
            }
            Ok(())
        }
        Preparation::CopyUp { source } => {
            if let Some((parent, _)) = split_parent(&choice.path) {
                ops::create_dir_all(fs, parent)?;
            }
            let is_dir = choice
                .existing
                .as_ref()
                .map_or_else(|| ops::is_dir(fs, source), Metadata::is_dir);
            if is_dir {
                match fs.create_dir(&choice.path) {
                    Ok(()) | Err(FsError::AlreadyExists) => {}
                    Err(e) => return Err(e.into()),
                }
            } else {
                fs.copy_file(source, &choice.path)?;
            }
            tracing::debug!(source=%source, target=%choice.path, "Copied into the redirected location");
            Ok(())
        }
    }
}
