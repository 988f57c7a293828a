use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use redirect_config::RedirectionConfig;
use redirect_fs::{
    EnumerationEntry, FileAttributes, FindHandle, FsError, KnownFolders, OpKind, OpenOptionsConfig,
    OpenedFile, PathRole, RedirectError, Redirector,
};

use crate::error::{set_last_error, Win32Error};
use crate::guard::ReentrancyGuard;
use crate::rewrite::rewrite_command_line;

/// Environment variable naming the configuration file [`global`] loads.
pub const CONFIG_ENV: &str = "MFR_CONFIG";
/// Environment variable naming a host directory that stands in for the
/// drive roots, used where native Windows paths are unavailable.
pub const HOST_ROOT_ENV: &str = "MFR_HOST_ROOT";

/// What the interception layer should do with a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The call was serviced; return this value.
    Handled(T),
    /// The call failed; the thread's last error has been set to this code.
    Failed(Win32Error),
    /// Call the unmodified OS primitive.
    PassThrough,
}

impl<T> Outcome<T> {
    pub fn is_pass_through(&self) -> bool {
        matches!(self, Outcome::PassThrough)
    }

    pub fn handled(self) -> Option<T> {
        match self {
            Outcome::Handled(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Handled(value) => Outcome::Handled(f(value)),
            Outcome::Failed(error) => Outcome::Failed(error),
            Outcome::PassThrough => Outcome::PassThrough,
        }
    }
}

bitflags::bitflags! {
    /// The access rights a file is opened with.
    #[derive(Default)]
    pub struct Access: u32 {
        const APPEND = 0x0000_0004;
        const DELETE = 0x0001_0000;
        const GENERIC_WRITE = 0x4000_0000;
        const GENERIC_READ = 0x8000_0000;
    }
}

/// `dwCreationDisposition` of `CreateFile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CreationDisposition {
    CreateNew = 1,
    CreateAlways = 2,
    OpenExisting = 3,
    OpenAlways = 4,
    TruncateExisting = 5,
}

impl CreationDisposition {
    fn options(self, access: Access) -> OpenOptionsConfig {
        let mut conf = OpenOptionsConfig {
            read: access.contains(Access::GENERIC_READ),
            write: access.contains(Access::GENERIC_WRITE),
            append: access.contains(Access::APPEND),
            ..Default::default()
        };
        match self {
            CreationDisposition::CreateNew => conf.create_new = true,
            CreationDisposition::CreateAlways => {
                conf.create = true;
                conf.truncate = true;
            }
            CreationDisposition::OpenExisting => {}
            CreationDisposition::OpenAlways => conf.create = true,
            CreationDisposition::TruncateExisting => conf.truncate = true,
        }
        conf
    }
}

/// Identifies an enumeration started by [`Shim::find_first_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FindId(pub u64);

/// The rewritten arguments of a process launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessLaunch {
    pub application_name: Option<String>,
    pub command_line: Option<String>,
}

/// Win32-shaped entry points the interception layer forwards calls to.
///
/// Every entry point runs behind a [`ReentrancyGuard`] and contains panics;
/// either condition turns into [`Outcome::PassThrough`].
pub struct Shim {
    redirector: Redirector,
    enabled: bool,
    finds: Mutex<HashMap<FindId, Arc<Mutex<FindHandle>>>>,
    next_find: AtomicU64,
}

impl std::fmt::Debug for Shim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shim")
            .field("redirector", &self.redirector)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl Shim {
    pub fn new(redirector: Redirector) -> Self {
        Shim {
            redirector,
            enabled: true,
            finds: Mutex::new(HashMap::new()),
            next_find: AtomicU64::new(1),
        }
    }

    /// Builds a shim for the process running `executable`. Redirection is
    /// switched off when the configuration does not select that process.
    pub fn from_config(
        config: &RedirectionConfig,
        fs: Arc<dyn redirect_fs::FileSystem>,
        folders: KnownFolders,
        executable: &str,
    ) -> Result<Self, redirect_config::ConfigError> {
        let enabled = config.redirection_enabled(executable)?;
        let mut shim = Shim::new(config.redirector(fs, folders)?);
        shim.enabled = enabled;
        if !enabled {
            tracing::debug!(executable, "File redirection is not enabled for this process");
        }
        Ok(shim)
    }

    pub fn redirector(&self) -> &Redirector {
        &self.redirector
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Runs `op` at the boundary: reentrancy, panics and error codes.
    fn run<T>(
        &self,
        api: &'static str,
        already_exists: Win32Error,
        op: impl FnOnce(&Redirector) -> Result<T, RedirectError>,
    ) -> Outcome<T> {
        if !self.enabled {
            return Outcome::PassThrough;
        }
        let Some(_guard) = ReentrancyGuard::try_enter() else {
            tracing::trace!(api, "Nested call, passing through");
            return Outcome::PassThrough;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| op(&self.redirector))) {
            Ok(Ok(value)) => Outcome::Handled(value),
            Ok(Err(RedirectError::Unsupported)) | Ok(Err(RedirectError::Fs(FsError::Unsupported))) => {
                Outcome::PassThrough
            }
            Ok(Err(error)) => {
                let code = Win32Error::from_redirect(error, already_exists);
                tracing::debug!(api, %error, code = code.code(), "Call failed");
                set_last_error(code);
                Outcome::Failed(code)
            }
            Err(payload) => {
                tracing::error!(api, panic = %panic_message(&*payload), "Panic while redirecting, passing the call through");
                Outcome::PassThrough
            }
        }
    }

    pub fn create_file(
        &self,
        path: &str,
        access: Access,
        disposition: CreationDisposition,
    ) -> Outcome<OpenedFile> {
        let outcome = self.run("CreateFile", Win32Error::FILE_EXISTS, |r| {
            r.open(path, &disposition.options(access))
        });
        if let Outcome::Handled(opened) = &outcome {
            let reopened = opened.existed
                && matches!(
                    disposition,
                    CreationDisposition::CreateAlways | CreationDisposition::OpenAlways
                );
            set_last_error(if reopened {
                Win32Error::ALREADY_EXISTS
            } else {
                Win32Error::SUCCESS
            });
        }
        outcome
    }

    pub fn get_file_attributes(&self, path: &str) -> Outcome<FileAttributes> {
        self.run("GetFileAttributes", Win32Error::ALREADY_EXISTS, |r| {
            r.metadata(path).map(|m| m.attributes())
        })
    }

    pub fn delete_file(&self, path: &str) -> Outcome<()> {
        self.run("DeleteFile", Win32Error::ALREADY_EXISTS, |r| r.delete_file(path))
    }

    pub fn create_directory(&self, path: &str) -> Outcome<()> {
        self.run("CreateDirectory", Win32Error::ALREADY_EXISTS, |r| {
            r.create_dir(path)
        })
    }

    pub fn remove_directory(&self, path: &str) -> Outcome<()> {
        self.run("RemoveDirectory", Win32Error::ALREADY_EXISTS, |r| {
            r.remove_dir(path)
        })
    }

    pub fn find_first_file(&self, pattern: &str) -> Outcome<(FindId, EnumerationEntry)> {
        self.run("FindFirstFile", Win32Error::ALREADY_EXISTS, |r| {
            let mut handle = r.find_first(pattern)?;
            let first = handle.next().ok_or(RedirectError::FileNotFound)?;
            let id = FindId(self.next_find.fetch_add(1, Ordering::Relaxed));
            self.finds
                .lock()
                .map_err(|_| RedirectError::Fs(FsError::Lock))?
                .insert(id, Arc::new(Mutex::new(handle)));
            Ok((id, first))
        })
    }

    pub fn find_next_file(&self, id: FindId) -> Outcome<EnumerationEntry> {
        let outcome = self.run("FindNextFile", Win32Error::ALREADY_EXISTS, |_| {
            let handle = self
                .finds
                .lock()
                .map_err(|_| RedirectError::Fs(FsError::Lock))?
                .get(&id)
                .cloned();
            let Some(handle) = handle else {
                return Ok(Err(Win32Error::INVALID_HANDLE));
            };
            // A handle whose previous step panicked is left poisoned.
            let Ok(mut handle) = handle.lock() else {
                return Ok(Err(Win32Error::GEN_FAILURE));
            };
            Ok(handle.next().ok_or(Win32Error::NO_MORE_FILES))
        });
        match outcome {
            Outcome::Handled(Ok(entry)) => Outcome::Handled(entry),
            Outcome::Handled(Err(code)) => {
                set_last_error(code);
                Outcome::Failed(code)
            }
            Outcome::Failed(code) => Outcome::Failed(code),
            Outcome::PassThrough => Outcome::PassThrough,
        }
    }

    /// Releases an enumeration. Returns `false` for an unknown id.
    pub fn find_close(&self, id: FindId) -> bool {
        match self.finds.lock() {
            Ok(mut finds) => finds.remove(&id).is_some(),
            Err(_) => false,
        }
    }

    pub fn copy_file(&self, from: &str, to: &str, fail_if_exists: bool) -> Outcome<()> {
        self.run("CopyFile", Win32Error::FILE_EXISTS, |r| {
            r.copy_file(from, to, fail_if_exists)
        })
    }

    pub fn move_file(&self, from: &str, to: &str, replace_existing: bool) -> Outcome<()> {
        self.run("MoveFile", Win32Error::ALREADY_EXISTS, |r| {
            r.rename(from, to, replace_existing)
        })
    }

    pub fn create_hard_link(&self, link: &str, existing: &str) -> Outcome<()> {
        self.run("CreateHardLink", Win32Error::ALREADY_EXISTS, |r| {
            r.hard_link(link, existing)
        })
    }

    pub fn create_symbolic_link(&self, link: &str, target: &str, is_dir: bool) -> Outcome<()> {
        self.run("CreateSymbolicLink", Win32Error::ALREADY_EXISTS, |r| {
            r.symlink(link, target, is_dir)
        })
    }

    /// Substitutes the path of a module about to be loaded when a copy other
    /// than the literal path would be read.
    pub fn load_library(&self, name: &str) -> Outcome<String> {
        if !name.contains(['\\', '/']) {
            return Outcome::PassThrough;
        }
        match self.run("LoadLibrary", Win32Error::ALREADY_EXISTS, |r| {
            Ok(substitute(r, name))
        }) {
            Outcome::Handled(Some(path)) => Outcome::Handled(path),
            _ => Outcome::PassThrough,
        }
    }

    /// Rewrites the application name and command line of a process launch.
    pub fn create_process(
        &self,
        application_name: Option<&str>,
        command_line: Option<&str>,
    ) -> Outcome<ProcessLaunch> {
        let outcome = self.run("CreateProcess", Win32Error::ALREADY_EXISTS, |r| {
            let application = application_name.map(|name| substitute(r, name));
            let command = command_line.map(|cmd| rewrite_command_line(cmd, |p| substitute(r, p)));
            Ok((application, command))
        });

        match outcome {
            Outcome::Handled((application, command)) => {
                let application_changed = matches!(application, Some(Some(_)));
                let command_changed = command.as_deref() != command_line;
                if !application_changed && !command_changed {
                    return Outcome::PassThrough;
                }
                Outcome::Handled(ProcessLaunch {
                    application_name: match application {
                        Some(Some(path)) => Some(path),
                        _ => application_name.map(str::to_string),
                    },
                    command_line: command,
                })
            }
            Outcome::Failed(code) => Outcome::Failed(code),
            Outcome::PassThrough => Outcome::PassThrough,
        }
    }
}

/// The location a read of `path` would use, when that is not the path itself.
fn substitute(r: &Redirector, path: &str) -> Option<String> {
    let choice = r.select(path, OpKind::MustExistForRead).ok()?;
    (choice.role != PathRole::AsRequested).then_some(choice.path)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

static GLOBAL: OnceCell<Shim> = OnceCell::new();

/// Installs the process-wide shim. Fails, handing `shim` back, when one is
/// already installed.
pub fn install(shim: Shim) -> Result<(), Shim> {
    GLOBAL.set(shim)
}

/// The process-wide shim.
///
/// When nothing has been installed, the first call loads the configuration
/// named by [`CONFIG_ENV`].
pub fn global() -> Option<&'static Shim> {
    GLOBAL
        .get_or_try_init(|| {
            load_from_env().map_err(|error| {
                tracing::warn!(%error, "Unable to load the redirection shim");
            })
        })
        .ok()
}

fn load_from_env() -> Result<Shim, String> {
    let config_path = std::env::var_os(CONFIG_ENV).ok_or_else(|| format!("{CONFIG_ENV} is not set"))?;
    let config = RedirectionConfig::from_path(&config_path).map_err(|e| e.to_string())?;

    let fs: Arc<dyn redirect_fs::FileSystem> = match std::env::var_os(HOST_ROOT_ENV) {
        Some(root) => Arc::new(redirect_fs::host_fs::FileSystem::with_root(root).map_err(|e| e.to_string())?),
        None => Arc::new(redirect_fs::host_fs::FileSystem::native()),
    };
    let executable = std::env::current_exe()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    Shim::from_config(&config, fs, KnownFolders::from_env(), &executable).map_err(|e| e.to_string())
}
