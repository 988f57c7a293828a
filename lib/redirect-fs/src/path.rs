//! Classification and lexical normalization of Windows-style path strings.
//!
//! Nothing in here touches the filesystem. The only external input is the
//! current directory, which is injected through [`CurrentDirectory`].

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// Structural category of a path string, determined purely from its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum PathCategory {
    /// `\\server\share\...`
    UncAbsolute,
    /// `C:\...`
    DriveAbsolute,
    /// `C:foo`
    DriveRelative,
    /// `\foo`
    Rooted,
    /// `foo\bar`
    Relative,
    /// `\\.\...`
    LocalDevice,
    /// `\\?\...` or `\??\...`
    RootLocalDevice,
    /// `CON`, `NUL`, `COM1`, ...
    ReservedDeviceName,
    /// `shell:...` or `::{GUID}`
    ShellNamespace,
    /// `http://...` and anything else with a colon
    ProtocolLike,
    Unknown,
}

impl PathCategory {
    /// Only these categories are ever considered for redirection.
    pub fn is_redirectable(&self) -> bool {
        matches!(
            self,
            PathCategory::DriveAbsolute
                | PathCategory::DriveRelative
                | PathCategory::Rooted
                | PathCategory::Relative
                | PathCategory::UncAbsolute
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PathCategory::UncAbsolute => "unc-absolute",
            PathCategory::DriveAbsolute => "drive-absolute",
            PathCategory::DriveRelative => "drive-relative",
            PathCategory::Rooted => "rooted",
            PathCategory::Relative => "relative",
            PathCategory::LocalDevice => "local-device",
            PathCategory::RootLocalDevice => "root-local-device",
            PathCategory::ReservedDeviceName => "reserved-device-name",
            PathCategory::ShellNamespace => "shell-namespace",
            PathCategory::ProtocolLike => "protocol-like",
            PathCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PathCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct ClassifiedPath {
    pub category: PathCategory,
    pub original: String,
    /// Absolute canonical form for redirectable categories, `original`
    /// otherwise.
    pub normalized: String,
}

impl ClassifiedPath {
    fn passthrough(category: PathCategory, original: &str) -> Self {
        ClassifiedPath {
            category,
            original: original.to_string(),
            normalized: original.to_string(),
        }
    }

    pub fn is_redirectable(&self) -> bool {
        self.category.is_redirectable()
    }
}

/// Source of the process current directory used to absolutize relative input.
pub trait CurrentDirectory: Send + Sync {
    fn current_dir(&self) -> Option<String>;
}

impl<F> CurrentDirectory for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn current_dir(&self) -> Option<String> {
        self()
    }
}

/// A current directory that never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedCurrentDir(pub String);

impl FixedCurrentDir {
    pub fn new(dir: impl Into<String>) -> Self {
        FixedCurrentDir(dir.into())
    }
}

impl CurrentDirectory for FixedCurrentDir {
    fn current_dir(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// The real current directory of this process.
///
/// On hosts whose working directory is not a Windows path this yields a
/// value that is not absolute, so relative input classifies as unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCurrentDir;

impl CurrentDirectory for HostCurrentDir {
    fn current_dir(&self) -> Option<String> {
        let dir = std::env::current_dir().ok()?;
        let dir = dunce::simplified(&dir);
        dir.to_str().map(str::to_string)
    }
}

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9", "CONIN$",
    "CONOUT$",
];

pub fn is_separator(c: char) -> bool {
    c == '\\' || c == '/'
}

pub(crate) fn fold_char(c: char) -> char {
    if c == '/' {
        return '\\';
    }
    if c.is_ascii() {
        return c.to_ascii_lowercase();
    }
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

fn chars_eq(a: char, b: char) -> bool {
    fold_char(a) == fold_char(b)
}

/// Case and separator folding key, for comparisons and map keys.
pub fn fold(path: &str) -> String {
    path.chars().map(fold_char).collect()
}

/// Case-insensitive, separator-insensitive equality.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars().count() == b.chars().count() && a.chars().zip(b.chars()).all(|(a, b)| chars_eq(a, b))
}

/// Strips `prefix` from `path` if it matches on a segment boundary.
///
/// The returned remainder has no leading separator and is empty when `path`
/// names the prefix itself.
pub fn strip_prefix_ci<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches(is_separator);
    if prefix.is_empty() {
        return None;
    }

    let mut path_chars = path.char_indices();
    for p in prefix.chars() {
        let (_, c) = path_chars.next()?;
        if !chars_eq(c, p) {
            return None;
        }
    }

    match path_chars.next() {
        None => Some(""),
        Some((i, c)) if is_separator(c) => Some(path[i..].trim_start_matches(is_separator)),
        Some(_) => None,
    }
}

/// Joins a relative tail onto `base` using `\`.
pub fn join(base: &str, rel: &str) -> String {
    let rel = rel.trim_start_matches(is_separator);
    if rel.is_empty() {
        return base.to_string();
    }
    let base = base.trim_end_matches(is_separator);
    let mut out = String::with_capacity(base.len() + rel.len() + 1);
    out.push_str(base);
    out.push('\\');
    out.extend(rel.chars().map(|c| if c == '/' { '\\' } else { c }));
    out
}

/// Length in bytes of the root of an absolute path: `C:\` (or `C:`) for
/// drive paths, `\\server\share` for UNC paths, zero otherwise.
pub fn root_len(path: &str) -> usize {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return if bytes.len() >= 3 && is_separator(bytes[2] as char) {
            3
        } else {
            2
        };
    }
    if bytes.len() >= 2 && is_separator(bytes[0] as char) && is_separator(bytes[1] as char) {
        let mut idx = 2;
        for _ in 0..2 {
            match path[idx..].find(is_separator) {
                Some(offset) => idx += offset + 1,
                None => return path.len(),
            }
        }
        return idx - 1;
    }
    0
}

/// Splits a path into its parent directory and final name.
///
/// Returns `None` for roots and single-segment relative names.
pub fn split_parent(path: &str) -> Option<(&str, &str)> {
    let root = root_len(path);
    let trimmed = path.trim_end_matches(is_separator);
    if root > 0 && trimmed.len() <= root {
        return None;
    }
    let idx = trimmed.rfind(is_separator)?;
    let name = &trimmed[idx + 1..];
    if name.is_empty() {
        return None;
    }
    let parent = if idx < root { &path[..root] } else { &trimmed[..idx] };
    Some((parent, name))
}

/// Is this a drive-absolute or UNC path?
pub fn is_absolute(path: &str) -> bool {
    matches!(
        raw_category(path),
        PathCategory::DriveAbsolute | PathCategory::UncAbsolute
    )
}

/// Normalizes an already absolute path, returning `None` for anything else.
pub fn normalize_absolute(path: &str) -> Option<String> {
    let ends_with_separator = path.ends_with(is_separator);
    let (root, segments) = parse_absolute(path)?;
    Some(assemble(root, segments, ends_with_separator))
}

/// Classifies `path` and, for redirectable categories, resolves it into an
/// absolute canonical form.
pub fn classify(path: &str, cwd: &dyn CurrentDirectory) -> ClassifiedPath {
    let category = raw_category(path);
    if !category.is_redirectable() {
        return ClassifiedPath::passthrough(category, path);
    }

    let normalized = match category {
        PathCategory::DriveAbsolute | PathCategory::UncAbsolute => normalize_absolute(path),
        _ => normalize_against_cwd(category, path, cwd),
    };

    match normalized {
        Some(normalized) => ClassifiedPath {
            category,
            original: path.to_string(),
            normalized,
        },
        None => {
            tracing::trace!(path, %category, "Unable to absolutize path");
            ClassifiedPath::passthrough(PathCategory::Unknown, path)
        }
    }
}

fn raw_category(path: &str) -> PathCategory {
    if path.is_empty() {
        return PathCategory::Unknown;
    }
    if is_reserved_name(path) {
        return PathCategory::ReservedDeviceName;
    }
    if path.starts_with(r"\\?\") || path.starts_with(r"\??\") {
        return PathCategory::RootLocalDevice;
    }

    let chars: Vec<char> = path.chars().take(4).collect();
    let sep_at = |i: usize| chars.get(i).copied().is_some_and(is_separator);

    if sep_at(0) && sep_at(1) {
        let device_marker = matches!(chars.get(2), Some('.') | Some('?'));
        if device_marker && (chars.len() == 3 || sep_at(3)) {
            return PathCategory::LocalDevice;
        }
        return PathCategory::UncAbsolute;
    }

    if starts_with_ci(path, "shell:") || path.starts_with("::") {
        return PathCategory::ShellNamespace;
    }

    if chars.len() >= 2 && chars[0].is_ascii_alphabetic() && chars[1] == ':' {
        return if sep_at(2) {
            PathCategory::DriveAbsolute
        } else {
            PathCategory::DriveRelative
        };
    }

    if sep_at(0) {
        return PathCategory::Rooted;
    }
    if path.contains(':') {
        return PathCategory::ProtocolLike;
    }
    PathCategory::Relative
}

fn starts_with_ci(path: &str, prefix: &str) -> bool {
    path.len() >= prefix.len()
        && path.is_char_boundary(prefix.len())
        && path[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn is_reserved_name(path: &str) -> bool {
    let name = match path.find(':') {
        Some(idx) => &path[..idx],
        None => path,
    };
    RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn normalize_against_cwd(
    category: PathCategory,
    path: &str,
    cwd: &dyn CurrentDirectory,
) -> Option<String> {
    let cwd = cwd.current_dir()?;
    let (cwd_root, cwd_segments) = parse_absolute(&cwd)?;
    let ends_with_separator = path.ends_with(is_separator);

    let (root, mut segments, rest) = match category {
        PathCategory::DriveRelative => {
            let drive = &path[..2];
            let rest = &path[2..];
            if eq_ignore_case(drive, &cwd_root) {
                (cwd_root, cwd_segments, rest)
            } else {
                (drive.to_string(), Vec::new(), rest)
            }
        }
        PathCategory::Rooted => (cwd_root, Vec::new(), path),
        _ => (cwd_root, cwd_segments, path),
    };

    push_segments(&mut segments, rest);
    Some(assemble(root, segments, ends_with_separator))
}

/// Splits an absolute path into its root (`C:` or `\\server\share`) and
/// its resolved segments.
fn parse_absolute(path: &str) -> Option<(String, Vec<String>)> {
    match raw_category(path) {
        PathCategory::DriveAbsolute => {
            let mut segments = Vec::new();
            push_segments(&mut segments, &path[2..]);
            Some((path[..2].to_string(), segments))
        }
        PathCategory::UncAbsolute => {
            let body = path.trim_start_matches(is_separator);
            let mut parts = body.splitn(3, is_separator);
            let server = parts.next().unwrap_or_default();
            let share = parts.next().unwrap_or_default();
            let rest = parts.next().unwrap_or_default();
            let mut root = String::from(r"\\");
            root.push_str(server);
            if !share.is_empty() {
                root.push('\\');
                root.push_str(share);
            }
            let mut segments = Vec::new();
            push_segments(&mut segments, rest);
            Some((root, segments))
        }
        _ => None,
    }
}

fn push_segments(segments: &mut Vec<String>, rest: &str) {
    for segment in rest.split(is_separator) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other.to_string()),
        }
    }
}

fn assemble(root: String, mut segments: Vec<String>, ends_with_separator: bool) -> String {
    if !ends_with_separator {
        if let Some(last) = segments.last_mut() {
            let trimmed_len = last.trim_end_matches(['.', ' ']).len();
            last.truncate(trimmed_len);
            if last.is_empty() {
                segments.pop();
            }
        }
    }

    let is_drive = !root.starts_with('\\');
    let mut out = root;
    if segments.is_empty() {
        if is_drive {
            out.push('\\');
        }
        return out;
    }
    for segment in segments {
        out.push('\\');
        out.push_str(&segment);
    }
    out
}
