use std::sync::Arc;

use pretty_assertions::assert_eq;
use redirect_fs::mem_fs::FileSystem as MemFS;
use redirect_fs::path::is_absolute;
use redirect_fs::{
    classify, ops, DeletionMarkers, FileSystem, FixedCurrentDir, KnownFolder, KnownFolders,
    OpKind, PathCategory, PathRole, RedirectError, RedirectionRoots, Redirector, Resolver,
    VfsMappingTable, WhiteoutMarkers,
};

const PKG: &str = r"C:\Program Files\WindowsApps\Contoso_1.0_x64__abc";
const WRITABLE: &str = r"C:\Users\u\AppData\Local\Packages\Contoso_abc\LocalCache\Local\WritablePackageRoot";

fn folders() -> KnownFolders {
    KnownFolders::new()
        .with(KnownFolder::ProgramFilesX64, r"C:\Program Files")
        .with(KnownFolder::ProgramFilesCommonX64, r"C:\Program Files\Common Files")
        .with(KnownFolder::Windows, r"C:\Windows")
        .with(KnownFolder::SystemX64, r"C:\Windows\System32")
        .with(KnownFolder::RoamingAppData, r"C:\Users\u\AppData\Roaming")
}

fn setup() -> (MemFS, Redirector) {
    let fs = MemFS::default();
    ops::create_dir_all(&fs, r"C:\Program Files").unwrap();
    ops::create_dir_all(&fs, PKG).unwrap();
    ops::create_dir_all(&fs, WRITABLE).unwrap();

    let resolver = Resolver::new(
        Arc::new(VfsMappingTable::new(&folders())),
        Arc::new(RedirectionRoots::new(PKG, WRITABLE).unwrap()),
    );
    let shared: Arc<dyn FileSystem> = Arc::new(fs.clone());
    let markers = Arc::new(WhiteoutMarkers::new(
        shared.clone(),
        WhiteoutMarkers::default_root(WRITABLE),
    ));
    let redirector = Redirector::new(resolver, shared, markers)
        .with_current_dir(Arc::new(FixedCurrentDir::new(r"C:\work")));
    (fs, redirector)
}

fn no_current_dir() -> Option<String> {
    None
}

#[test]
fn classification_is_total() {
    let inputs = [
        "",
        "a",
        ".",
        "..",
        r"..\..\..\..",
        "C:",
        "C:..",
        r"C:\",
        "C:/x/./y/../z",
        r"\",
        r"\\",
        r"\\server",
        r"\\server\share\..\..",
        r"\\?\",
        r"\??\C:\x",
        r"\\.\COM1",
        "//?/c:/x",
        "NUL",
        "com9:anything",
        "shell:::{}",
        "::{20D04FE0}",
        "http://example.com",
        "file.txt. . .",
        "dir\\",
        "ünïcödé\\パス",
        ":",
        "1:",
    ];

    for input in inputs {
        for cwd in [
            &FixedCurrentDir::new(r"D:\cwd") as &dyn redirect_fs::CurrentDirectory,
            &no_current_dir,
        ] {
            let classified = classify(input, cwd);
            assert_eq!(classified.original, input);
            if classified.is_redirectable() {
                assert!(
                    is_absolute(&classified.normalized),
                    "{input:?} normalized to {:?}",
                    classified.normalized
                );
                assert!(!classified.normalized.contains('/'));
            } else {
                assert_eq!(classified.normalized, input);
            }
        }
    }

    assert_eq!(classify("", &FixedCurrentDir::new(r"C:\")).category, PathCategory::Unknown);
    assert_eq!(classify("rel", &no_current_dir).category, PathCategory::Unknown);
}

#[test]
fn mapping_is_deterministic_and_prefers_longest_match() {
    let first = VfsMappingTable::new(&folders());
    let second = VfsMappingTable::new(&folders());
    assert_eq!(first, second);

    let common = first
        .find_mapping(r"C:\Program Files\Common Files\Vendor\x.dll")
        .unwrap();
    assert_eq!(common.mapping.folder, KnownFolder::ProgramFilesCommonX64);
    assert_eq!(common.suffix, r"Vendor\x.dll");

    let pf = first.find_mapping(r"c:\program files\app").unwrap();
    assert_eq!(pf.mapping.folder, KnownFolder::ProgramFilesX64);
    assert_eq!(pf.suffix, "app");

    let system = first.find_mapping(r"C:\Windows\System32").unwrap();
    assert_eq!(system.mapping.folder, KnownFolder::SystemX64);
    assert_eq!(system.suffix, "");

    assert!(first.find_mapping(r"C:\Program Files2\x").is_none());

    let duplicated = KnownFolders::new()
        .with(KnownFolder::ProgramFilesX86, r"C:\Program Files")
        .with(KnownFolder::ProgramFilesX64, r"C:\PROGRAM FILES\");
    let table = VfsMappingTable::new(&duplicated);
    assert_eq!(table.len(), 1);
    assert!(table.find_by_folder(KnownFolder::ProgramFilesX86).is_some());
    assert!(table.find_by_folder(KnownFolder::ProgramFilesX64).is_none());
}

#[test]
fn redirected_copy_wins_reads() {
    let (fs, r) = setup();
    let mirror = format!(r"{PKG}\VFS\ProgramFilesX64\App\a.ini");
    let redirected = format!(r"{WRITABLE}\VFS\ProgramFilesX64\App\a.ini");

    ops::write(&fs, &mirror, b"pkg").unwrap();
    ops::write(&fs, r"C:\Program Files\App\a.ini", b"native").unwrap();
    assert_eq!(
        r.select(r"C:\Program Files\App\a.ini", OpKind::MustExistForRead)
            .unwrap()
            .role,
        PathRole::VfsMirror
    );

    ops::write(&fs, &redirected, b"user").unwrap();
    let choice = r
        .select(r"C:\Program Files\App\a.ini", OpKind::MustExistForRead)
        .unwrap();
    assert_eq!(choice.role, PathRole::Redirected);
    assert_eq!(choice.path, redirected);
}

#[test]
fn create_new_stays_inside_the_writable_root() {
    let (fs, r) = setup();
    ops::create_dir_all(&fs, r"C:\Program Files\App").unwrap();
    ops::create_dir_all(&fs, &format!(r"{PKG}\data")).unwrap();

    for path in [
        r"C:\Program Files\App\new.txt",
        r"C:\Program Files\new.txt",
        r"C:\Program Files\WindowsApps\Contoso_1.0_x64__abc\data\new.txt",
    ] {
        let set = r.resolve(path);
        assert!(set.is_virtualized());
        let choice = r.select(path, OpKind::CreateNew).unwrap();
        assert_eq!(choice.role, PathRole::Redirected);
        assert!(
            redirect_fs::path::strip_prefix_ci(&choice.path, WRITABLE).is_some(),
            "{path} created at {}",
            choice.path
        );
    }
}

#[test]
fn enumeration_deduplicates_with_redirected_attributes() {
    let (fs, r) = setup();
    ops::write(&fs, &format!(r"{WRITABLE}\VFS\ProgramFilesX64\App\shared.txt"), b"longer user copy").unwrap();
    ops::write(&fs, &format!(r"{PKG}\VFS\ProgramFilesX64\App\shared.txt"), b"pkg").unwrap();
    ops::write(&fs, r"C:\Program Files\App\SHARED.TXT", b"n").unwrap();
    ops::write(&fs, r"C:\Program Files\App\native.txt", b"n").unwrap();

    let entries: Vec<_> = r.find_first(r"C:\Program Files\App\*").unwrap().collect();
    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["shared.txt", "native.txt"]);

    let shared = &entries[0];
    assert_eq!(shared.source_role, PathRole::Redirected);
    assert_eq!(shared.metadata.len(), "longer user copy".len() as u64);
}

#[test]
fn deletion_markers_hide_and_unmarking_restores() {
    let (fs, r) = setup();
    ops::write(&fs, &format!(r"{PKG}\VFS\ProgramFilesX64\App\a.txt"), b"pkg").unwrap();
    ops::write(&fs, &format!(r"{PKG}\VFS\ProgramFilesX64\App\b.txt"), b"pkg").unwrap();

    r.markers().mark_deleted(r"C:\Program Files\App\a.txt").unwrap();

    assert_eq!(
        r.metadata(r"C:\Program Files\App\a.txt"),
        Err(RedirectError::FileNotFound)
    );
    let names: Vec<_> = r
        .find_first(r"C:\Program Files\App\*")
        .unwrap()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["b.txt"]);

    r.markers().unmark_deleted(r"C:\Program Files\App\a.txt").unwrap();
    assert!(r.exists(r"C:\Program Files\App\a.txt"));
    let names: Vec<_> = r
        .find_first(r"C:\Program Files\App\*")
        .unwrap()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
}
