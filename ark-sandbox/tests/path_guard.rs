use std::fs;
use std::path::Path;

use ark_sandbox::{Capability, CapabilitySet, Sandbox, SandboxViolation};

fn sandbox_in(dir: &Path, caps: CapabilitySet) -> Sandbox {
    Sandbox::with_root(caps, dir).unwrap()
}

#[test]
fn parent_traversal_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let sb = sandbox_in(dir.path(), CapabilitySet::grant_all());

    let err = sb
        .validate_path(Path::new("../secret.ark"), false)
        .unwrap_err();
    assert!(matches!(err, SandboxViolation::ParentTraversal { .. }));
}

#[test]
fn relative_read_under_root_allowed() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ok.ark"), "x = 1").unwrap();
    let sb = sandbox_in(dir.path(), CapabilitySet::empty());

    let real = sb.validate_path(Path::new("./ok.ark"), false).unwrap();
    assert!(real.ends_with("ok.ark"));
}

#[test]
fn inner_dotdot_that_stays_inside_allowed() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("ok.ark"), "x = 1").unwrap();
    let sb = sandbox_in(dir.path(), CapabilitySet::empty());

    assert!(sb.validate_path(Path::new("sub/../ok.ark"), false).is_ok());
}

#[cfg(unix)]
#[test]
fn symlink_escape_rejected_without_literal_dotdot() {
    let outside = tempfile::tempdir().unwrap();
    fs::write(outside.path().join("secret.txt"), "hidden").unwrap();

    let dir = tempfile::tempdir().unwrap();
    std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

    let sb = sandbox_in(dir.path(), CapabilitySet::grant_all());
    let err = sb
        .validate_path(Path::new("link/secret.txt"), false)
        .unwrap_err();
    assert!(matches!(err, SandboxViolation::OutsideWorkspace { .. }));
}

#[test]
fn write_requires_fs_write_token() {
    let dir = tempfile::tempdir().unwrap();
    let sb = sandbox_in(dir.path(), CapabilitySet::from_tokens([Capability::FsRead]));

    let err = sb.validate_path(Path::new("out.txt"), true).unwrap_err();
    assert_eq!(
        err,
        SandboxViolation::MissingCapability(Capability::FsWrite)
    );
}

#[test]
fn write_to_new_file_allowed_with_token() {
    let dir = tempfile::tempdir().unwrap();
    let sb = sandbox_in(dir.path(), CapabilitySet::from_tokens([Capability::FsWrite]));

    // The target does not exist yet; the guard vets where it would land.
    assert!(sb.validate_path(Path::new("out/report.txt"), true).is_ok());
}

#[test]
fn protected_files_refused_even_with_full_grants() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
    fs::create_dir(dir.path().join("src")).unwrap();
    let sb = sandbox_in(dir.path(), CapabilitySet::grant_all());

    for target in ["Cargo.toml", "ark.toml", "src/main.rs", ".env"] {
        let err = sb.validate_path(Path::new(target), true).unwrap_err();
        assert!(
            matches!(err, SandboxViolation::ProtectedPath { .. }),
            "expected {target} to be protected, got {err:?}"
        );
    }

    // Reading the same files is fine.
    assert!(sb.validate_path(Path::new("Cargo.toml"), false).is_ok());
}
