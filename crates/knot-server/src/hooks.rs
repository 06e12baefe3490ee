//! Hook installation bootstrap, run once at startup.
//!
//! Walks `<scan_root>/<did>/<repo>` for bare repositories and makes sure
//! each one has a `hooks/post-receive` dispatcher plus a
//! `hooks/post-receive.d/40-notify.sh` delegate hook. Existing
//! installations using the `post-recieve` (sic) spelling are recognised on
//! read but always rewritten to the correct spelling.

use std::path::Path;

use tracing::{info, warn};

const DISPATCHER: &str = r#"#!/bin/sh
# Runs every executable hook under post-receive.d, in declared order,
# feeding each the same post-receive stdin and stopping at the first
# non-zero exit.
set -e
input="$(cat)"
dir="$(CDPATH= cd -- "$(dirname -- "$0")" && pwd)/post-receive.d"
[ -d "$dir" ] || exit 0
for hook in "$dir"/*; do
  [ -e "$hook" ] || continue
  [ -x "$hook" ] || continue
  printf '%s' "$input" | "$hook" || exit $?
done
"#;

fn notify_script(hook_binary: &str, internal_api: &str) -> String {
    format!(
        "#!/bin/sh\n\
         # Forwards post-receive stdin to the knot's internal HTTP port.\n\
         exec {hook_binary} --internal-api '{internal_api}' --git-dir \"${{GIT_DIR:-$(pwd)}}\"\n"
    )
}

/// Installs (or repairs) the post-receive hook pair for every bare repo
/// found under `scan_root`. `hook_binary` is the path the notify script
/// should exec -- typically the `knot-hook` binary installed alongside
/// this server.
pub fn install_all(scan_root: &Path, hook_binary: &str, internal_api: &str) -> std::io::Result<()> {
    for did_entry in read_dir_entries(scan_root)? {
        if !did_entry.file_type()?.is_dir() {
            continue;
        }
        let did_dir = did_entry.path();
        let Some(did_name) = did_dir.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if !did_name.starts_with("did:") {
            continue;
        }
        for repo_entry in read_dir_entries(&did_dir)? {
            if !repo_entry.file_type()?.is_dir() {
                continue;
            }
            let repo_path = repo_entry.path();
            if !repo_path.join("HEAD").is_file() {
                continue;
            }
            if let Err(e) = install_one(&repo_path, hook_binary, internal_api) {
                warn!(repo = %repo_path.display(), error = %e, "failed to install post-receive hook");
            }
        }
    }
    Ok(())
}

fn install_one(repo_path: &Path, hook_binary: &str, internal_api: &str) -> std::io::Result<()> {
    let hooks_dir = repo_path.join("hooks");
    let d_dir = hooks_dir.join("post-receive.d");
    std::fs::create_dir_all(&d_dir)?;

    let misspelled = hooks_dir.join("post-recieve");
    if misspelled.is_file() {
        std::fs::remove_file(&misspelled)?;
    }

    write_executable(&hooks_dir.join("post-receive"), DISPATCHER)?;
    write_executable(&d_dir.join("40-notify.sh"), &notify_script(hook_binary, internal_api))?;

    info!(repo = %repo_path.display(), "post-receive hook installed");
    Ok(())
}

#[cfg(unix)]
fn write_executable(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, contents)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn write_executable(path: &Path, contents: &str) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

fn read_dir_entries(dir: &Path) -> std::io::Result<Vec<std::fs::DirEntry>> {
    std::fs::read_dir(dir)?.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn make_bare_repo(scan_root: &Path, did: &str, name: &str) -> PathBuf {
        let repo = scan_root.join(did).join(name);
        std::fs::create_dir_all(&repo).unwrap();
        std::fs::write(repo.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        repo
    }

    #[test]
    fn installs_dispatcher_and_notify_hook_for_each_bare_repo() {
        let tmp = TempDir::new().unwrap();
        let repo = make_bare_repo(tmp.path(), "did:plc:abc", "proj");

        install_all(tmp.path(), "/usr/local/bin/knot-hook", "http://127.0.0.1:5444").unwrap();

        assert!(repo.join("hooks/post-receive").is_file());
        assert!(repo.join("hooks/post-receive.d/40-notify.sh").is_file());
    }

    #[test]
    fn a_misspelled_legacy_hook_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let repo = make_bare_repo(tmp.path(), "did:plc:abc", "proj");
        std::fs::create_dir_all(repo.join("hooks")).unwrap();
        std::fs::write(repo.join("hooks/post-recieve"), "#!/bin/sh\nexit 0\n").unwrap();

        install_all(tmp.path(), "/usr/local/bin/knot-hook", "http://127.0.0.1:5444").unwrap();

        assert!(!repo.join("hooks/post-recieve").is_file());
        assert!(repo.join("hooks/post-receive").is_file());
    }

    #[test]
    fn non_repo_directories_are_skipped() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("did:plc:abc/not-a-repo")).unwrap();

        install_all(tmp.path(), "/usr/local/bin/knot-hook", "http://127.0.0.1:5444").unwrap();

        assert!(!tmp.path().join("did:plc:abc/not-a-repo/hooks").exists());
    }
}
