//! Helper-script bodies copied into every task image, as named in the
//! external-interfaces contract: `check_git_changes.sh`, `prepare.sh`,
//! `run.sh`, `test-run.sh`, `fix-run.sh`. Bodies are generated per-recipe
//! (repo path, base commit, build+test command all vary), mirroring the
//! f-string-templated scripts each `original_source` per-repository module
//! bakes into its own `files()`.

/// `check_git_changes.sh`: 0 iff inside a git worktree with a clean status,
/// nonzero with a diagnostic line otherwise. Ported bit-exact from
/// `original_source/multi_swe_bench/harness/repos/golang/etcd_io/etcd.py`.
pub const CHECK_GIT_CHANGES: &str = r#"#!/bin/bash
set -e

if ! git rev-parse --is-inside-work-tree > /dev/null 2>&1; then
  echo "check_git_changes: Not inside a git repository"
  exit 1
fi

if [[ -n $(git status --porcelain) ]]; then
  echo "check_git_changes: Uncommitted changes"
  exit 1
fi

echo "check_git_changes: No uncommitted changes"
exit 0
"#;

/// `prepare.sh`: `cd /home/<repo>; git reset --hard; check_git_changes; git
/// checkout <base_sha>; check_git_changes;` per spec §6, calling the helper
/// twice (once to confirm the starting tree is clean, once to confirm the
/// checkout landed clean).
pub fn prepare(repo: &str, base_commit: &str) -> String {
    format!(
        "#!/bin/bash\nset -e\n\n\
         cd /home/{repo}\n\
         git reset --hard\n\
         bash /home/check_git_changes.sh\n\
         git checkout {base_commit}\n\
         bash /home/check_git_changes.sh\n"
    )
}

/// `run.sh`: build + test of the unpatched base.
pub fn run(repo: &str, build_test_cmd: &str) -> String {
    format!("#!/bin/bash\nset -e\n\ncd /home/{repo}\n{build_test_cmd}\n")
}

/// `test-run.sh`: apply `test.patch` (`--whitespace=nowarn` for C, per
/// `valkey.py`), then build + test.
pub fn test_run(repo: &str, build_test_cmd: &str, whitespace_nowarn: bool) -> String {
    let apply_flags = if whitespace_nowarn { " --whitespace=nowarn" } else { "" };
    format!(
        "#!/bin/bash\nset -e\n\n\
         cd /home/{repo}\n\
         git apply{apply_flags} /home/test.patch\n\
         {build_test_cmd}\n"
    )
}

/// `fix-run.sh`: apply both `test.patch` and `fix.patch`, then build + test.
pub fn fix_run(repo: &str, build_test_cmd: &str, whitespace_nowarn: bool) -> String {
    let apply_flags = if whitespace_nowarn { " --whitespace=nowarn" } else { "" };
    format!(
        "#!/bin/bash\nset -e\n\n\
         cd /home/{repo}\n\
         git apply{apply_flags} /home/test.patch /home/fix.patch\n\
         {build_test_cmd}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_git_changes_is_shebanged() {
        assert!(CHECK_GIT_CHANGES.starts_with("#!/bin/bash"));
        assert!(CHECK_GIT_CHANGES.contains("--is-inside-work-tree"));
    }

    #[test]
    fn prepare_resets_checks_twice_then_checks_out() {
        let script = prepare("etcd", "deadbeef");
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("cd /home/etcd"));
        assert!(script.contains("git reset --hard"));
        assert_eq!(script.matches("check_git_changes.sh").count(), 2);
        assert!(script.contains("git checkout deadbeef"));
        let reset_idx = script.find("git reset --hard").unwrap();
        let checkout_idx = script.find("git checkout deadbeef").unwrap();
        assert!(reset_idx < checkout_idx);
    }

    #[test]
    fn run_builds_and_tests_without_applying_any_patch() {
        let script = run("etcd", "go test -v -count=1 ./...");
        assert!(!script.contains("git apply"));
        assert!(script.contains("cd /home/etcd"));
        assert!(script.contains("go test -v -count=1 ./..."));
    }

    #[test]
    fn test_run_applies_only_test_patch() {
        let script = test_run("etcd", "go test -v -count=1 ./...", false);
        assert!(script.contains("git apply /home/test.patch"));
        assert!(!script.contains("fix.patch"));
    }

    #[test]
    fn test_run_uses_whitespace_nowarn_for_c() {
        let script = test_run("valkey", "make test", true);
        assert!(script.contains("git apply --whitespace=nowarn /home/test.patch"));
    }

    #[test]
    fn fix_run_applies_both_patches_in_order() {
        let script = fix_run("etcd", "go test -v -count=1 ./...", false);
        assert!(script.contains("git apply /home/test.patch /home/fix.patch"));
    }
}
