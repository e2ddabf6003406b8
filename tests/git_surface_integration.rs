//! Integration tests for the Git surface against real repositories.
//!
//! Everything runs offline: the "remote" is a local bare repository and
//! clones go through filesystem paths.

use std::path::{Path, PathBuf};
use std::process::Command;

use tokio_util::sync::CancellationToken;

use cascade::exec::{GitError, GitSurface, SystemGitRunner};

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git spawns");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn git_stdout(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git spawns");
    assert!(output.status.success(), "git {:?} failed", args);
    String::from_utf8_lossy(&output.stdout).trim_end().to_string()
}

/// A local bare "remote" seeded with one commit on main.
struct RemoteFixture {
    _tmp: tempfile::TempDir,
    origin: PathBuf,
    workspace: PathBuf,
}

impl RemoteFixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir(&src).unwrap();

        git(&src, &["init", "-b", "main"]);
        git(&src, &["config", "user.email", "dev@example.com"]);
        git(&src, &["config", "user.name", "Dev"]);
        std::fs::write(src.join("README.md"), "hello\n").unwrap();
        git(&src, &["add", "."]);
        git(&src, &["commit", "-m", "initial"]);

        let origin = tmp.path().join("origin.git");
        git(
            tmp.path(),
            &[
                "clone",
                "--bare",
                src.to_str().unwrap(),
                origin.to_str().unwrap(),
            ],
        );

        let workspace = tmp.path().join("workspace");
        Self {
            _tmp: tmp,
            origin,
            workspace,
        }
    }

    fn origin_id(&self) -> String {
        self.origin.to_str().unwrap().to_string()
    }
}

fn surface() -> GitSurface<SystemGitRunner> {
    GitSurface::new(SystemGitRunner::new())
}

#[tokio::test]
async fn clone_worktree_commit_push_round_trip() {
    let fixture = RemoteFixture::new();
    let cancel = CancellationToken::new();
    let git_surface = surface();

    let repo_path = git_surface
        .ensure_clone(&cancel, &fixture.origin_id(), &fixture.workspace)
        .await
        .unwrap();
    assert!(repo_path.join(".git").exists());
    git(&repo_path, &["config", "user.email", "bot@example.com"]);
    git(&repo_path, &["config", "user.name", "Cascade"]);

    let branch = "cascade-update-lib-v2-0-0";
    let worktree = git_surface
        .ensure_worktree(&cancel, &repo_path, branch, None)
        .await
        .unwrap();
    assert_eq!(
        worktree,
        repo_path.join(".worktrees").join(branch),
        "worktrees live under the clone"
    );
    assert_eq!(
        git_stdout(&worktree, &["rev-parse", "--abbrev-ref", "HEAD"]),
        branch
    );

    std::fs::write(worktree.join("go.mod"), "module example.com/svc\n").unwrap();
    let hash = git_surface
        .commit(&cancel, &worktree, "chore: bump lib")
        .await
        .unwrap();
    assert_eq!(hash.len(), 40, "commit returns a full hash, trimmed");

    git_surface.push(&cancel, &worktree, branch).await.unwrap();
    let pushed = git_stdout(
        &fixture.origin,
        &["rev-parse", &format!("refs/heads/{}", branch)],
    );
    assert_eq!(pushed, hash);
}

#[tokio::test]
async fn ensure_clone_is_idempotent() {
    let fixture = RemoteFixture::new();
    let cancel = CancellationToken::new();
    let git_surface = surface();

    let first = git_surface
        .ensure_clone(&cancel, &fixture.origin_id(), &fixture.workspace)
        .await
        .unwrap();
    let second = git_surface
        .ensure_clone(&cancel, &fixture.origin_id(), &fixture.workspace)
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn ensure_clone_rejects_foreign_destination() {
    let fixture = RemoteFixture::new();
    let cancel = CancellationToken::new();
    let git_surface = surface();

    git_surface
        .ensure_clone(&cancel, &fixture.origin_id(), &fixture.workspace)
        .await
        .unwrap();

    // Same directory name, different repository identity.
    let imposter = fixture
        .origin
        .parent()
        .unwrap()
        .join("elsewhere")
        .join("origin.git");
    let err = git_surface
        .ensure_clone(&cancel, imposter.to_str().unwrap(), &fixture.workspace)
        .await
        .unwrap_err();

    match err {
        GitError::InvalidRepo {
            expected, actual, ..
        } => {
            assert_ne!(expected, actual);
        }
        other => panic!("expected InvalidRepo, got {:?}", other),
    }
}

#[tokio::test]
async fn ensure_worktree_is_idempotent() {
    let fixture = RemoteFixture::new();
    let cancel = CancellationToken::new();
    let git_surface = surface();

    let repo_path = git_surface
        .ensure_clone(&cancel, &fixture.origin_id(), &fixture.workspace)
        .await
        .unwrap();
    let branch = "cascade-update-lib-v2-0-0";
    let first = git_surface
        .ensure_worktree(&cancel, &repo_path, branch, None)
        .await
        .unwrap();
    let second = git_surface
        .ensure_worktree(&cancel, &repo_path, branch, None)
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn worktree_attaches_to_existing_remote_branch() {
    let fixture = RemoteFixture::new();
    let cancel = CancellationToken::new();
    let git_surface = surface();

    // Seed a branch on the remote from a first workspace.
    let repo_path = git_surface
        .ensure_clone(&cancel, &fixture.origin_id(), &fixture.workspace)
        .await
        .unwrap();
    git(&repo_path, &["config", "user.email", "bot@example.com"]);
    git(&repo_path, &["config", "user.name", "Cascade"]);
    let branch = "cascade-update-lib-v3-0-0";
    let worktree = git_surface
        .ensure_worktree(&cancel, &repo_path, branch, None)
        .await
        .unwrap();
    std::fs::write(worktree.join("new.txt"), "x\n").unwrap();
    let hash = git_surface
        .commit(&cancel, &worktree, "seed")
        .await
        .unwrap();
    git_surface.push(&cancel, &worktree, branch).await.unwrap();

    // A fresh workspace sees the branch only on the remote and must
    // create a tracking worktree at the pushed commit.
    let other_workspace = fixture.workspace.parent().unwrap().join("workspace2");
    let repo_path2 = git_surface
        .ensure_clone(&cancel, &fixture.origin_id(), &other_workspace)
        .await
        .unwrap();
    let worktree2 = git_surface
        .ensure_worktree(&cancel, &repo_path2, branch, None)
        .await
        .unwrap();
    assert_eq!(git_stdout(&worktree2, &["rev-parse", "HEAD"]), hash);
}

#[tokio::test]
async fn commit_with_clean_tree_raises_no_changes() {
    let fixture = RemoteFixture::new();
    let cancel = CancellationToken::new();
    let git_surface = surface();

    let repo_path = git_surface
        .ensure_clone(&cancel, &fixture.origin_id(), &fixture.workspace)
        .await
        .unwrap();
    let branch = "cascade-update-noop";
    let worktree = git_surface
        .ensure_worktree(&cancel, &repo_path, branch, None)
        .await
        .unwrap();

    let err = git_surface
        .commit(&cancel, &worktree, "nothing to do")
        .await
        .unwrap_err();
    assert!(matches!(err, GitError::NoChanges));
}

#[tokio::test]
async fn explicit_base_branch_is_used_for_new_branches() {
    let fixture = RemoteFixture::new();
    let cancel = CancellationToken::new();
    let git_surface = surface();

    let repo_path = git_surface
        .ensure_clone(&cancel, &fixture.origin_id(), &fixture.workspace)
        .await
        .unwrap();
    let worktree = git_surface
        .ensure_worktree(&cancel, &repo_path, "feature-from-main", Some("main"))
        .await
        .unwrap();

    let main_tip = git_stdout(&repo_path, &["rev-parse", "refs/remotes/origin/main"]);
    assert_eq!(git_stdout(&worktree, &["rev-parse", "HEAD"]), main_tip);
}
