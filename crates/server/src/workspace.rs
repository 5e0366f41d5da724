//! Per-job workspace directories
//!
//! Every snapshot job renders into its own directory under the configured
//! output root. A [`Workspace`] owns its directory: whoever holds the value is
//! responsible for it, and dropping the value removes the directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Symbols used for workspace identifiers
pub const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a workspace identifier
pub const ID_LEN: usize = 16;

/// Whether `name` has the shape of a workspace identifier
pub fn is_workspace_id(name: &str) -> bool {
    name.len() == ID_LEN && name.bytes().all(|b| ID_ALPHABET.contains(&b))
}

/// Remove a workspace directory and everything in it
///
/// Succeeds if the directory is already gone.
pub fn destroy_workspace(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Regular files directly inside `dir`, sorted by name
pub fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Allocates workspaces under a single root directory
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a new, uniquely named workspace directory
    ///
    /// The name is 16 symbols drawn uniformly from `[a-zA-Z0-9]`. The
    /// directory is created exclusively, so a name that is already taken is
    /// replaced rather than shared.
    pub fn allocate(&self) -> io::Result<Workspace> {
        fs::create_dir_all(&self.root)?;

        let path = tempfile::Builder::new()
            .prefix("")
            .suffix("")
            .rand_bytes(ID_LEN)
            .tempdir_in(&self.root)?
            .keep();
        let id = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        debug!(workspace = %path.display(), "allocated workspace");
        Ok(Workspace {
            id,
            path,
            armed: true,
        })
    }

    /// Remove workspaces left under the root by a previous process
    ///
    /// Only directories named like a workspace identifier are touched; files
    /// and anything else an operator keeps under the root survive. Returns
    /// the number of workspaces removed.
    pub fn purge(&self) -> io::Result<usize> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if !name.to_str().is_some_and(is_workspace_id) {
                continue;
            }

            let path = entry.path();
            match destroy_workspace(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to purge stale workspace"
                ),
            }
        }
        Ok(removed)
    }
}

/// An exclusively owned job directory
///
/// Destroyed exactly once: either by [`Workspace::destroy`] or when dropped.
#[derive(Debug)]
pub struct Workspace {
    id: String,
    path: PathBuf,
    armed: bool,
}

impl Workspace {
    /// Identifier naming the directory
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List the regular files directly inside the workspace, sorted by name
    pub fn files(&self) -> io::Result<Vec<PathBuf>> {
        list_files(&self.path)
    }

    /// Remove the directory now
    ///
    /// Failures are logged and swallowed; they never reach the caller.
    pub fn destroy(mut self) {
        self.destroy_now();
    }

    fn destroy_now(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        match destroy_workspace(&self.path) {
            Ok(()) => debug!(workspace = %self.path.display(), "destroyed workspace"),
            Err(e) => warn!(
                workspace = %self.path.display(),
                error = %e,
                "failed to destroy workspace"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.destroy_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_workspace_id_shape(name in "\\PC{0,24}") {
            let expected = name.len() == ID_LEN
                && name.chars().all(|c| c.is_ascii_alphanumeric());
            prop_assert_eq!(is_workspace_id(&name), expected);
        }
    }

    #[test]
    fn test_allocated_ids_have_workspace_shape() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(temp.path());

        let ids: HashSet<String> = (0..200)
            .map(|_| manager.allocate().unwrap().id().to_string())
            .collect();

        assert_eq!(ids.len(), 200);
        for id in &ids {
            assert!(is_workspace_id(id), "bad id {}", id);
        }
    }

    // Every position draws from the whole alphabet: 3000 ids leave a
    // missing symbol at any position with probability around 1e-20.
    #[test]
    fn test_every_position_uses_the_whole_alphabet() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(temp.path());

        let mut seen = vec![HashSet::new(); ID_LEN];
        for _ in 0..3000 {
            let workspace = manager.allocate().unwrap();
            for (position, symbol) in workspace.id().bytes().enumerate() {
                seen[position].insert(symbol);
            }
        }

        let per_position: Vec<usize> = seen.iter().map(HashSet::len).collect();
        assert_eq!(per_position, vec![ID_ALPHABET.len(); ID_LEN]);
    }

    #[test]
    fn test_allocate_creates_directory_under_root() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(temp.path().join("out"));

        let workspace = manager.allocate().unwrap();

        assert!(workspace.path().is_dir());
        assert_eq!(workspace.path().parent().unwrap(), manager.root());
        assert_eq!(workspace.path().file_name().unwrap(), workspace.id());
    }

    #[test]
    fn test_concurrent_allocations_are_distinct() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(temp.path());

        let workspaces: Vec<Workspace> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| manager.allocate().unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let paths: HashSet<&Path> = workspaces.iter().map(|w| w.path()).collect();
        assert_eq!(paths.len(), workspaces.len());
    }

    #[test]
    fn test_drop_destroys_workspace() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(temp.path());

        let workspace = manager.allocate().unwrap();
        let path = workspace.path().to_path_buf();
        fs::write(path.join("1349129669258448897.png"), b"png").unwrap();
        fs::create_dir(path.join("nested")).unwrap();

        drop(workspace);
        assert!(!path.exists());
    }

    #[test]
    fn test_destroy_tolerates_missing_directory() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(temp.path());

        let workspace = manager.allocate().unwrap();
        let path = workspace.path().to_path_buf();

        // Removed behind the guard's back; destroying must still be quiet
        fs::remove_dir_all(&path).unwrap();
        workspace.destroy();
        assert!(!path.exists());

        assert!(destroy_workspace(&path).is_ok());
        assert!(destroy_workspace(&path).is_ok());
    }

    #[test]
    fn test_files_lists_only_regular_files() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(temp.path());
        let workspace = manager.allocate().unwrap();

        assert!(workspace.files().unwrap().is_empty());

        fs::write(workspace.path().join("b.mp4"), b"mp4").unwrap();
        fs::write(workspace.path().join("a.png"), b"png").unwrap();
        fs::create_dir(workspace.path().join("frames")).unwrap();

        let names: Vec<_> = workspace
            .files()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.png", "b.mp4"]);
    }

    #[test]
    fn test_purge_removes_leftover_workspaces() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(temp.path());

        let stale = manager.allocate().unwrap();
        let stale_path = stale.path().to_path_buf();
        fs::write(stale_path.join("old.png"), b"png").unwrap();
        std::mem::forget(stale);

        assert_eq!(manager.purge().unwrap(), 1);
        assert!(!stale_path.exists());
    }

    #[test]
    fn test_purge_keeps_everything_else() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let manager = WorkspaceManager::new(root);

        fs::write(root.join("cookie.json"), b"[]").unwrap();
        fs::create_dir(root.join("src")).unwrap();
        // Workspace-shaped name, but a file
        fs::write(root.join("AbCdEfGh12345678"), b"x").unwrap();
        // One symbol short, and one outside the alphabet
        fs::create_dir(root.join("AbCdEfGh1234567")).unwrap();
        fs::create_dir(root.join("AbCdEfGh1234567-")).unwrap();
        let stale = root.join("ZyXwVuTs98765432");
        fs::create_dir(&stale).unwrap();

        assert_eq!(manager.purge().unwrap(), 1);
        assert!(!stale.exists());
        for kept in [
            "cookie.json",
            "src",
            "AbCdEfGh12345678",
            "AbCdEfGh1234567",
            "AbCdEfGh1234567-",
        ] {
            assert!(root.join(kept).exists(), "{} was removed", kept);
        }
    }

    #[test]
    fn test_purge_missing_root() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(temp.path().join("never-created"));
        assert_eq!(manager.purge().unwrap(), 0);
    }
}
