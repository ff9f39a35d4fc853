use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Parallel traversal of `root`, calling `on_file` for every regular file.
///
/// Symlinks are never followed. Failing to open `root` itself is an error;
/// anything below it that cannot be read is logged and skipped.
pub fn walk_tree<F>(root: &Path, on_file: &F) -> io::Result<()>
where
    F: Fn(PathBuf) + Sync,
{
    let metadata = fs::metadata(root)?;
    if !metadata.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", root.display()),
        ));
    }
    let entries = fs::read_dir(root).map_err(|err| {
        io::Error::new(
            err.kind(),
            format!("Error reading directory {}: {}", root.display(), err),
        )
    })?;
    visit_entries(root, entries, on_file);
    Ok(())
}

fn visit_dirs<F>(dir: &Path, on_file: &F)
where
    F: Fn(PathBuf) + Sync,
{
    match fs::read_dir(dir) {
        Ok(entries) => visit_entries(dir, entries, on_file),
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
            error!("Access denied reading directory {}: {}", dir.display(), err);
        }
        Err(err) => {
            warn!("Error reading directory {}: {}", dir.display(), err);
        }
    }
}

fn visit_entries<F>(dir: &Path, entries: fs::ReadDir, on_file: &F)
where
    F: Fn(PathBuf) + Sync,
{
    entries.par_bridge().for_each(|entry_result| {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Error reading entry in directory {}: {}", dir.display(), err);
                return;
            }
        };

        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(err) => {
                warn!("Error getting file type for {}: {}", entry.path().display(), err);
                return;
            }
        };

        if file_type.is_dir() {
            visit_dirs(&entry.path(), on_file);
        } else if file_type.is_file() {
            on_file(entry.path());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_visits_nested_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("top.txt"), "1").unwrap();
        fs::write(nested.join("deep.txt"), "2").unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();

        let seen = Mutex::new(Vec::new());
        walk_tree(dir.path(), &|path: PathBuf| seen.lock().push(path)).unwrap();

        let mut seen = seen.into_inner();
        seen.sort();
        assert_eq!(seen, vec![nested.join("deep.txt"), dir.path().join("top.txt")]);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = walk_tree(&dir.path().join("nope"), &|_: PathBuf| {});
        assert!(result.is_err());
    }

    #[test]
    fn test_file_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "x").unwrap();
        assert!(walk_tree(&file, &|_: PathBuf| {}).is_err());
    }
}
