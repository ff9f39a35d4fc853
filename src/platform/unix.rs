use std::fs::Metadata;
use std::path::Path;

use super::SystemFileProbe;

const SYSTEM_TREES: [&str; 3] = ["/proc/", "/sys/", "/dev/"];

/// Dotfiles are hidden; dotfiles and anything under the kernel pseudo
/// filesystems count as system files.
#[derive(Debug, Default, Clone, Copy)]
pub struct NameProbe;

impl SystemFileProbe for NameProbe {
    fn is_hidden(&self, path: &Path, _metadata: &Metadata) -> bool {
        is_dotfile(path)
    }

    fn is_system_file(&self, path: &Path, _metadata: &Metadata) -> bool {
        if is_dotfile(path) {
            return true;
        }
        let path_str = path.to_string_lossy();
        SYSTEM_TREES.iter().any(|tree| path_str.contains(tree))
    }
}

fn is_dotfile(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_dotfile_is_hidden_and_system() {
        let dir = tempfile::tempdir().unwrap();
        let hidden = dir.path().join(".profile");
        let plain = dir.path().join("profile");
        fs::write(&hidden, "x").unwrap();
        fs::write(&plain, "x").unwrap();

        let probe = NameProbe;
        let meta = fs::metadata(&hidden).unwrap();
        assert!(probe.is_hidden(&hidden, &meta));
        assert!(probe.is_system_file(&hidden, &meta));

        let meta = fs::metadata(&plain).unwrap();
        assert!(!probe.is_hidden(&plain, &meta));
        assert!(!probe.is_system_file(&plain, &meta));
    }

    #[test]
    fn test_pseudo_filesystem_paths() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("f");
        fs::write(&plain, "x").unwrap();
        let meta = fs::metadata(&plain).unwrap();

        assert!(NameProbe.is_system_file(Path::new("/proc/self/status"), &meta));
        assert!(NameProbe.is_system_file(Path::new("/sys/kernel/notes"), &meta));
        assert!(!NameProbe.is_system_file(Path::new("/srv/procurement/a.pdf"), &meta));
    }
}
