use anyhow::{Context, Result};
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub fn open_file(filename: &Path) -> Result<String> {
    let file =
        File::open(filename).with_context(|| format!("Failed to open file: {:?}", filename))?;
    let mut reader = BufReader::new(file);
    let mut contents = String::new();
    reader
        .read_to_string(&mut contents)
        .with_context(|| format!("Failed to read {:?} as UTF-8 text", filename))?;
    Ok(contents)
}

/// `notes.txt` -> `notes.txt.tmp`, in the same directory so the final
/// rename never crosses filesystems.
fn temp_path(filename: &Path) -> PathBuf {
    let mut name = filename.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

pub fn save_file(filename: &Path, contents: &str) -> Result<()> {
    let temp_filename = temp_path(filename);

    // Write contents to a temporary file first for atomic-like saving
    let mut file = File::create(&temp_filename)
        .with_context(|| format!("Failed to create temporary file: {:?}", temp_filename))?;

    file.write_all(contents.as_bytes())
        .with_context(|| "Failed to write content to temporary file")?;

    file.sync_all()
        .with_context(|| "Failed to sync temporary file")?;

    std::fs::rename(&temp_filename, filename)
        .with_context(|| format!("Failed to rename temporary file to {:?}", filename))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        fs::write(&path, "Hello editor").unwrap();

        let content = open_file(&path).unwrap();
        assert_eq!(content, "Hello editor");
    }

    #[test]
    fn test_open_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_file(&dir.path().join("nonexistent_file_12345.txt"));
        assert!(result.is_err());
    }

    #[test]
    fn test_open_file_rejects_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(open_file(&path).is_err());
    }

    #[test]
    fn test_save_file_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.rs");
        fs::write(&path, "old").unwrap();

        save_file(&path, "fn main() {}\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "fn main() {}\n");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_save_file_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no").join("such").join("file.txt");
        assert!(save_file(&path, "x").is_err());
    }

    #[test]
    fn test_temp_path_keeps_extension() {
        assert_eq!(
            temp_path(Path::new("/a/notes.tmp")),
            PathBuf::from("/a/notes.tmp.tmp")
        );
    }
}
