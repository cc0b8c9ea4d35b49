// 本地文件枚举
use std::io;
use std::path::{Path, PathBuf};

/// Extensions picked up when a directory is handed to `upload` without `--ext`.
pub const DEFAULT_EXTENSIONS: &[&str] = &["sh", "txt"];

/// Lists the regular files directly inside `dir` whose extension is one of
/// `extensions`. The result is sorted so uploads happen in a stable order.
pub fn source_files<P: AsRef<Path>, S: AsRef<str>>(dir: P, extensions: &[S]) -> io::Result<Vec<PathBuf>> {
    let mut result = Vec::new();

    for entry in std::fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }

        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.iter().any(|wanted| wanted.as_ref() == ext))
            .unwrap_or(false);

        if matches {
            log::debug!("entry: {}", path.display());
            result.push(path);
        }
    }

    result.sort();
    Ok(result)
}

/// Expands a mix of file and directory arguments into the flat list of files
/// to upload. Directories contribute their matching files, plain files are kept
/// as given.
pub fn expand_paths<S: AsRef<str>>(paths: &[PathBuf], extensions: &[S]) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(source_files(path, extensions)?);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}
