// 上传功能
use crate::ssh::transport::{SftpChannel, TransportSession};
use crate::transfer::progress::ProgressTracker;
use crate::utils::error::{ClientError, Result, TransportError};
use std::fs::File;
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::Path;

/// Disconnects the sftp channel however the upload ends.
struct SftpGuard<C: SftpChannel>(C);

impl<C: SftpChannel> Deref for SftpGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.0
    }
}

impl<C: SftpChannel> DerefMut for SftpGuard<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.0
    }
}

impl<C: SftpChannel> Drop for SftpGuard<C> {
    fn drop(&mut self) {
        self.0.disconnect();
    }
}

/// Uploads `paths` into `remote_dir`, creating whatever part of the directory
/// is missing.
///
/// Returns `Ok(true)` only if every file made it. A file that cannot be read or
/// written is logged and skipped; only failing to open the channel or to set up
/// the destination directory is an error.
pub fn copy_files<S, P>(session: &S, paths: &[P], remote_dir: &str, show_progress: bool) -> Result<bool>
where
    S: TransportSession + ?Sized,
    P: AsRef<Path>,
{
    let sftp = session.open_sftp().map_err(|source| ClientError::Transfer { source })?;
    let mut sftp = SftpGuard(sftp);

    let remote_dir = normalize_remote_dir(remote_dir);
    log::debug!("Trying to access remote directory: {}", remote_dir);
    ensure_remote_dir(&mut *sftp, &remote_dir).map_err(|source| ClientError::Transfer { source })?;

    let total_size = paths
        .iter()
        .filter_map(|path| std::fs::metadata(path).ok())
        .map(|metadata| metadata.len())
        .sum();
    let mut progress = ProgressTracker::new(total_size, &format!("Uploading to {}", remote_dir), show_progress);

    let mut copied = 0;
    for path in paths {
        let path = path.as_ref();
        match upload_file(&mut *sftp, path) {
            Ok(bytes) => {
                log::debug!("Uploaded {} ({} bytes)", path.display(), bytes);
                progress.add_bytes(bytes);
                copied += 1;
            }
            Err(e) => log::info!("Error occurred while uploading {}: {}", path.display(), e),
        }
    }

    progress.finish(copied, paths.len());
    Ok(copied == paths.len())
}

/// Forward slashes only, so Windows-style input still names a remote path.
pub fn normalize_remote_dir(remote_dir: &str) -> String {
    remote_dir.replace('\\', "/")
}

/// Starting from the root, enters each segment of `remote_dir`, creating the
/// ones that do not exist yet. Existing segments are left alone.
pub fn ensure_remote_dir<C: SftpChannel + ?Sized>(sftp: &mut C, remote_dir: &str) -> Result<(), TransportError> {
    sftp.cd("/")?;

    for segment in remote_dir.split('/').filter(|segment| !segment.is_empty()) {
        if sftp.cd(segment).is_err() {
            log::debug!("mkdir {}; cd {}", segment, segment);
            sftp.mkdir(segment)?;
            sftp.cd(segment)?;
        }
    }
    Ok(())
}

fn upload_file<C: SftpChannel + ?Sized>(sftp: &mut C, path: &Path) -> Result<u64, TransportError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no usable file name"))?;

    let mut file = File::open(path)?;
    log::debug!("Uploading file name: {}", name);
    sftp.put(&mut file, name)
}
