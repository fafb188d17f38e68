use eyre::Context as _;
use fs2::FileExt as _;
use rand::Rng as _;
use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write as _},
    path::{Path, PathBuf},
};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt as _, PermissionsExt as _};

pub const MODE_DIR_PRIVATE: u32 = 0o700;
pub const MODE_FILE_PRIVATE: u32 = 0o600;

fn is_symlink(p: &Path) -> eyre::Result<bool> {
    let md = fs::symlink_metadata(p).with_context(|| format!("stat {}", p.display()))?;
    Ok(md.file_type().is_symlink())
}

/// Create `dir` if needed and clamp it to owner-only access on Unix.
pub fn ensure_private_dir(dir: &Path) -> eyre::Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
    } else if is_symlink(dir)? {
        eyre::bail!("refusing to use symlinked directory: {}", dir.display());
    } else if !dir.is_dir() {
        eyre::bail!("expected directory at {}", dir.display());
    }

    #[cfg(unix)]
    {
        let mode = fs::metadata(dir)
            .with_context(|| format!("stat {}", dir.display()))?
            .permissions()
            .mode();
        if (mode & 0o077) != 0 {
            fs::set_permissions(dir, fs::Permissions::from_mode(MODE_DIR_PRIVATE))
                .with_context(|| format!("chmod {MODE_DIR_PRIVATE:o} {}", dir.display()))?;
        }
    }
    Ok(())
}

fn open_private(path: &Path, opts: &mut OpenOptions) -> std::io::Result<File> {
    #[cfg(unix)]
    opts.mode(MODE_FILE_PRIVATE);
    opts.open(path)
}

/// Write `bytes` to `path` via a sibling temp file, fsync, then rename over the target.
///
/// Readers see either the old content or the new content, never a prefix.
pub fn write_atomic_private(path: &Path, bytes: &[u8]) -> eyre::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| eyre::eyre!("missing parent for {}", path.display()))?;
    ensure_private_dir(parent)?;
    if path.exists() && is_symlink(path)? {
        eyre::bail!("refusing to write to symlink: {}", path.display());
    }

    let tmp = temp_sibling(parent, path);
    let mut f = open_private(&tmp, OpenOptions::new().create_new(true).write(true))
        .with_context(|| format!("open temp {}", tmp.display()))?;
    let written = f
        .write_all(bytes)
        .and_then(|()| f.flush())
        .and_then(|()| f.sync_all());
    drop(f);
    if let Err(e) = written {
        drop(fs::remove_file(&tmp));
        return Err(eyre::Report::new(e).wrap_err(format!("write {}", tmp.display())));
    }

    // `rename` does not replace an existing destination on Windows.
    #[cfg(windows)]
    {
        if path.exists() {
            fs::remove_file(path).with_context(|| format!("remove existing {}", path.display()))?;
        }
    }

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))
}

pub fn write_string_atomic_private(path: &Path, s: &str) -> eyre::Result<()> {
    write_atomic_private(path, s.as_bytes())
}

/// Read a file that may legitimately not exist yet.
pub fn read_optional_string(path: &Path) -> eyre::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(eyre::Report::new(e).wrap_err(format!("read {}", path.display()))),
    }
}

/// Exclusive advisory lock on a sidecar file. Released when the returned handle drops.
pub fn lock_exclusive(lock_path: &Path) -> eyre::Result<File> {
    if let Some(parent) = lock_path.parent() {
        ensure_private_dir(parent)?;
    }
    let f = open_private(
        lock_path,
        OpenOptions::new().create(true).read(true).write(true).truncate(false),
    )
    .with_context(|| format!("open lock {}", lock_path.display()))?;
    f.lock_exclusive()
        .with_context(|| format!("lock {}", lock_path.display()))?;
    Ok(f)
}

fn temp_sibling(parent: &Path, target: &Path) -> PathBuf {
    let base = target
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let mut suffix = [0_u8; 8];
    rand::rng().fill_bytes(&mut suffix);
    parent.join(format!(".{base}.tmp.{}", hex::encode(suffix)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_content_and_leaves_no_temp() -> eyre::Result<()> {
        let td = tempfile::tempdir()?;
        let p = td.path().join("nested").join("transactions.json");
        write_string_atomic_private(&p, "[]")?;
        write_string_atomic_private(&p, "[1]")?;
        assert_eq!(fs::read_to_string(&p)?, "[1]");
        let leftovers = fs::read_dir(p.parent().ok_or_else(|| eyre::eyre!("no parent"))?)?
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .count();
        assert_eq!(leftovers, 0, "temp files must be renamed away");
        Ok(())
    }

    #[test]
    fn missing_file_reads_as_none() -> eyre::Result<()> {
        let td = tempfile::tempdir()?;
        assert_eq!(read_optional_string(&td.path().join("absent"))?, None);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn written_files_are_owner_only() -> eyre::Result<()> {
        let td = tempfile::tempdir()?;
        let p = td.path().join("config.toml");
        write_string_atomic_private(&p, "x = 1")?;
        let mode = fs::metadata(&p)?.permissions().mode() & 0o777;
        assert_eq!(mode, MODE_FILE_PRIVATE);
        Ok(())
    }
}
