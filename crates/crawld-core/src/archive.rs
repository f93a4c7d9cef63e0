use crate::paths::archive_path;
use anyhow::Context;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Packs `repo_path` into `<repo_path>.tar` and removes the directory.
pub fn create_in_place(repo_path: &Path) -> anyhow::Result<PathBuf> {
    let name = repo_path
        .file_name()
        .with_context(|| format!("archive source has no file name: {}", repo_path.display()))?;
    let destination = archive_path(repo_path);
    let result = (|| -> anyhow::Result<()> {
        let file = File::create(&destination).context("create archive file")?;
        let mut builder = tar::Builder::new(file);
        builder.follow_symlinks(false);
        builder
            .append_dir_all(name, repo_path)
            .context("append repo to archive")?;
        let file = builder.into_inner().context("finish archive")?;
        file.sync_all().context("sync archive")?;
        Ok(())
    })();
    if let Err(err) = result {
        let _ = fs::remove_file(&destination);
        return Err(err);
    }
    fs::remove_dir_all(repo_path).context("remove archived repo directory")?;
    Ok(destination)
}

/// Unpacks `<repo>.tar` next to itself and removes the archive.
pub fn extract_in_place(archive: &Path) -> anyhow::Result<()> {
    let parent = archive
        .parent()
        .with_context(|| format!("archive has no parent: {}", archive.display()))?;
    let file = File::open(archive).context("open archive")?;
    let mut unpacker = tar::Archive::new(file);
    unpacker.set_preserve_permissions(true);
    unpacker.unpack(parent).context("unpack archive")?;
    fs::remove_file(archive).context("remove extracted archive")?;
    Ok(())
}
