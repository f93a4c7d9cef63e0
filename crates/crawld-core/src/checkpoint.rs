use anyhow::Context;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// `u64::MAX` has 20 decimal digits.
pub const CHECKPOINT_WIDTH: usize = 20;

pub fn encode_checkpoint(id: u64) -> String {
    format!("{id:0width$}", width = CHECKPOINT_WIDTH)
}

/// Reads the last fetched repository id. Any problem resumes from 0.
pub fn read_checkpoint(path: &Path) -> u64 {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "cannot read last fetched repository id, starting from 0"
            );
            return 0;
        }
    };
    let value = data.trim();
    if value.is_empty() {
        warn!(path = %path.display(), "checkpoint file is empty, starting from 0");
        return 0;
    }
    match value.parse::<u64>() {
        Ok(id) => {
            info!(repo_id = id, "resuming fetch from checkpoint");
            id
        }
        Err(_) => {
            warn!(
                path = %path.display(),
                value = %value,
                "cannot convert checkpoint to a repository id, starting from 0"
            );
            0
        }
    }
}

/// Sole writer of the checkpoint file.
///
/// Ids are written in arrival order, so the file holds the last completion
/// received, which is not necessarily the highest id completed so far.
#[derive(Debug)]
pub struct CheckpointWriter {
    path: PathBuf,
    file: File,
}

impl CheckpointWriter {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create checkpoint directory")?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("open checkpoint {} for writing", path.display()))?;
        let len = file.metadata().context("stat checkpoint")?.len();
        if len > CHECKPOINT_WIDTH as u64 {
            file.set_len(CHECKPOINT_WIDTH as u64)
                .context("trim checkpoint")?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, id: u64) -> anyhow::Result<()> {
        self.file
            .seek(SeekFrom::Start(0))
            .context("seek checkpoint")?;
        self.file
            .write_all(encode_checkpoint(id).as_bytes())
            .context("write checkpoint")?;
        self.file.flush().context("flush checkpoint")?;
        Ok(())
    }

    /// Syncs and closes the file.
    pub fn finish(self) -> anyhow::Result<()> {
        self.file.sync_all().context("sync checkpoint")?;
        debug!(path = %self.path.display(), "checkpoint closed");
        Ok(())
    }

    /// Consumes completions one at a time until the stream closes or
    /// `shutdown` fires, then syncs and closes the file.
    pub async fn run(
        mut self,
        mut completions: mpsc::Receiver<u64>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = completions.recv() => {
                    let Some(id) = next else {
                        break;
                    };
                    if let Err(err) = self.write(id) {
                        warn!(repo_id = id, error = %err, "could not write id to checkpoint");
                    }
                }
            }
        }
        self.finish()
    }
}
