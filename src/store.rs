use crate::errors::*;
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use strum::Display;
use tokio::sync::OnceCell;

pub const STORAGE_PREFIX: &str = "rhda-mcp-";

/// Single-occupant locations inside the storage area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Slot {
    Scan,
    Remediation,
}

impl Slot {
    pub fn file_name(&self) -> String {
        format!("{}-latest.json", self)
    }
}

/// Keeps the most recent result of each kind for the lifetime of the process.
///
/// The storage area is created on first use and left in place afterwards,
/// cleaning it up is up to the host. Writes replace the whole slot, there is
/// no history and no locking between writers of the same slot.
pub struct ResultStore {
    area: OnceCell<PathBuf>,
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultStore {
    /// Store backed by a fresh, uniquely named directory in the system temp dir.
    pub fn new() -> Self {
        Self {
            area: OnceCell::new(),
        }
    }

    /// Store backed by an existing directory.
    pub fn with_dir<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            area: OnceCell::from(path.into()),
        }
    }

    pub async fn acquire(&self) -> Result<&Path> {
        let area = self
            .area
            .get_or_try_init(|| async {
                let tmp = tempfile::Builder::new()
                    .prefix(STORAGE_PREFIX)
                    .tempdir()
                    .map_err(Failure::Io)
                    .context("Failed to create storage area")?;
                let path = tmp.keep();
                info!("Storing results in {:?}", path);
                Ok::<_, Error>(path)
            })
            .await?;
        Ok(area.as_path())
    }

    pub async fn slot_path(&self, slot: Slot) -> Result<PathBuf> {
        let dir = self.acquire().await?;
        Ok(dir.join(slot.file_name()))
    }

    pub async fn write_slot<T: Serialize + ?Sized>(&self, slot: Slot, payload: &T) -> Result<PathBuf> {
        let dir = self.acquire().await?.to_path_buf();
        let json =
            serde_json::to_string_pretty(payload).context("Failed to serialize slot payload")?;
        let path = dir.join(slot.file_name());

        let dest = path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            // rename over the slot file so readers see either the old or the new content
            let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(Failure::Io)?;
            tmp.write_all(json.as_bytes()).map_err(Failure::Io)?;
            tmp.persist(&dest).map_err(|err| Failure::Io(err.error))?;
            Ok(())
        })
        .await
        .context("Slot writer task failed")?
        .with_context(|| anyhow!("Failed to write {} slot", slot))?;

        debug!("Wrote {} slot to {:?}", slot, path);
        Ok(path)
    }

    /// Returns `None` if the slot was never written.
    pub async fn read_slot(&self, slot: Slot) -> Result<Option<String>> {
        let path = self.slot_path(slot).await?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(Failure::Io(err)).with_context(|| anyhow!("Failed to read {:?}", path))
            }
        }
    }
}
