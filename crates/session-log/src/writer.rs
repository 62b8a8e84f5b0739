use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::entry::SessionEvent;

/// Errors that can occur during session-log I/O.
#[derive(Debug, thiserror::Error)]
pub enum SessionLogError {
    #[error("failed to create parent directories: {0}")]
    CreateDir(std::io::Error),

    #[error("failed to open session log file: {0}")]
    OpenFile(std::io::Error),

    #[error("failed to serialize session event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write to session log: {0}")]
    Write(std::io::Error),

    #[error("failed to flush session log: {0}")]
    Flush(std::io::Error),
}

/// Append-only file writer that serialises [`SessionEvent`] values as
/// JSON-lines. Each call to [`write`](Self::write) produces exactly one
/// newline-terminated JSON object in the output file.
pub struct EventWriter {
    file: tokio::fs::File,
}

impl EventWriter {
    /// Open (or create) the session log file at `path` in append mode.
    ///
    /// Parent directories are created automatically if they do not exist.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, SessionLogError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(SessionLogError::CreateDir)?;
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(SessionLogError::OpenFile)?;

        Ok(Self { file })
    }

    /// Serialise `event` as a single JSON line and append it to the file.
    pub async fn write(&mut self, event: &SessionEvent) -> Result<(), SessionLogError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        self.file
            .write_all(&line)
            .await
            .map_err(SessionLogError::Write)?;

        Ok(())
    }

    /// Flush the underlying file, ensuring all buffered data reaches disk.
    pub async fn flush(&mut self) -> Result<(), SessionLogError> {
        self.file.flush().await.map_err(SessionLogError::Flush)
    }
}
