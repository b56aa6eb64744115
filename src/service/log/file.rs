//! Text-file conversation artifacts, one `conversation_{id}.txt` per case.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::{
    base::{config::Config, error::CaseRes},
    service::fs,
};

use super::{ConversationLog, GenericConversationLog};

// Extra methods on `ConversationLog` applied by the file implementation.

impl ConversationLog {
    pub fn file(config: &Config) -> Self {
        let log = FileConversationLog::new(&config.conversation_dir, config.storage_timeout());
        Self { inner: Arc::new(log) }
    }
}

// Specific implementations.

/// Conversation log backed by plain text files in one directory.
#[derive(Clone, Debug)]
pub struct FileConversationLog {
    dir: PathBuf,
    timeout: Duration,
}

impl FileConversationLog {
    pub fn new(dir: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            timeout,
        }
    }

    /// Full path of a case's artifact.
    pub fn path_for(&self, conversation_id: u64) -> PathBuf {
        self.dir.join(self.artifact_name(conversation_id))
    }
}

#[async_trait]
impl GenericConversationLog for FileConversationLog {
    fn artifact_name(&self, conversation_id: u64) -> String {
        format!("conversation_{conversation_id}.txt")
    }

    #[instrument(name = "FileConversationLog::open", skip(self, caller_name, transcript))]
    async fn open(&self, conversation_id: u64, caller_name: &str, transcript: &str) -> CaseRes<()> {
        let path = self.path_for(conversation_id);
        let header = format!("Caller: {caller_name}\n\n");

        let created = fs::append_text(&path, Some(header.as_str()), &format!("{transcript}\n\n"), self.timeout).await?;

        debug!(created, "Opened conversation artifact `{}`.", path.display());

        Ok(())
    }

    #[instrument(name = "FileConversationLog::append", skip(self, text))]
    async fn append(&self, conversation_id: u64, text: &str) -> CaseRes<()> {
        let path = self.path_for(conversation_id);

        fs::append_text(&path, None, &format!("{text}\n\n"), self.timeout).await?;

        Ok(())
    }

    #[instrument(name = "FileConversationLog::read", skip(self))]
    async fn read(&self, conversation_id: u64) -> CaseRes<Option<String>> {
        let bytes = fs::read_optional(&self.path_for(conversation_id), self.timeout).await?;

        Ok(bytes.map(|b| String::from_utf8_lossy(&b).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(dir: &Path) -> FileConversationLog {
        FileConversationLog::new(dir, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_open_writes_header_then_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let log = log(dir.path());

        log.open(1, "John Doe", "Caller: He is clutching his chest.").await.unwrap();
        log.append(1, "Dispatcher: Is he conscious?").await.unwrap();

        let contents = std::fs::read_to_string(dir.path().join("conversation_1.txt")).unwrap();
        assert_eq!(contents, "Caller: John Doe\n\nCaller: He is clutching his chest.\n\nDispatcher: Is he conscious?\n\n");
    }

    #[tokio::test]
    async fn test_open_extends_existing_artifact_without_header() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("conversation_2.txt"), "earlier\n\n").unwrap();

        log(dir.path()).open(2, "Jane Smith", "There's been a car crash!").await.unwrap();

        let contents = std::fs::read_to_string(dir.path().join("conversation_2.txt")).unwrap();
        assert_eq!(contents, "earlier\n\nThere's been a car crash!\n\n");
    }

    #[tokio::test]
    async fn test_read_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(log(dir.path()).read(9).await.unwrap(), None);
    }

    #[test]
    fn test_artifact_names_are_deterministic() {
        let log = log(Path::new("/var/cases"));

        assert_eq!(log.artifact_name(12), "conversation_12.txt");
        assert_eq!(log.path_for(12), PathBuf::from("/var/cases/conversation_12.txt"));
    }
}
