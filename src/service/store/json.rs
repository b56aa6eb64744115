//! JSON file implementation of the case store.
//!
//! The whole collection lives in memory behind a read/write lock and is rewritten
//! in full after every mutation. Mutations stage a copy, persist it, write the
//! conversation artifact, and only then swap the copy in.
//!
//! The file is two-space indented with non-ASCII text escaped, so stores written
//! that way elsewhere load and save back byte for byte.

use std::{
    collections::HashMap,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{
    Serializer,
    ser::{Formatter, PrettyFormatter},
};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        error::{CaseError, CaseRes},
        types::{CaseField, CaseReport, Drift, EmergencyCase},
    },
    service::{fs, log::ConversationLog},
};

use super::{CaseStore, GenericCaseStore};

// Extra methods on `CaseStore` applied by the json implementation.

impl CaseStore {
    pub async fn json(config: &Config, log: ConversationLog) -> CaseRes<Self> {
        let store = JsonCaseStore::load(&config.data_file, log, config.storage_timeout(), config.strict_load).await?;
        Ok(Self { inner: Arc::new(store) })
    }
}

// Collection.

/// The in-memory collection with a position index by id.
#[derive(Clone, Debug, Default)]
struct Cases {
    records: Vec<EmergencyCase>,
    index: HashMap<u64, usize>,
}

impl Cases {
    fn new(records: Vec<EmergencyCase>) -> Self {
        let mut index = HashMap::with_capacity(records.len());

        for (position, case) in records.iter().enumerate() {
            // Older stores may carry duplicate ids; the first one wins lookups.
            index.entry(case.conversation_id).or_insert(position);
        }

        Self { records, index }
    }

    fn get(&self, conversation_id: u64) -> Option<&EmergencyCase> {
        self.index.get(&conversation_id).map(|&position| &self.records[position])
    }

    fn get_mut(&mut self, conversation_id: u64) -> CaseRes<&mut EmergencyCase> {
        match self.index.get(&conversation_id) {
            Some(&position) => Ok(&mut self.records[position]),
            None => Err(CaseError::NotFound(conversation_id)),
        }
    }

    fn push(&mut self, case: EmergencyCase) -> CaseRes<()> {
        check_new_id(case.conversation_id)?;

        if self.index.contains_key(&case.conversation_id) {
            return Err(CaseError::DuplicateId(case.conversation_id));
        }

        self.index.insert(case.conversation_id, self.records.len());
        self.records.push(case);

        Ok(())
    }

    fn next_id(&self) -> CaseRes<u64> {
        match self.records.iter().map(|c| c.conversation_id).max() {
            None => Ok(1),
            Some(max) => max.checked_add(1).ok_or(CaseError::IdsExhausted(max)),
        }
    }

    fn duplicate_count(&self) -> usize {
        self.records.len() - self.index.len()
    }
}

/// Ids are positive, and the largest one is reserved so every stored id has a successor.
fn check_new_id(conversation_id: u64) -> CaseRes<()> {
    match conversation_id {
        0 => Err(CaseError::invalid_field("conversation_id", "must be positive")),
        u64::MAX => Err(CaseError::invalid_field("conversation_id", "leaves no successor id")),
        _ => Ok(()),
    }
}

/// Pretty printer that escapes non-ASCII text as `\uXXXX`, matching stores written
/// with two-space indentation and ASCII-only output.
struct AsciiPrettyFormatter {
    inner: PrettyFormatter<'static>,
}

impl AsciiPrettyFormatter {
    fn new() -> Self {
        Self { inner: PrettyFormatter::new() }
    }
}

impl Formatter for AsciiPrettyFormatter {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_value(writer)
    }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        let mut start = 0;

        for (position, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }

            writer.write_all(&fragment.as_bytes()[start..position])?;

            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }

            start = position + ch.len_utf8();
        }

        writer.write_all(&fragment.as_bytes()[start..])
    }
}

/// Serialize the collection in the on-disk format.
fn to_store_bytes(records: &[EmergencyCase]) -> serde_json::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut bytes, AsciiPrettyFormatter::new());
    records.serialize(&mut serializer)?;
    Ok(bytes)
}

/// The artifact write that accompanies a mutation.
enum Artifact<'a> {
    None,
    Open { conversation_id: u64, caller_name: &'a str, transcript: &'a str },
    Append { conversation_id: u64, text: &'a str },
}

// Specific implementations.

/// Case store persisted as one pretty-printed JSON array.
pub struct JsonCaseStore {
    path: PathBuf,
    timeout: Duration,
    log: ConversationLog,
    cases: RwLock<Cases>,
}

impl JsonCaseStore {
    /// Load the collection from `path`.
    ///
    /// A missing or blank file starts an empty store. An unparseable file is a
    /// `MalformedStore` error when `strict`, otherwise it is logged and the store
    /// starts empty.
    #[instrument(name = "JsonCaseStore::load", skip(log))]
    pub async fn load(path: &Path, log: ConversationLog, timeout: Duration, strict: bool) -> CaseRes<Self> {
        let records = match fs::read_optional(path, timeout).await? {
            None => {
                info!("No case store at `{}`, starting empty.", path.display());
                Vec::new()
            }
            Some(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Some(bytes) => match serde_json::from_slice::<Vec<EmergencyCase>>(&bytes) {
                Ok(records) => records,
                Err(source) if strict => {
                    return Err(CaseError::MalformedStore {
                        path: path.to_path_buf(),
                        source,
                    });
                }
                Err(source) => {
                    warn!("Case store at `{}` does not parse ({source}), starting empty.", path.display());
                    Vec::new()
                }
            },
        };

        // No writer survives a restart, so a leftover staging file is stale.
        fs::remove_stale_staging(path, timeout).await;

        let cases = Cases::new(records);

        if cases.duplicate_count() > 0 {
            warn!("Case store at `{}` holds {} duplicate ids.", path.display(), cases.duplicate_count());
        }

        info!("Loaded {} cases from `{}`.", cases.records.len(), path.display());

        Ok(Self {
            path: path.to_path_buf(),
            timeout,
            log,
            cases: RwLock::new(cases),
        })
    }

    /// Rewrite the whole collection.
    async fn persist(&self, records: &[EmergencyCase]) -> CaseRes<()> {
        let bytes = to_store_bytes(records).map_err(|e| CaseError::storage(&self.path, io::Error::other(e)))?;

        fs::write_replace(&self.path, &bytes, self.timeout).await?;

        debug!("Persisted {} cases.", records.len());

        Ok(())
    }

    /// Persist `staged`, write the artifact, then make `staged` current.
    ///
    /// On an artifact failure the previous collection is written back. If that
    /// rollback fails too, memory adopts `staged` so it still matches storage.
    async fn commit(&self, current: &mut Cases, staged: Cases, artifact: Artifact<'_>) -> CaseRes<()> {
        self.persist(&staged.records).await?;

        let written = match artifact {
            Artifact::None => Ok(()),
            Artifact::Open {
                conversation_id,
                caller_name,
                transcript,
            } => self.log.open(conversation_id, caller_name, transcript).await,
            Artifact::Append { conversation_id, text } => self.log.append(conversation_id, text).await,
        };

        if let Err(err) = written {
            warn!("Conversation artifact write failed, rolling back: {err}");

            if let Err(rollback) = self.persist(&current.records).await {
                error!("Rollback failed ({rollback}); keeping the persisted collection. Run an audit to find the drift.");
                *current = staged;
            }

            return Err(err);
        }

        *current = staged;

        Ok(())
    }
}

#[async_trait]
impl GenericCaseStore for JsonCaseStore {
    #[instrument(name = "JsonCaseStore::add_case", skip(self, case), fields(conversation_id = case.conversation_id))]
    async fn add_case(&self, case: EmergencyCase) -> CaseRes<()> {
        let mut cases = self.cases.write().await;

        let mut staged = cases.clone();
        staged.push(case.clone())?;

        let artifact = Artifact::Open {
            conversation_id: case.conversation_id,
            caller_name: &case.caller_name,
            transcript: &case.conversation,
        };

        self.commit(&mut cases, staged, artifact).await?;

        info!("Case `{}` added.", case.conversation_id);

        Ok(())
    }

    #[instrument(name = "JsonCaseStore::open_case", skip_all)]
    async fn open_case(&self, report: CaseReport) -> CaseRes<EmergencyCase> {
        let mut cases = self.cases.write().await;

        let case = report.into_case(cases.next_id()?);

        let mut staged = cases.clone();
        staged.push(case.clone())?;

        let artifact = Artifact::Open {
            conversation_id: case.conversation_id,
            caller_name: &case.caller_name,
            transcript: &case.conversation,
        };

        self.commit(&mut cases, staged, artifact).await?;

        info!("Case `{}` opened.", case.conversation_id);

        Ok(case)
    }

    async fn get_case_by_id(&self, conversation_id: u64) -> Option<EmergencyCase> {
        self.cases.read().await.get(conversation_id).cloned()
    }

    async fn get_open_cases(&self) -> Vec<EmergencyCase> {
        self.cases.read().await.records.iter().filter(|c| !c.closed).cloned().collect()
    }

    async fn all_cases(&self) -> Vec<EmergencyCase> {
        self.cases.read().await.records.clone()
    }

    #[instrument(name = "JsonCaseStore::update_case_field", skip(self, field), fields(field = field.name()))]
    async fn update_case_field(&self, conversation_id: u64, field: CaseField) -> CaseRes<()> {
        let mut cases = self.cases.write().await;

        let mut staged = cases.clone();
        field.apply(staged.get_mut(conversation_id)?);

        self.commit(&mut cases, staged, Artifact::None).await
    }

    #[instrument(name = "JsonCaseStore::update_responders", skip(self, responders))]
    async fn update_responders(&self, conversation_id: u64, responders: Vec<String>) -> CaseRes<()> {
        let mut cases = self.cases.write().await;

        let mut staged = cases.clone();
        staged.get_mut(conversation_id)?.first_responders_demanded = responders;

        self.commit(&mut cases, staged, Artifact::None).await
    }

    #[instrument(name = "JsonCaseStore::append_to_conversation", skip(self, text))]
    async fn append_to_conversation(&self, conversation_id: u64, text: &str) -> CaseRes<()> {
        let mut cases = self.cases.write().await;

        let mut staged = cases.clone();
        let case = staged.get_mut(conversation_id)?;
        case.conversation.push('\n');
        case.conversation.push_str(text);

        self.commit(&mut cases, staged, Artifact::Append { conversation_id, text }).await
    }

    async fn next_conversation_id(&self) -> CaseRes<u64> {
        self.cases.read().await.next_id()
    }

    #[instrument(name = "JsonCaseStore::audit", skip_all)]
    async fn audit(&self) -> CaseRes<Vec<Drift>> {
        let snapshot = self.all_cases().await;
        let mut drift = Vec::new();

        for case in snapshot {
            let conversation_id = case.conversation_id;

            match self.log.read(conversation_id).await? {
                None => drift.push(Drift::MissingArtifact { conversation_id }),
                Some(artifact) if !without_line_breaks(&artifact).contains(&without_line_breaks(&case.conversation)) => {
                    drift.push(Drift::TranscriptBehind { conversation_id })
                }
                Some(_) => {}
            }
        }

        if drift.is_empty() {
            info!("Audit found no drift.");
        } else {
            warn!("Audit found {} drifting cases.", drift.len());
        }

        Ok(drift)
    }
}

/// The transcript and the artifact separate turns differently, so compare them without line breaks.
fn without_line_breaks(text: &str) -> String {
    text.chars().filter(|c| !matches!(*c, '\n' | '\r')).collect()
}

#[cfg(test)]
mod tests {
    use crate::service::log::file::FileConversationLog;

    use super::*;

    const LIMIT: Duration = Duration::from_secs(5);

    fn case(id: u64, responders: &[&str]) -> EmergencyCase {
        EmergencyCase {
            injury_type: "Heart attack".to_string(),
            caller_name: "John Doe".to_string(),
            first_responders_demanded: responders.iter().map(|r| r.to_string()).collect(),
            conversation_id: id,
            need_severity: 9,
            closed: false,
            conversation: "Caller: I think my father is having a heart attack!".to_string(),
        }
    }

    async fn store(dir: &Path) -> JsonCaseStore {
        let log = ConversationLog::new(Arc::new(FileConversationLog::new(dir, LIMIT)));
        JsonCaseStore::load(&dir.join("emergency_data.json"), log, LIMIT, true).await.unwrap()
    }

    #[test]
    fn test_index_keeps_first_of_duplicate_ids() {
        let mut second = case(1, &["police"]);
        second.caller_name = "Someone Else".to_string();

        let cases = Cases::new(vec![case(1, &["paramedic"]), second]);

        assert_eq!(cases.get(1).unwrap().caller_name, "John Doe");
        assert_eq!(cases.duplicate_count(), 1);
    }

    #[tokio::test]
    async fn test_next_id_follows_max_with_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        assert_eq!(store.next_conversation_id().await.unwrap(), 1);

        for id in [1, 3, 4] {
            store.add_case(case(id, &[])).await.unwrap();
        }

        assert_eq!(store.next_conversation_id().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_blank_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("emergency_data.json"), "  \n").unwrap();

        assert!(store(dir.path()).await.all_cases().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_is_rejected_when_strict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emergency_data.json");
        std::fs::write(&path, "{ not json").unwrap();

        let log = ConversationLog::new(Arc::new(FileConversationLog::new(dir.path(), LIMIT)));
        let result = JsonCaseStore::load(&path, log, LIMIT, true).await;

        assert!(matches!(result, Err(CaseError::MalformedStore { .. })));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[tokio::test]
    async fn test_malformed_file_starts_empty_when_lenient() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emergency_data.json");
        std::fs::write(&path, "[{\"injury_type\": 3}]").unwrap();

        let log = ConversationLog::new(Arc::new(FileConversationLog::new(dir.path(), LIMIT)));
        let store = JsonCaseStore::load(&path, log, LIMIT, false).await.unwrap();

        assert!(store.all_cases().await.is_empty());
    }

    #[tokio::test]
    async fn test_append_keeps_transcript_and_artifact_in_step() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        store.add_case(case(1, &["paramedic"])).await.unwrap();
        store.append_to_conversation(1, "Dispatcher: Is the patient conscious?").await.unwrap();

        let transcript = store.get_case_by_id(1).await.unwrap().conversation;
        assert_eq!(transcript, "Caller: I think my father is having a heart attack!\nDispatcher: Is the patient conscious?");

        let artifact = std::fs::read_to_string(dir.path().join("conversation_1.txt")).unwrap();
        assert_eq!(
            artifact,
            "Caller: John Doe\n\nCaller: I think my father is having a heart attack!\n\nDispatcher: Is the patient conscious?\n\n"
        );
        assert!(store.audit().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_audit_reports_missing_and_stale_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        store.add_case(case(1, &[])).await.unwrap();
        store.add_case(case(2, &[])).await.unwrap();
        store.append_to_conversation(2, "Caller: It is getting worse.").await.unwrap();

        std::fs::remove_file(dir.path().join("conversation_1.txt")).unwrap();
        std::fs::write(dir.path().join("conversation_2.txt"), "Caller: John Doe\n\n").unwrap();

        let drift = store.audit().await.unwrap();

        assert_eq!(
            drift,
            vec![Drift::MissingArtifact { conversation_id: 1 }, Drift::TranscriptBehind { conversation_id: 2 }]
        );
    }

    #[tokio::test]
    async fn test_save_load_is_byte_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emergency_data.json");

        {
            let store = store(dir.path()).await;
            store.add_case(case(1, &["paramedic"])).await.unwrap();
            store.add_case(case(2, &["paramedic", "police"])).await.unwrap();
        }

        let before = std::fs::read(&path).unwrap();

        // Reload and force a rewrite with no effective change.
        let store = store(dir.path()).await;
        store.update_case_field(1, CaseField::NeedSeverity(9)).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    fn report() -> CaseReport {
        CaseReport {
            injury_type: "Fall".to_string(),
            caller_name: "AI Agent".to_string(),
            first_responders_demanded: vec!["paramedic".to_string()],
            need_severity: 6,
            conversation: "Initial report: Person fell down stairs.".to_string(),
        }
    }

    #[tokio::test]
    async fn test_ids_without_successor_or_zero_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        for id in [0, u64::MAX] {
            let err = store.add_case(case(id, &[])).await.unwrap_err();
            assert!(matches!(err, CaseError::InvalidField { ref field, .. } if field == "conversation_id"), "{id}: {err}");
        }

        assert!(store.all_cases().await.is_empty());
        assert!(!dir.path().join("emergency_data.json").exists());
        assert_eq!(store.next_conversation_id().await.unwrap(), 1);

        store.add_case(case(u64::MAX - 1, &[])).await.unwrap();
        assert_eq!(store.next_conversation_id().await.unwrap(), u64::MAX);
    }

    #[tokio::test]
    async fn test_exhausted_ids_are_reported_not_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emergency_data.json");
        std::fs::write(&path, to_store_bytes(&[case(u64::MAX, &[])]).unwrap()).unwrap();

        let store = store(dir.path()).await;

        assert!(matches!(store.next_conversation_id().await, Err(CaseError::IdsExhausted(u64::MAX))));
        assert!(matches!(store.open_case(report()).await, Err(CaseError::IdsExhausted(u64::MAX))));
        assert_eq!(store.all_cases().await.len(), 1);
    }

    #[tokio::test]
    async fn test_ascii_escaped_store_saves_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emergency_data.json");

        let reference = concat!(
            "[\n",
            "  {\n",
            "    \"injury_type\": \"Fall\",\n",
            "    \"caller_name\": \"Jos\\u00e9 \\ud83d\\ude91\",\n",
            "    \"first_responders_demanded\": [\n",
            "      \"paramedic\"\n",
            "    ],\n",
            "    \"conversation_id\": 1,\n",
            "    \"need_severity\": 6,\n",
            "    \"closed\": false,\n",
            "    \"conversation\": \"Caller: \\\"Help\\\"\\nDispatcher: On the way.\"\n",
            "  }\n",
            "]"
        );
        std::fs::write(&path, reference).unwrap();

        let store = store(dir.path()).await;
        assert_eq!(store.get_case_by_id(1).await.unwrap().caller_name, "Jos\u{e9} \u{1f691}");

        store.update_case_field(1, CaseField::Closed(false)).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), reference);
    }
}
