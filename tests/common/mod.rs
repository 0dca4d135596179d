//! Shared mocks for integration tests: in-memory file and message stores,
//! a scheduler backend with an inspectable live-trigger table, recording
//! sinks, and a scripted job for driving the processor.

#![allow(dead_code)]

use async_trait::async_trait;
use gapfill_core::adapters::{
    AdapterError, AdapterResult, Attachment, FileEntry, FileStoreAdapter, Folder, Message,
    MessageStoreAdapter,
};
use gapfill_core::engine::{JobDescriptor, UnitReport};
use gapfill_core::error::Result;
use gapfill_core::notifications::NotificationSink;
use gapfill_core::report::{Report, ReportSink};
use gapfill_core::retry::UnitError;
use gapfill_core::scheduler::{SchedulerBackend, TriggerHandle};
use gapfill_core::state::{Checkpoint, WorkUnit};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A file saved through the mock file store
#[derive(Debug, Clone, PartialEq)]
pub struct SavedFile {
    pub folder_id: String,
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct MockFileStoreState {
    /// parent folder id -> child folders
    folders: BTreeMap<String, Vec<Folder>>,
    /// folder id -> files
    files: BTreeMap<String, Vec<FileEntry>>,
    saved: Vec<SavedFile>,
    /// folder id -> one-shot faults raised on the next listing
    list_faults: BTreeMap<String, VecDeque<AdapterError>>,
    next_id: u64,
}

/// In-memory hierarchical file store with configurable fault injection.
#[derive(Clone, Default)]
pub struct MockFileStore {
    state: Arc<Mutex<MockFileStoreState>>,
}

impl MockFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a child folder under `parent_id`
    pub fn with_folder(
        self,
        parent_id: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.state
            .lock()
            .unwrap()
            .folders
            .entry(parent_id.into())
            .or_default()
            .push(Folder {
                id: id.into(),
                name: name.into(),
            });
        self
    }

    /// Seed a file inside `folder_id`
    pub fn with_file(
        self,
        folder_id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        self.state
            .lock()
            .unwrap()
            .files
            .entry(folder_id.into())
            .or_default()
            .push(FileEntry {
                name: name.into(),
                url: url.into(),
            });
        self
    }

    /// Raise `error` on the next listing call against `folder_id`
    pub fn with_list_fault(self, folder_id: impl Into<String>, error: AdapterError) -> Self {
        self.state
            .lock()
            .unwrap()
            .list_faults
            .entry(folder_id.into())
            .or_default()
            .push_back(error);
        self
    }

    pub fn saved(&self) -> Vec<SavedFile> {
        self.state.lock().unwrap().saved.clone()
    }

    fn take_fault(&self, folder_id: &str) -> Option<AdapterError> {
        self.state
            .lock()
            .unwrap()
            .list_faults
            .get_mut(folder_id)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl FileStoreAdapter for MockFileStore {
    async fn list_child_folders(&self, folder_id: &str) -> AdapterResult<Vec<Folder>> {
        if let Some(fault) = self.take_fault(folder_id) {
            return Err(fault);
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .folders
            .get(folder_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_files(&self, folder_id: &str) -> AdapterResult<Vec<FileEntry>> {
        if let Some(fault) = self.take_fault(folder_id) {
            return Err(fault);
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .files
            .get(folder_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_attachment(
        &self,
        folder_id: &str,
        name: &str,
        bytes: &[u8],
    ) -> AdapterResult<()> {
        self.state.lock().unwrap().saved.push(SavedFile {
            folder_id: folder_id.to_string(),
            name: name.to_string(),
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    async fn ensure_child_folder(&self, parent_id: &str, name: &str) -> AdapterResult<Folder> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .folders
            .get(parent_id)
            .and_then(|children| children.iter().find(|f| f.name == name))
        {
            return Ok(existing.clone());
        }
        state.next_id += 1;
        let folder = Folder {
            id: format!("gen-{}", state.next_id),
            name: name.to_string(),
        };
        state
            .folders
            .entry(parent_id.to_string())
            .or_default()
            .push(folder.clone());
        Ok(folder)
    }
}

#[derive(Debug, Default)]
struct MockMessageStoreState {
    /// query -> search results
    results: BTreeMap<String, Vec<Message>>,
    /// query -> one-shot faults raised before returning results
    faults: BTreeMap<String, VecDeque<AdapterError>>,
    searches: Vec<String>,
}

/// In-memory message store keyed by exact query string.
#[derive(Clone, Default)]
pub struct MockMessageStore {
    state: Arc<Mutex<MockMessageStoreState>>,
}

impl MockMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(self, query: impl Into<String>, messages: Vec<Message>) -> Self {
        self.state
            .lock()
            .unwrap()
            .results
            .insert(query.into(), messages);
        self
    }

    /// Raise `error` on the next search for `query`
    pub fn with_fault(self, query: impl Into<String>, error: AdapterError) -> Self {
        self.state
            .lock()
            .unwrap()
            .faults
            .entry(query.into())
            .or_default()
            .push_back(error);
        self
    }

    pub fn searches(&self) -> Vec<String> {
        self.state.lock().unwrap().searches.clone()
    }
}

#[async_trait]
impl MessageStoreAdapter for MockMessageStore {
    async fn search(&self, query: &str) -> AdapterResult<Vec<Message>> {
        let mut state = self.state.lock().unwrap();
        state.searches.push(query.to_string());
        if let Some(fault) = state.faults.get_mut(query).and_then(VecDeque::pop_front) {
            return Err(fault);
        }
        Ok(state.results.get(query).cloned().unwrap_or_default())
    }
}

/// Build a message with CSV attachments named after the given files.
pub fn message_with_attachments(id: &str, attachment_names: &[&str]) -> Message {
    Message {
        id: id.to_string(),
        subject: format!("Daily report bundle {id}"),
        attachments: attachment_names
            .iter()
            .map(|name| Attachment {
                name: (*name).to_string(),
                bytes: b"payload".to_vec(),
            })
            .collect(),
    }
}

#[derive(Debug, Default)]
struct MockSchedulerState {
    /// trigger id -> entry point
    live: BTreeMap<String, String>,
    /// every one-shot created: (entry point, delay)
    created: Vec<(String, Duration)>,
    daily_created: Vec<(String, u32, u32)>,
    deleted: Vec<String>,
    next_id: u64,
}

/// Scheduler backend with an inspectable live table. Triggers never fire on
/// their own; tests drive re-invocation by calling `run` again.
#[derive(Clone, Default)]
pub struct MockSchedulerBackend {
    state: Arc<Mutex<MockSchedulerState>>,
}

impl MockSchedulerBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }

    pub fn created(&self) -> Vec<(String, Duration)> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Simulate the trigger being removed outside the scheduler's control
    pub fn remove_externally(&self, trigger_id: &str) {
        self.state.lock().unwrap().live.remove(trigger_id);
    }

    pub fn last_delay(&self) -> Option<Duration> {
        self.state
            .lock()
            .unwrap()
            .created
            .last()
            .map(|(_, delay)| *delay)
    }
}

#[async_trait]
impl SchedulerBackend for MockSchedulerBackend {
    async fn create_one_shot(&self, entry_point: &str, delay: Duration) -> Result<TriggerHandle> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("trigger-{}", state.next_id);
        state.live.insert(id.clone(), entry_point.to_string());
        state.created.push((entry_point.to_string(), delay));
        Ok(TriggerHandle::new(id))
    }

    async fn create_daily(
        &self,
        entry_point: &str,
        hour: u32,
        minute: u32,
    ) -> Result<TriggerHandle> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("daily-{}", state.next_id);
        state.live.insert(id.clone(), entry_point.to_string());
        state
            .daily_created
            .push((entry_point.to_string(), hour, minute));
        Ok(TriggerHandle::new(id))
    }

    async fn list_live(&self) -> Result<Vec<TriggerHandle>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .live
            .keys()
            .map(TriggerHandle::new)
            .collect())
    }

    async fn delete(&self, handle: &TriggerHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.live.remove(&handle.id);
        state.deleted.push(handle.id.clone());
        Ok(())
    }
}

/// Report sink that records every published report.
#[derive(Clone, Default)]
pub struct RecordingReportSink {
    reports: Arc<Mutex<Vec<Report>>>,
}

impl RecordingReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportSink for RecordingReportSink {
    async fn publish(&self, report: &Report) -> Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

/// Notification sink that records deliveries and can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingNotificationSink {
    delivered: Arc<Mutex<Vec<(String, String)>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<(String, String)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock().unwrap() = failing;
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn deliver(&self, subject: &str, body: &str) -> Result<()> {
        if *self.fail.lock().unwrap() {
            return Err(gapfill_core::GapfillError::Validation(
                "notification delivery refused".to_string(),
            ));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}

/// Payload for the scripted job: the keys committed by successful units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptedPayload {
    pub committed_keys: Vec<String>,
}

#[derive(Default)]
struct ScriptedJobState {
    /// unit key -> scripted failures, consumed one per attempt
    failures: BTreeMap<String, VecDeque<UnitError>>,
    /// every attempt, including retries
    attempts: Vec<String>,
    completions: u32,
    fail_on_complete: bool,
}

/// Job whose queue and per-unit outcomes are scripted up front. Units
/// succeed with a `processed` counter unless a failure is scripted.
#[derive(Clone)]
pub struct ScriptedJob {
    name: String,
    keys: Vec<String>,
    state: Arc<Mutex<ScriptedJobState>>,
}

impl ScriptedJob {
    pub fn new(name: impl Into<String>, keys: &[&str]) -> Self {
        Self {
            name: name.into(),
            keys: keys.iter().map(|k| (*k).to_string()).collect(),
            state: Arc::new(Mutex::new(ScriptedJobState::default())),
        }
    }

    /// Script one failure for `key`; later attempts succeed again
    pub fn fail_once(self, key: impl Into<String>, error: UnitError) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(key.into())
            .or_default()
            .push_back(error);
        self
    }

    pub fn failing_completion(self) -> Self {
        self.state.lock().unwrap().fail_on_complete = true;
        self
    }

    /// Every processing attempt in order, retries included
    pub fn attempts(&self) -> Vec<String> {
        self.state.lock().unwrap().attempts.clone()
    }

    pub fn completions(&self) -> u32 {
        self.state.lock().unwrap().completions
    }
}

#[async_trait]
impl JobDescriptor for ScriptedJob {
    type Payload = ScriptedPayload;

    fn name(&self) -> &str {
        &self.name
    }

    async fn build_queue(&self) -> Result<(Vec<WorkUnit>, Self::Payload)> {
        let queue = self.keys.iter().map(WorkUnit::new).collect();
        Ok((queue, ScriptedPayload::default()))
    }

    async fn process_unit(
        &self,
        unit: &WorkUnit,
        payload: &mut Self::Payload,
    ) -> std::result::Result<UnitReport, UnitError> {
        let mut state = self.state.lock().unwrap();
        state.attempts.push(unit.key.clone());
        if let Some(error) = state
            .failures
            .get_mut(&unit.key)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        drop(state);

        payload.committed_keys.push(unit.key.clone());
        Ok(UnitReport::new().count("processed", 1))
    }

    async fn on_complete(&self, _checkpoint: &Checkpoint<Self::Payload>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.completions += 1;
        if state.fail_on_complete {
            return Err(gapfill_core::GapfillError::Validation(
                "completion callback refused".to_string(),
            ));
        }
        Ok(())
    }
}
