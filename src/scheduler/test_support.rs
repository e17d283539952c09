//! In-memory collaborators for scheduler tests.

use crate::analysis::Analyzer;
use crate::config::SchedulerConfig;
use crate::conversation::{ChannelInfo, ConversationFetcher, ConversationMessage, FetchWindow};
use crate::dispatch::Dispatcher;
use crate::error::{DeliveryError, FetchError, LlmError};
use crate::hooks::MessageObserver;
use crate::llm::{CompletionRequest, Completer};
use crate::messaging::Messaging;
use crate::scheduler::{SchedulerDeps, TriggerScheduler};
use crate::settings::{ConfigStore, Setting};
use crate::InboundMessage;

use chrono::{TimeZone as _, Utc};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const GUILD: &str = "42";
pub const TICKET_CATEGORY: u64 = 10;
pub const TICKET_CHANNEL: u64 = 700;
pub const GENERAL_CHANNEL: u64 = 500;
pub const PUSH_TARGET: &str = "-1001";

pub const VALID_TICKET_REPLY: &str = r#"{
  "is_valid": true,
  "problem_type": "Bug report",
  "summary": "Export button crashes the app",
  "details": "The user reports that clicking export crashes the application.",
  "user": "U",
  "original": "the export button crashes"
}"#;

pub const CHAT_REPLY: &str = r#"{
  "emotion": "calm",
  "discussion_summary": "Release planning and a few questions about exports.",
  "key_events": "None",
  "suggestion": "Post the changelog."
}"#;

#[derive(Default)]
pub struct MockFetcher {
    channels: Mutex<HashMap<u64, (Option<u64>, Vec<ConversationMessage>)>>,
    fetch_calls: AtomicUsize,
}

impl MockFetcher {
    /// Register a channel holding `count` numbered messages, oldest first.
    pub fn add_channel(&self, channel_id: u64, category_id: Option<u64>, count: usize) {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let messages = (0..count)
            .map(|index| {
                ConversationMessage::new(
                    format!("user{}", index % 3),
                    format!("message {index}"),
                    start + chrono::Duration::seconds(index as i64),
                )
            })
            .collect();
        self.channels
            .lock()
            .unwrap()
            .insert(channel_id, (category_id, messages));
    }

    pub fn add_messages(&self, channel_id: u64, category_id: Option<u64>, messages: Vec<(&str, &str)>) {
        let messages = messages
            .into_iter()
            .map(|(user, content)| ConversationMessage::new(user, content, Utc::now()))
            .collect();
        self.channels
            .lock()
            .unwrap()
            .insert(channel_id, (category_id, messages));
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ConversationFetcher for MockFetcher {
    async fn fetch(
        &self,
        channel_id: u64,
        window: FetchWindow,
    ) -> Result<Vec<ConversationMessage>, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let channels = self.channels.lock().unwrap();
        let (_, messages) = channels
            .get(&channel_id)
            .ok_or(FetchError::ChannelNotFound { channel_id })?;
        let limit = match window {
            FetchWindow::Latest { limit } => limit,
            FetchWindow::Since { ceiling, .. } => ceiling,
        };
        Ok(messages[messages.len().saturating_sub(limit)..].to_vec())
    }

    async fn channel_info(&self, channel_id: u64) -> Result<ChannelInfo, FetchError> {
        let channels = self.channels.lock().unwrap();
        let (category_id, _) = channels
            .get(&channel_id)
            .ok_or(FetchError::ChannelNotFound { channel_id })?;
        Ok(ChannelInfo {
            channel_id,
            guild_id: GUILD.into(),
            name: format!("ticket-{channel_id}"),
            category_id: *category_id,
            created_at: None,
        })
    }
}

#[derive(Default)]
pub struct ScriptedCompleter {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompleter {
    pub fn push_reply(&self, reply: &str) {
        self.replies.lock().unwrap().push_back(reply.to_string());
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_user_prompt(&self) -> Option<String> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|request| request.user_prompt.clone())
    }
}

#[async_trait::async_trait]
impl Completer for ScriptedCompleter {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::EmptyCompletion)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(String, String)>>,
    fail_next: Mutex<Option<DeliveryError>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_next_with_transient(&self) {
        *self.fail_next.lock().unwrap() = Some(DeliveryError::Transient {
            target: PUSH_TARGET.into(),
            message: "connection reset".into(),
        });
    }
}

impl Messaging for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_message(&self, target: &str, text: &str) -> Result<(), DeliveryError> {
        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }
        self.sent
            .lock()
            .unwrap()
            .push((target.to_string(), text.to_string()));
        Ok(())
    }

    async fn health_check(&self) -> crate::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingObserver {
    seen: AtomicUsize,
}

impl CountingObserver {
    pub fn count(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }
}

impl MessageObserver for CountingObserver {
    fn observe(&self, _message: &InboundMessage) {
        self.seen.fetch_add(1, Ordering::SeqCst);
    }
}

/// An activated guild with one ticket category and a push target.
pub struct Harness {
    pub store: Arc<ConfigStore>,
    pub fetcher: Arc<MockFetcher>,
    pub completer: Arc<ScriptedCompleter>,
    pub sink: Arc<RecordingSink>,
    pub observer: Arc<CountingObserver>,
    pub scheduler: TriggerScheduler,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ConfigStore::open(dir.path().join("config.json")).await.unwrap());
        store.set(GUILD, Setting::Activated(true)).await.unwrap();
        store
            .set(
                GUILD,
                Setting::TicketCategories(BTreeSet::from([TICKET_CATEGORY])),
            )
            .await
            .unwrap();
        store
            .set(GUILD, Setting::PushTarget(Some(PUSH_TARGET.into())))
            .await
            .unwrap();

        let fetcher = Arc::new(MockFetcher::default());
        let completer = Arc::new(ScriptedCompleter::default());
        let sink = Arc::new(RecordingSink::default());
        let observer = Arc::new(CountingObserver::default());

        let deps = SchedulerDeps {
            store: store.clone(),
            fetcher: fetcher.clone(),
            analyzer: Arc::new(Analyzer::new(completer.clone()).unwrap()),
            dispatcher: Dispatcher::new(sink.clone()),
            observer: observer.clone(),
        };
        let scheduler = TriggerScheduler::with_started_at(
            deps,
            SchedulerConfig::default(),
            Utc::now() - chrono::Duration::seconds(60),
        );

        Self {
            store,
            fetcher,
            completer,
            sink,
            observer,
            scheduler,
            _dir: dir,
        }
    }

    /// A fresh message from user `U` in the test guild.
    pub fn message(&self, channel_id: u64, content: &str) -> InboundMessage {
        InboundMessage {
            channel_id,
            guild_id: Some(GUILD.into()),
            category_id: (channel_id == TICKET_CHANNEL).then_some(TICKET_CATEGORY),
            author: "U".into(),
            content: content.into(),
            created_at: Utc::now(),
            from_self: false,
        }
    }

    /// Let paused time run until the channel's deferred fire has finished.
    pub async fn wait_until_idle(&self, channel_id: u64) {
        for _ in 0..1_000 {
            if !self.scheduler.is_pending(channel_id) {
                return;
            }
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        panic!("channel {channel_id} never returned to idle");
    }
}
