//! Trigger scheduling: per-channel deferred ticket analysis, the periodic
//! chat sweep, and manual "analyze now" requests.
//!
//! Each ticket channel is either idle or armed. The first qualifying message
//! arms it and spawns one deferred fire; later messages are absorbed until
//! that fire finishes, whatever its outcome.

pub mod sweep;
pub mod ticket;

#[cfg(test)]
pub(crate) mod test_support;

pub use sweep::{SweepReport, run_sweep_loop};
pub use ticket::{ArmOutcome, IgnoreReason, TicketOutcome};

use crate::analysis::{AnalysisResult, Analyzer};
use crate::config::SchedulerConfig;
use crate::conversation::{ChannelInfo, ConversationFetcher};
use crate::dispatch::Dispatcher;
use crate::hooks::MessageObserver;
use crate::settings::ConfigStore;
use crate::{ChannelCreated, Result};

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A channel armed for deferred analysis. In memory only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAnalysis {
    pub channel_id: u64,
    pub guild_id: String,
    pub armed_at: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
}

/// Collaborators the scheduler drives.
#[derive(Clone)]
pub struct SchedulerDeps {
    pub store: Arc<ConfigStore>,
    pub fetcher: Arc<dyn ConversationFetcher>,
    pub analyzer: Arc<Analyzer>,
    pub dispatcher: Dispatcher,
    pub observer: Arc<dyn MessageObserver>,
}

/// Cheap to clone; all clones share one pending set and task scope.
#[derive(Clone)]
pub struct TriggerScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    deps: SchedulerDeps,
    config: SchedulerConfig,
    started_at: DateTime<Utc>,
    pending: Mutex<HashMap<u64, PendingAnalysis>>,
    channel_categories: Mutex<HashMap<u64, u64>>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for TriggerScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerScheduler")
            .field("started_at", &self.inner.started_at)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

/// Removes a channel's pending entry when the deferred fire ends, including
/// on error or panic, so the channel can be armed again.
struct PendingGuard {
    inner: Arc<SchedulerInner>,
    channel_id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock(&self.inner.pending).remove(&self.channel_id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TriggerScheduler {
    /// Create a scheduler. The startup replay guard is anchored to now.
    pub fn new(deps: SchedulerDeps, config: SchedulerConfig) -> Self {
        Self::with_started_at(deps, config, Utc::now())
    }

    pub fn with_started_at(
        deps: SchedulerDeps,
        config: SchedulerConfig,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                deps,
                config,
                started_at,
                pending: Mutex::new(HashMap::new()),
                channel_categories: Mutex::new(HashMap::new()),
                tasks: TaskTracker::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.inner.deps.store
    }

    /// Remember the category of a newly created channel.
    pub fn on_channel_created(&self, event: ChannelCreated) {
        if let Some(category_id) = event.category_id {
            lock(&self.inner.channel_categories).insert(event.channel_id, category_id);
            tracing::debug!(channel_id = event.channel_id, category_id, "channel category recorded");
        }
    }

    /// Category learned for a channel, if any.
    pub fn known_category(&self, channel_id: u64) -> Option<u64> {
        lock(&self.inner.channel_categories).get(&channel_id).copied()
    }

    pub fn is_pending(&self, channel_id: u64) -> bool {
        lock(&self.inner.pending).contains_key(&channel_id)
    }

    pub fn pending(&self, channel_id: u64) -> Option<PendingAnalysis> {
        lock(&self.inner.pending).get(&channel_id).cloned()
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    /// Stop the sweep loop and close the task scope. Fires still sleeping
    /// are abandoned with the process.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        tracing::info!(pending = self.pending_count(), "scheduler shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Channel metadata, tolerating lookup failures: analysis can still
    /// proceed with a placeholder name and no creation time.
    async fn channel_info_or_placeholder(&self, guild_id: &str, channel_id: u64) -> ChannelInfo {
        match self.inner.deps.fetcher.channel_info(channel_id).await {
            Ok(info) => info,
            Err(error) => {
                tracing::warn!(%error, channel_id, "channel lookup failed, using placeholder metadata");
                ChannelInfo {
                    channel_id,
                    guild_id: guild_id.to_string(),
                    name: channel_id.to_string(),
                    category_id: self.known_category(channel_id),
                    created_at: None,
                }
            }
        }
    }

    /// Run analysis for a channel immediately and describe the outcome.
    ///
    /// Ticket channels get the ticket pipeline, everything else a chat
    /// summary over the guild's monitor period. Errors are returned to the
    /// caller instead of only being logged.
    pub async fn analyze_now(&self, guild_id: &str, channel_id: u64) -> Result<String> {
        let config = self.inner.deps.store.get(guild_id);
        if !config.activated {
            return Ok("This server is not activated yet. An administrator must run /activate first.".into());
        }

        let info = self.channel_info_or_placeholder(guild_id, channel_id).await;
        let category = info.category_id.or_else(|| self.known_category(channel_id));
        tracing::info!(guild_id, channel_id, ?category, "manual analysis requested");

        if category.is_some_and(|category| config.is_ticket_category(category)) {
            let outcome = self.ticket_pipeline(guild_id, info).await?;
            return Ok(outcome.describe());
        }

        let Some(summary) = self.summarize_channel(guild_id, &config, channel_id).await? else {
            return Ok(format!(
                "No messages in <#{channel_id}> during the last {}h.",
                config.monitor_period_hours
            ));
        };

        let result = AnalysisResult::Chat(summary);
        match config.push_target.as_deref() {
            Some(target) => {
                self.inner.deps.dispatcher.deliver(&result, target).await?;
                Ok(format!("Chat summary delivered to {target}."))
            }
            None => Ok(format!(
                "No push target configured; summary not delivered.\n\n{}",
                Dispatcher::format(&result)
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::InboundMessage;
    use crate::settings::Setting;

    #[tokio::test]
    async fn channel_created_events_feed_category_lookup() {
        let harness = Harness::new().await;
        harness.scheduler.on_channel_created(ChannelCreated {
            channel_id: 9,
            category_id: Some(TICKET_CATEGORY),
        });
        harness.scheduler.on_channel_created(ChannelCreated {
            channel_id: 10,
            category_id: None,
        });

        assert_eq!(harness.scheduler.known_category(9), Some(TICKET_CATEGORY));
        assert_eq!(harness.scheduler.known_category(10), None);

        let message = InboundMessage {
            category_id: None,
            ..harness.message(9, "hello")
        };
        assert_eq!(harness.scheduler.on_message(&message), ArmOutcome::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn analyze_now_runs_ticket_pipeline_in_ticket_channels() {
        let harness = Harness::new().await;
        harness.fetcher.add_channel(TICKET_CHANNEL, Some(TICKET_CATEGORY), 1);
        harness.completer.push_reply(VALID_TICKET_REPLY);

        let reply = harness
            .scheduler
            .analyze_now(GUILD, TICKET_CHANNEL)
            .await
            .unwrap();

        assert!(reply.contains("Problem #1"), "{reply}");
        assert_eq!(harness.sink.sent().len(), 1);
        assert!(!harness.scheduler.is_pending(TICKET_CHANNEL));
    }

    #[tokio::test(start_paused = true)]
    async fn analyze_now_summarizes_other_channels() {
        let harness = Harness::new().await;
        harness.fetcher.add_channel(GENERAL_CHANNEL, None, 3);
        harness.completer.push_reply(CHAT_REPLY);

        let reply = harness
            .scheduler
            .analyze_now(GUILD, GENERAL_CHANNEL)
            .await
            .unwrap();

        assert!(reply.contains("Chat summary delivered"), "{reply}");
        let sent = harness.sink.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("(3/3 messages analyzed)"));
    }

    #[tokio::test(start_paused = true)]
    async fn analyze_now_surfaces_delivery_errors() {
        let harness = Harness::new().await;
        harness.fetcher.add_channel(GENERAL_CHANNEL, None, 3);
        harness.completer.push_reply(CHAT_REPLY);
        harness.sink.fail_next_with_transient();

        let result = harness.scheduler.analyze_now(GUILD, GENERAL_CHANNEL).await;
        assert!(matches!(result, Err(crate::Error::Delivery(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn analyze_now_respects_activation() {
        let harness = Harness::new().await;
        harness
            .store
            .set(GUILD, Setting::Activated(false))
            .await
            .unwrap();

        let reply = harness
            .scheduler
            .analyze_now(GUILD, GENERAL_CHANNEL)
            .await
            .unwrap();
        assert!(reply.contains("not activated"));
        assert_eq!(harness.completer.calls(), 0);
    }
}
