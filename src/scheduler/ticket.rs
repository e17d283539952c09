//! Ticket capture: arming on inbound messages and the deferred fire.

use crate::analysis::{AnalysisResult, TicketContext, TicketProblem};
use crate::conversation::{ChannelInfo, FetchWindow};
use crate::scheduler::{PendingAnalysis, PendingGuard, TriggerScheduler, lock};
use crate::{InboundMessage, Result};

use chrono::Utc;

/// What `on_message` did with an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// The channel was idle and is now armed.
    Armed,
    /// The channel was already armed; nothing new was scheduled.
    Absorbed,
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    SelfAuthored,
    /// Timestamped before this process started (gateway replay).
    BeforeStartup,
    NoGuild,
    NotActivated,
    NotTicketChannel,
}

/// Terminal state of one ticket analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketOutcome {
    Delivered(TicketProblem),
    /// The model found no actionable problem.
    Discarded,
    /// Valid problem, but the guild has nowhere to send it.
    NoTarget(TicketProblem),
}

impl TicketOutcome {
    /// Reply text for a manual trigger.
    pub fn describe(&self) -> String {
        match self {
            TicketOutcome::Delivered(problem) => format!(
                "Problem #{} ({}) delivered: {}",
                problem.id, problem.problem_type, problem.summary
            ),
            TicketOutcome::Discarded => "No issue found in this ticket.".into(),
            TicketOutcome::NoTarget(problem) => format!(
                "Found a problem ({}: {}) but no push target is configured.",
                problem.problem_type, problem.summary
            ),
        }
    }
}

impl TriggerScheduler {
    /// Handle one inbound message: arm, absorb, or ignore.
    ///
    /// Check-then-arm happens under a single lock, so concurrent first
    /// messages on an idle channel arm it exactly once.
    pub fn on_message(&self, message: &InboundMessage) -> ArmOutcome {
        let outcome = self.classify(message);
        if let ArmOutcome::Ignored(reason) = outcome {
            tracing::trace!(channel_id = message.channel_id, ?reason, "message ignored");
        }
        outcome
    }

    fn classify(&self, message: &InboundMessage) -> ArmOutcome {
        if message.from_self {
            return ArmOutcome::Ignored(IgnoreReason::SelfAuthored);
        }
        if message.created_at < self.inner.started_at {
            return ArmOutcome::Ignored(IgnoreReason::BeforeStartup);
        }
        let Some(guild_id) = message.guild_id.as_deref() else {
            return ArmOutcome::Ignored(IgnoreReason::NoGuild);
        };

        let config = self.inner.deps.store.get(guild_id);
        if !config.activated {
            return ArmOutcome::Ignored(IgnoreReason::NotActivated);
        }

        let category = message
            .category_id
            .or_else(|| self.known_category(message.channel_id));
        if !category.is_some_and(|category| config.is_ticket_category(category)) {
            return ArmOutcome::Ignored(IgnoreReason::NotTicketChannel);
        }

        self.inner.deps.observer.observe(message);

        let delay = self.inner.config.ticket_delay();
        let pending = {
            let mut pending = lock(&self.inner.pending);
            if pending.contains_key(&message.channel_id) {
                return ArmOutcome::Absorbed;
            }
            let armed_at = Utc::now();
            let entry = PendingAnalysis {
                channel_id: message.channel_id,
                guild_id: guild_id.to_string(),
                armed_at,
                fire_at: armed_at
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero()),
            };
            pending.insert(message.channel_id, entry.clone());
            entry
        };

        tracing::info!(
            guild_id,
            channel_id = message.channel_id,
            fire_at = %pending.fire_at,
            "ticket channel armed"
        );
        self.spawn_fire(pending);
        ArmOutcome::Armed
    }

    fn spawn_fire(&self, pending: PendingAnalysis) {
        let scheduler = self.clone();
        let guard = PendingGuard {
            inner: self.inner.clone(),
            channel_id: pending.channel_id,
        };
        let delay = self.inner.config.ticket_delay();

        self.inner.tasks.spawn(async move {
            let _guard = guard;
            tokio::time::sleep(delay).await;

            match scheduler
                .run_ticket_analysis(&pending.guild_id, pending.channel_id)
                .await
            {
                Ok(outcome) => tracing::debug!(
                    channel_id = pending.channel_id,
                    ?outcome,
                    "deferred ticket analysis finished"
                ),
                Err(error) => tracing::error!(
                    %error,
                    guild_id = %pending.guild_id,
                    channel_id = pending.channel_id,
                    "deferred ticket analysis failed"
                ),
            }
        });
    }

    /// Fetch, analyze, and deliver one ticket channel.
    pub async fn run_ticket_analysis(&self, guild_id: &str, channel_id: u64) -> Result<TicketOutcome> {
        let info = self.channel_info_or_placeholder(guild_id, channel_id).await;
        self.ticket_pipeline(guild_id, info).await
    }

    pub(crate) async fn ticket_pipeline(&self, guild_id: &str, info: ChannelInfo) -> Result<TicketOutcome> {
        let deps = &self.inner.deps;
        let config = deps.store.get(guild_id);

        let conversation = deps
            .fetcher
            .fetch(
                info.channel_id,
                FetchWindow::Latest {
                    limit: self.inner.config.ticket_history_limit,
                },
            )
            .await?;

        let context = TicketContext {
            guild_id: guild_id.to_string(),
            channel_id: info.channel_id,
            channel_name: info.name,
            created_at: info.created_at,
            timezone_offset: config.timezone_offset,
            credentials: deps.store.llm_credentials(guild_id)?,
        };
        let mut problem = deps.analyzer.analyze_ticket(&conversation, &context).await?;

        if !problem.is_valid {
            tracing::info!(guild_id, channel_id = info.channel_id, "no issue found, result discarded");
            return Ok(TicketOutcome::Discarded);
        }

        let Some(target) = config.push_target.as_deref() else {
            tracing::warn!(guild_id, channel_id = info.channel_id, "valid problem but no push target configured");
            return Ok(TicketOutcome::NoTarget(problem));
        };

        problem.id = deps.store.next_problem_id().await?;
        deps.dispatcher
            .deliver(&AnalysisResult::Ticket(problem.clone()), target)
            .await?;

        tracing::info!(guild_id, channel_id = info.channel_id, problem_id = problem.id, "problem delivered");
        Ok(TicketOutcome::Delivered(problem))
    }
}

#[cfg(test)]
mod tests {
    use crate::scheduler::test_support::*;
    use crate::scheduler::{ArmOutcome, IgnoreReason, TicketOutcome};
    use crate::InboundMessage;
    use crate::settings::Setting;

    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn burst_of_messages_arms_once_and_fires_once() {
        let harness = Harness::new().await;
        harness.fetcher.add_channel(TICKET_CHANNEL, Some(TICKET_CATEGORY), 1);
        harness.completer.push_reply(VALID_TICKET_REPLY);

        assert_eq!(
            harness.scheduler.on_message(&harness.message(TICKET_CHANNEL, "first")),
            ArmOutcome::Armed
        );
        for text in ["second", "third", "fourth"] {
            assert_eq!(
                harness.scheduler.on_message(&harness.message(TICKET_CHANNEL, text)),
                ArmOutcome::Absorbed
            );
        }
        assert_eq!(harness.scheduler.pending_count(), 1);
        assert_eq!(harness.observer.count(), 4);

        harness.wait_until_idle(TICKET_CHANNEL).await;

        assert_eq!(harness.completer.calls(), 1);
        assert_eq!(harness.fetcher.fetch_calls(), 1);
        assert_eq!(harness.sink.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fire_waits_for_the_full_delay() {
        let harness = Harness::new().await;
        harness.fetcher.add_channel(TICKET_CHANNEL, Some(TICKET_CATEGORY), 1);
        harness.completer.push_reply(VALID_TICKET_REPLY);

        harness.scheduler.on_message(&harness.message(TICKET_CHANNEL, "help"));
        let pending = harness.scheduler.pending(TICKET_CHANNEL).unwrap();
        assert_eq!(pending.fire_at - pending.armed_at, chrono::Duration::seconds(3600));

        tokio::time::sleep(Duration::from_secs(3599)).await;
        assert!(harness.scheduler.is_pending(TICKET_CHANNEL));
        assert_eq!(harness.completer.calls(), 0);

        harness.wait_until_idle(TICKET_CHANNEL).await;
        assert_eq!(harness.completer.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ticket_capture_delivers_one_formatted_problem() {
        let harness = Harness::new().await;
        harness.fetcher.add_messages(
            TICKET_CHANNEL,
            Some(TICKET_CATEGORY),
            vec![("U", "the export button crashes")],
        );
        harness.completer.push_reply(VALID_TICKET_REPLY);

        harness
            .scheduler
            .on_message(&harness.message(TICKET_CHANNEL, "the export button crashes"));
        harness.wait_until_idle(TICKET_CHANNEL).await;

        let prompt = harness.completer.last_user_prompt().unwrap();
        assert!(prompt.contains("U: the export button crashes"));

        let sent = harness.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, PUSH_TARGET);
        assert!(sent[0].1.starts_with("**Problem #1**"));
        assert!(sent[0].1.contains("**Type**: Bug report"));
        assert!(sent[0].1.contains("the export button crashes"));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_ticket_is_discarded_and_rearmable() {
        let harness = Harness::new().await;
        harness.fetcher.add_channel(TICKET_CHANNEL, Some(TICKET_CATEGORY), 1);
        harness.completer.push_reply(r#"{"is_valid": false}"#);

        harness.scheduler.on_message(&harness.message(TICKET_CHANNEL, "hi"));
        harness.wait_until_idle(TICKET_CHANNEL).await;

        assert_eq!(harness.completer.calls(), 1);
        assert!(harness.sink.sent().is_empty());
        assert_eq!(harness.store.snapshot().problem_id_counter, 0);

        assert_eq!(
            harness.scheduler.on_message(&harness.message(TICKET_CHANNEL, "still there?")),
            ArmOutcome::Armed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failures_still_return_the_channel_to_idle() {
        let harness = Harness::new().await;
        // No channel registered: the fetch fails.
        harness.scheduler.on_message(&harness.message(TICKET_CHANNEL, "hi"));
        harness.wait_until_idle(TICKET_CHANNEL).await;

        assert_eq!(harness.completer.calls(), 0);
        assert!(harness.sink.sent().is_empty());
        assert_eq!(
            harness.scheduler.on_message(&harness.message(TICKET_CHANNEL, "again")),
            ArmOutcome::Armed
        );
    }

    #[tokio::test]
    async fn messages_from_before_startup_never_arm() {
        let harness = Harness::new().await;
        for seconds_before in [1, 60, 86_400] {
            let message = InboundMessage {
                created_at: harness.scheduler.started_at() - chrono::Duration::seconds(seconds_before),
                ..harness.message(TICKET_CHANNEL, "replayed")
            };
            assert_eq!(
                harness.scheduler.on_message(&message),
                ArmOutcome::Ignored(IgnoreReason::BeforeStartup)
            );
        }
        assert_eq!(harness.scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn messages_within_the_startup_second_still_arm() {
        let harness = Harness::new().await;
        let message = InboundMessage {
            created_at: harness.scheduler.started_at() + chrono::Duration::milliseconds(400),
            ..harness.message(TICKET_CHANNEL, "just after startup")
        };
        assert_eq!(harness.scheduler.on_message(&message), ArmOutcome::Armed);
    }

    #[tokio::test]
    async fn ignore_reasons() {
        let harness = Harness::new().await;

        let own = InboundMessage {
            from_self: true,
            ..harness.message(TICKET_CHANNEL, "bot reply")
        };
        assert_eq!(
            harness.scheduler.on_message(&own),
            ArmOutcome::Ignored(IgnoreReason::SelfAuthored)
        );

        let direct = InboundMessage {
            guild_id: None,
            ..harness.message(TICKET_CHANNEL, "dm")
        };
        assert_eq!(
            harness.scheduler.on_message(&direct),
            ArmOutcome::Ignored(IgnoreReason::NoGuild)
        );

        let general = InboundMessage {
            category_id: Some(999),
            ..harness.message(GENERAL_CHANNEL, "chatting")
        };
        assert_eq!(
            harness.scheduler.on_message(&general),
            ArmOutcome::Ignored(IgnoreReason::NotTicketChannel)
        );

        harness
            .store
            .set(GUILD, Setting::Activated(false))
            .await
            .unwrap();
        assert_eq!(
            harness.scheduler.on_message(&harness.message(TICKET_CHANNEL, "help")),
            ArmOutcome::Ignored(IgnoreReason::NotActivated)
        );
        assert_eq!(harness.observer.count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_messages_arm_exactly_once() {
        let harness = Harness::new().await;
        let mut handles = Vec::new();
        for index in 0..16 {
            let scheduler = harness.scheduler.clone();
            let message = harness.message(TICKET_CHANNEL, &format!("message {index}"));
            handles.push(tokio::spawn(async move { scheduler.on_message(&message) }));
        }

        let mut armed = 0;
        for handle in handles {
            if handle.await.unwrap() == ArmOutcome::Armed {
                armed += 1;
            }
        }
        assert_eq!(armed, 1);
        assert_eq!(harness.scheduler.pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_push_target_keeps_the_counter() {
        let harness = Harness::new().await;
        harness
            .store
            .set(GUILD, crate::settings::Setting::PushTarget(None))
            .await
            .unwrap();
        harness.fetcher.add_channel(TICKET_CHANNEL, Some(TICKET_CATEGORY), 1);
        harness.completer.push_reply(VALID_TICKET_REPLY);

        let outcome = harness
            .scheduler
            .run_ticket_analysis(GUILD, TICKET_CHANNEL)
            .await
            .unwrap();

        assert!(matches!(outcome, TicketOutcome::NoTarget(_)));
        assert_eq!(harness.store.snapshot().problem_id_counter, 0);
        assert!(harness.sink.sent().is_empty());
    }
}
