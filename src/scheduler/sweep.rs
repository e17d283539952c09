//! Periodic chat sweep over every guild's monitor channels.

use crate::analysis::{AnalysisResult, ChatContext, ChatSummary, format_local_time};
use crate::conversation::{FetchWindow, most_recent};
use crate::scheduler::TriggerScheduler;
use crate::settings::GuildConfig;
use crate::Result;

use chrono::Utc;
use futures::future::join_all;
use std::time::Duration;

/// Counts from one sweep iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub channels: usize,
    /// Channels with no messages in the window.
    pub skipped: usize,
    pub delivered: usize,
    /// Summaries produced for guilds without a push target.
    pub undelivered: usize,
    pub failed: usize,
}

/// Run the sweep until the scheduler shuts down.
///
/// Sleeps first. The sleep is recomputed every iteration, so a shortened
/// period takes effect on the following cycle.
pub async fn run_sweep_loop(scheduler: TriggerScheduler) {
    let shutdown = scheduler.shutdown_token();
    tracing::info!("sweep loop started");

    loop {
        let interval = scheduler.sweep_interval();
        tracing::debug!(interval_secs = interval.as_secs(), "sweep sleeping");

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let report = scheduler.sweep_once().await;
        tracing::info!(?report, "sweep iteration complete");
    }

    tracing::info!("sweep loop stopped");
}

impl TriggerScheduler {
    /// Minimum monitor period across guilds that have monitor channels, or
    /// the idle interval when none do.
    pub fn sweep_interval(&self) -> Duration {
        self.store()
            .guilds()
            .iter()
            .filter(|(_, config)| !config.monitor_channel_ids.is_empty())
            .map(|(_, config)| config.monitor_period())
            .min()
            .unwrap_or_else(|| self.config().idle_sweep_interval())
    }

    /// One pass over every activated guild's monitor channels.
    ///
    /// Channel failures are logged and counted; they never end the pass.
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for (guild_id, config) in self.store().guilds() {
            if config.monitor_channel_ids.is_empty() {
                continue;
            }
            if !config.activated {
                tracing::debug!(guild_id = %guild_id, "guild not activated, skipping sweep");
                continue;
            }

            let results = join_all(
                config
                    .monitor_channel_ids
                    .iter()
                    .map(|&channel_id| self.sweep_channel(&guild_id, &config, channel_id)),
            )
            .await;

            for (channel_id, result) in config.monitor_channel_ids.iter().zip(results) {
                report.channels += 1;
                match result {
                    Ok(ChannelSweep::Empty) => report.skipped += 1,
                    Ok(ChannelSweep::Delivered) => report.delivered += 1,
                    Ok(ChannelSweep::Undelivered) => report.undelivered += 1,
                    Err(error) => {
                        report.failed += 1;
                        tracing::warn!(%error, guild_id = %guild_id, channel_id, "channel sweep failed");
                    }
                }
            }
        }

        report
    }

    async fn sweep_channel(
        &self,
        guild_id: &str,
        config: &GuildConfig,
        channel_id: u64,
    ) -> Result<ChannelSweep> {
        let Some(summary) = self.summarize_channel(guild_id, config, channel_id).await? else {
            return Ok(ChannelSweep::Empty);
        };

        let Some(target) = config.push_target.as_deref() else {
            tracing::warn!(guild_id, channel_id, "chat summary produced but no push target configured");
            return Ok(ChannelSweep::Undelivered);
        };

        self.inner
            .deps
            .dispatcher
            .deliver(&AnalysisResult::Chat(summary), target)
            .await?;
        Ok(ChannelSweep::Delivered)
    }

    /// Summarize the guild's monitor period of one channel.
    ///
    /// Returns `None` for an empty window. When the window holds more than
    /// `monitor_max_messages`, only the newest ones are analyzed.
    pub async fn summarize_channel(
        &self,
        guild_id: &str,
        config: &GuildConfig,
        channel_id: u64,
    ) -> Result<Option<ChatSummary>> {
        let deps = &self.inner.deps;
        let period = chrono::Duration::from_std(config.monitor_period())
            .unwrap_or(chrono::Duration::hours(i64::from(config.monitor_period_hours)));

        let messages = deps
            .fetcher
            .fetch(
                channel_id,
                FetchWindow::Since {
                    since: Utc::now() - period,
                    ceiling: self.config().sweep_history_ceiling,
                },
            )
            .await?;

        let total_messages = messages.len();
        if total_messages == 0 {
            tracing::debug!(guild_id, channel_id, "no messages in sweep window");
            return Ok(None);
        }

        let analyzed = most_recent(messages, config.monitor_max_messages);
        let context = ChatContext {
            period_hours: config.monitor_period_hours,
            credentials: deps.store.llm_credentials(guild_id)?,
        };
        let mut summary = deps.analyzer.analyze_chat(&analyzed, &context).await?;

        summary.publish_time = format_local_time(Utc::now(), config.timezone_offset);
        summary.monitor_period = config.monitor_period_hours;
        summary.monitored_messages = analyzed.len();
        summary.total_messages = total_messages;

        tracing::info!(
            guild_id,
            channel_id,
            monitored = summary.monitored_messages,
            total = summary.total_messages,
            "chat summary ready"
        );
        Ok(Some(summary))
    }
}

enum ChannelSweep {
    Empty,
    Delivered,
    Undelivered,
}
