//! Post-connect setup
//!
//! Runs once, after the first successful connection of the process: greet
//! the bot's own chat, notify the owner, follow channels, join groups and log
//! the deployment. The tasks run concurrently and fail independently; the
//! outcome is collected in an [`AnnounceReport`].

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::config::{AnnounceConfig, BotConfig};
use crate::error::{Error, Result};
use crate::gateway::{GatewayConnection, OutgoingMessage};

const INVITE_HOST: &str = "chat.whatsapp.com/";

/// Extract a group invite code from a link, or accept a bare code
pub fn invite_code(invite: &str) -> Option<String> {
    let invite = invite.trim();

    let code = match invite.find(INVITE_HOST) {
        Some(start) => {
            let url = Url::parse(&format!("https://{}", &invite[start..])).ok()?;
            url.path_segments()?.next()?.to_string()
        }
        None => invite.to_string(),
    };

    let valid = !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    valid.then_some(code)
}

/// One independent setup step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupTask {
    /// Greeting to the bot's own chat
    GreetSelf,
    /// Greeting to the owner
    NotifyOwner(String),
    FollowChannel(String),
    /// Raw invite link or code
    JoinGroup(String),
    DeploymentLog,
}

impl std::fmt::Display for SetupTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetupTask::GreetSelf => write!(f, "greet-self"),
            SetupTask::NotifyOwner(jid) => write!(f, "notify-owner {}", jid),
            SetupTask::FollowChannel(id) => write!(f, "follow-channel {}", id),
            SetupTask::JoinGroup(invite) => write!(f, "join-group {}", invite),
            SetupTask::DeploymentLog => write!(f, "deployment-log"),
        }
    }
}

/// Aggregated outcome of the setup tasks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnounceReport {
    pub succeeded: Vec<String>,
    /// Task label and error message
    pub failed: Vec<(String, String)>,
}

impl AnnounceReport {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// The one-time announcement
#[derive(Debug, Clone)]
pub struct PostConnectSetup {
    bot: BotConfig,
    announce: AnnounceConfig,
}

impl PostConnectSetup {
    pub fn new(bot: BotConfig, announce: AnnounceConfig) -> Self {
        PostConnectSetup { bot, announce }
    }

    /// Tasks derived from the configuration
    pub fn tasks(&self) -> Vec<SetupTask> {
        let mut tasks = Vec::new();
        if self.announce.greet_self {
            tasks.push(SetupTask::GreetSelf);
        }
        if self.announce.notify_owner {
            if let Some(owner) = self.bot.owner_jid() {
                tasks.push(SetupTask::NotifyOwner(owner));
            }
        }
        tasks.extend(
            self.announce
                .channel_ids
                .iter()
                .map(|id| SetupTask::FollowChannel(id.clone())),
        );
        tasks.extend(
            self.announce
                .group_invites
                .iter()
                .map(|invite| SetupTask::JoinGroup(invite.clone())),
        );
        tasks.push(SetupTask::DeploymentLog);
        tasks
    }

    /// Greeting text
    pub fn greeting(&self) -> String {
        let mut text = format!(
            "╭━ *『* 🚀 {name} CONNECTED! *』*\n\
             ┃ • *🤖 Bot Name:* {name}\n\
             ┃ • *📂 Owner:* {owner}\n\
             ┃ • *⚙️ Mode:* {mode}\n\
             ┃ • *⚒️ Prefix:* {prefix}\n\
             ┃ • *🧩 Version:* {version}\n\
             ╰━━━━━━━━━━━━━━━━━━",
            name = self.bot.name,
            owner = self.bot.owner_name,
            mode = self.bot.mode,
            prefix = self.bot.prefix,
            version = crate::VERSION,
        );
        if let Some(ref link) = self.announce.channel_link {
            text.push_str(&format!("\n🔗 Follow the channel: {}", link));
        }
        text
    }

    fn greeting_message(&self) -> OutgoingMessage {
        match self.announce.greeting_image {
            Some(ref url) => OutgoingMessage::Image {
                url: url.clone(),
                caption: Some(self.greeting()),
            },
            None => OutgoingMessage::text(self.greeting()),
        }
    }

    /// Run every task concurrently and collect the results
    pub async fn run(
        &self,
        connection: Arc<dyn GatewayConnection>,
        self_id: Option<String>,
    ) -> AnnounceReport {
        let tasks = self.tasks();
        let outcomes = join_all(tasks.iter().map(|task| {
            let connection = connection.clone();
            let self_id = self_id.clone();
            async move { (task.to_string(), self.execute(task, connection, self_id).await) }
        }))
        .await;

        let mut report = AnnounceReport::default();
        for (label, outcome) in outcomes {
            match outcome {
                Ok(()) => report.succeeded.push(label),
                Err(e) => {
                    warn!("Setup task {} failed: {}", label, e);
                    report.failed.push((label, e.to_string()));
                }
            }
        }

        info!(
            "Post-connect setup finished: {} succeeded, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        report
    }

    async fn execute(
        &self,
        task: &SetupTask,
        connection: Arc<dyn GatewayConnection>,
        self_id: Option<String>,
    ) -> Result<()> {
        match task {
            SetupTask::GreetSelf => {
                let own = self_id
                    .map(|id| connection.decode_identity(&id))
                    .ok_or_else(|| Error::Gateway("own user id not reported".to_string()))?;
                connection.send_message(&own, self.greeting_message()).await?;
                info!("Greeting sent to {}", own);
            }
            SetupTask::NotifyOwner(owner) => {
                connection.send_message(owner, self.greeting_message()).await?;
                info!("Owner {} notified", owner);
            }
            SetupTask::FollowChannel(id) => {
                connection.follow_channel(id).await?;
                info!("Follow request sent to channel {}", id);
            }
            SetupTask::JoinGroup(invite) => {
                let code = invite_code(invite).ok_or_else(|| {
                    Error::Config(format!("Invalid group invite link: {}", invite))
                })?;
                let group = connection.join_group(&code).await?;
                info!("Joined group {} with invite code {}", group, code);
            }
            SetupTask::DeploymentLog => {
                let tz = self.bot.tz()?;
                info!("{}", deployment_line(Utc::now(), tz));
            }
        }
        Ok(())
    }
}

/// Deployment line with the date in the configured time zone
pub fn deployment_line(now: DateTime<Utc>, tz: Tz) -> String {
    format!(
        "📅 Deployed on {} ({})",
        now.with_timezone(&tz).format("%A, %B %-d, %Y %H:%M"),
        tz
    )
}
