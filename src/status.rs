//! Periodic profile status
//!
//! While the process runs, the profile status line is refreshed on a fixed
//! interval with the current local time and a quote for the time of day.
//! At most one loop exists; its handle lives in [`StatusTask`]'s slot.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use rand::seq::IndexedRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::gateway::GatewayConnection;

/// Source of the current connection; `None` while disconnected
pub type ConnectionSource = watch::Receiver<Option<Arc<dyn GatewayConnection>>>;

/// Part of the day, by local hour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPart {
    /// 05:00 - 11:59
    Morning,
    /// 12:00 - 17:59
    Afternoon,
    /// 18:00 - 21:59
    Evening,
    /// 22:00 - 04:59
    Night,
}

impl DayPart {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => DayPart::Morning,
            12..=17 => DayPart::Afternoon,
            18..=21 => DayPart::Evening,
            _ => DayPart::Night,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            DayPart::Morning => "☀️",
            DayPart::Afternoon => "🔆",
            DayPart::Evening => "🌆",
            DayPart::Night => "🌙",
        }
    }

    pub fn quotes(&self) -> &'static [&'static str] {
        match self {
            DayPart::Morning => &MORNING_QUOTES[..],
            DayPart::Afternoon => &AFTERNOON_QUOTES[..],
            DayPart::Evening => &EVENING_QUOTES[..],
            DayPart::Night => &NIGHT_QUOTES[..],
        }
    }
}

const MORNING_QUOTES: [&str; 6] = [
    "Good morning! May your coffee be strong and your day productive. ☕✨",
    "Rise and shine! A new day brings new possibilities. ☀️🚀",
    "Wake up with determination, go to bed with satisfaction. 💪😊",
    "Every sunrise is an invitation to brighten someone's day. 🌅💖",
    "The early bird catches the best vibes. 🐦🌟",
    "Start your day with a grateful heart. 🙏💚",
];

const AFTERNOON_QUOTES: [&str; 6] = [
    "Afternoon delight! Keep pushing towards your goals. 🎯💡",
    "Midday musings: Take a moment to breathe and reset. 😌🍃",
    "Fueling up for the rest of the day's adventures. 🔋🗺️",
    "May your afternoon be as pleasant as your morning. 🌻😊",
    "Keep your eyes on the stars and your feet on the ground. ✨👣",
    "Embrace the present moment. ⏳💖",
];

const EVENING_QUOTES: [&str; 6] = [
    "Evening serenity. Reflect on your day's journey. 🌌🧘",
    "Wind down and recharge. Tomorrow is a new beginning. 🌙✨",
    "The moon reminds us that even in darkness, there is light. 🌕💫",
    "Unwind and let go. The day is done, welcome the night. 🌃🥂",
    "Cherish the quiet moments before the night's embrace. 🕯️💜",
    "Find peace in the fading light. 🌆✨",
];

const NIGHT_QUOTES: [&str; 6] = [
    "Good night! Dream big and rest well. 😴🌟",
    "May your sleep be peaceful and your dreams sweet. 🛌💭",
    "The stars are out, reminding you of infinite possibilities. ✨🔭",
    "Close your eyes and let the tranquility of night wash over you. 🌑😌",
    "Another day complete. Embrace the peace of the night. 🌙💙",
    "Rest, for tomorrow's adventures await. 💤🌍",
];

/// Builds the status line
#[derive(Debug, Clone)]
pub struct StatusComposer {
    bot_name: String,
    tz: Tz,
}

impl StatusComposer {
    pub fn new(bot_name: impl Into<String>, tz: Tz) -> Self {
        StatusComposer {
            bot_name: bot_name.into(),
            tz,
        }
    }

    /// Status line for the current time
    pub fn compose(&self) -> String {
        self.compose_at(Utc::now())
    }

    /// Status line for a given instant
    pub fn compose_at(&self, now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&self.tz);
        let part = DayPart::from_hour(local.hour());
        let quote = part
            .quotes()
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or_default();

        format!(
            "✨|🟢 {} Is Active At 🟢|✨ {} {} | {}",
            self.bot_name,
            local.format("%H:%M:%S"),
            part.emoji(),
            quote
        )
    }
}

/// Owned handle of the running loop
pub struct StatusTaskHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Singleton owner of the status loop
pub struct StatusTask {
    composer: Arc<StatusComposer>,
    interval: Duration,
    shutdown: CancellationToken,
    slot: Mutex<Option<StatusTaskHandle>>,
}

impl StatusTask {
    /// Create a stopped task; the loop ends when `shutdown` is cancelled
    pub fn new(composer: StatusComposer, interval: Duration, shutdown: CancellationToken) -> Self {
        StatusTask {
            composer: Arc::new(composer),
            interval,
            shutdown,
            slot: Mutex::new(None),
        }
    }

    /// Start the loop unless it already runs. Returns whether it was started.
    pub async fn start_once(&self, source: ConnectionSource) -> bool {
        let mut slot = self.slot.lock().await;
        if slot.is_some() {
            debug!("Status loop already running");
            return false;
        }

        let cancel = self.shutdown.child_token();
        let join = tokio::spawn(run_loop(
            self.composer.clone(),
            self.interval,
            source,
            cancel.clone(),
        ));

        *slot = Some(StatusTaskHandle { cancel, join });
        info!("Status loop started (every {:?})", self.interval);
        true
    }

    /// Whether the loop has been started and not stopped
    pub async fn is_running(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Cancel the loop and wait for it to exit
    pub async fn stop(&self) {
        let handle = self.slot.lock().await.take();
        if let Some(handle) = handle {
            handle.cancel.cancel();
            let _ = handle.join.await;
            info!("Status loop stopped");
        }
    }
}

async fn run_loop(
    composer: Arc<StatusComposer>,
    period: Duration,
    source: ConnectionSource,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let connection = source.borrow().clone();
        let Some(connection) = connection else {
            debug!("No open connection, skipping status update");
            continue;
        };

        let text = composer.compose();
        match connection.update_profile_status(&text).await {
            Ok(()) => info!("Status updated to: \"{}\"", text),
            Err(e) => warn!("Failed to update status: {}", e),
        }
    }
}
