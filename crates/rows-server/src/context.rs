//! Shared state handed to every message handler.

use std::sync::Arc;
use std::time::Duration;

use rows_core::{GameEventSink, HeuristicBot, MoveSelector, RoomRegistry};

use crate::websocket::hub::Hub;

/// Everything the dispatcher needs, built once at startup.
#[derive(Clone)]
pub struct GameContext {
    /// Live rooms.
    pub registry: Arc<RoomRegistry>,
    /// Live connections and room membership.
    pub hub: Arc<Hub>,
    /// Bot move selection.
    pub bot: Arc<dyn MoveSelector>,
    /// Finished-game sink, if analytics are enabled.
    pub events: Option<Arc<dyn GameEventSink>>,
    /// Pause before the bot answers.
    pub bot_move_delay: Duration,
}

impl GameContext {
    /// Context with the heuristic bot, no analytics, and no bot delay.
    pub fn new(registry: Arc<RoomRegistry>, hub: Arc<Hub>) -> Self {
        Self {
            registry,
            hub,
            bot: Arc::new(HeuristicBot),
            events: None,
            bot_move_delay: Duration::ZERO,
        }
    }

    /// Replace the bot.
    #[must_use]
    pub fn with_bot(mut self, bot: Arc<dyn MoveSelector>) -> Self {
        self.bot = bot;
        self
    }

    /// Publish finished games to `events`.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn GameEventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Delay bot replies.
    #[must_use]
    pub fn with_bot_move_delay(mut self, delay: Duration) -> Self {
        self.bot_move_delay = delay;
        self
    }
}
