//! Worker orchestrator
//!
//! Discovers bots whose durable status is `running` and drives one
//! GridBotSession per bot. Each bot's tick runs as its own tokio task so a
//! slow venue call for one bot never delays another; within a bot, ticks are
//! strictly serialized (a new tick never starts while the previous one is in
//! flight).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::clients::GatewayFactory;
use crate::config::{GridDefaults, WorkerConfig, WorkerSettings};
use crate::core::session::GridBotSession;
use crate::db::{Bot, BotStatus, Database};
use crate::error::{EngineError, EngineResult};

struct SessionHandle {
    session: Arc<Mutex<GridBotSession>>,
    task: Option<JoinHandle<()>>,
    last_tick: Instant,
}

pub struct WorkerOrchestrator {
    db: Database,
    factory: Arc<dyn GatewayFactory>,
    settings: WorkerSettings,
    defaults: GridDefaults,
    sessions: HashMap<i64, SessionHandle>,
    teardowns: Vec<JoinHandle<()>>,
    bot_filter: Option<i64>,
}

impl WorkerOrchestrator {
    pub fn new(db: Database, factory: Arc<dyn GatewayFactory>, config: &WorkerConfig) -> Self {
        Self {
            db,
            factory,
            settings: config.worker.clone(),
            defaults: config.defaults.clone(),
            sessions: HashMap::new(),
            teardowns: Vec::new(),
            bot_filter: None,
        }
    }

    /// Restrict the orchestrator to a single bot id
    pub fn with_bot_filter(mut self, bot_id: Option<i64>) -> Self {
        self.bot_filter = bot_id;
        self
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Run the scheduling loop until the task is dropped
    pub async fn run(&mut self) {
        info!(
            "Worker started (poll interval {}s, tick floor {}s)",
            self.settings.poll_interval_secs, self.settings.min_tick_secs
        );

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.settings.poll_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.cycle().await;
        }
    }

    /// One scheduling pass. Never propagates a session's failure: every
    /// per-bot unit of work is spawned and contained.
    pub async fn cycle(&mut self) {
        let bots = match Bot::list_running(self.db.connection()) {
            Ok(bots) => bots,
            Err(e) => {
                error!("Could not query running bots: {}", e);
                return;
            }
        };

        let bots: Vec<Bot> = bots
            .into_iter()
            .filter(|bot| match self.bot_filter {
                Some(id) => bot.id == Some(id),
                None => true,
            })
            .collect();

        let running_ids: HashSet<i64> = bots.iter().filter_map(|bot| bot.id).collect();

        // Tear down sessions whose bot is no longer running in durable state
        let stale: Vec<i64> = self
            .sessions
            .keys()
            .copied()
            .filter(|id| !running_ids.contains(id))
            .collect();

        for id in stale {
            if let Some(handle) = self.sessions.remove(&id) {
                info!("Bot #{} no longer running, tearing session down", id);
                let session = handle.session;
                self.teardowns.push(tokio::spawn(async move {
                    // The lock waits out any in-flight tick first
                    let mut session = session.lock().await;
                    if let Err(e) = session.shutdown().await {
                        warn!("Bot #{}: shutdown failed: {}", session.bot_id(), e);
                    }
                }));
            }
        }

        self.teardowns.retain(|task| !task.is_finished());

        for bot in bots {
            let Some(id) = bot.id else { continue };
            let tick_every = self.tick_interval(&bot);

            match self.sessions.get_mut(&id) {
                None => {
                    info!("Discovered running bot #{}, starting session", id);

                    let session = Arc::new(Mutex::new(GridBotSession::new(
                        id,
                        self.db.clone(),
                        Arc::clone(&self.factory),
                        self.defaults.clone(),
                    )));

                    let task_session = Arc::clone(&session);
                    let task = tokio::spawn(async move {
                        let mut session = task_session.lock().await;
                        if let Err(e) = session.initialize().await {
                            error!("Bot #{} initialization failed: {}", session.bot_id(), e);
                        }
                    });

                    self.sessions.insert(
                        id,
                        SessionHandle {
                            session,
                            task: Some(task),
                            last_tick: Instant::now(),
                        },
                    );
                }
                Some(handle) => {
                    let previous_done = handle.task.as_ref().map_or(true, |t| t.is_finished());
                    if previous_done && handle.last_tick.elapsed() >= tick_every {
                        handle.last_tick = Instant::now();

                        let task_session = Arc::clone(&handle.session);
                        handle.task = Some(tokio::spawn(async move {
                            let mut session = task_session.lock().await;
                            if let Err(e) = session.tick().await {
                                warn!("Bot #{} tick failed: {}", session.bot_id(), e);
                            }
                        }));
                    }
                }
            }
        }
    }

    /// Await every in-flight per-bot task (used by one-shot mode and tests)
    pub async fn drain(&mut self) {
        for handle in self.sessions.values_mut() {
            if let Some(task) = handle.task.take() {
                let _ = task.await;
            }
        }

        for task in self.teardowns.drain(..) {
            let _ = task.await;
        }
    }

    fn tick_interval(&self, bot: &Bot) -> Duration {
        Duration::from_secs(bot.interval_secs.max(self.settings.min_tick_secs))
    }
}

/// Bring a bot from `stopped` (or `error`) to `running`. Idempotent: starting
/// a running bot is a no-op. The worker picks the bot up on its next cycle.
pub fn start_bot(db: &Database, bot_id: i64) -> EngineResult<()> {
    let conn = db.connection();

    let bot = Bot::find_by_id(Arc::clone(&conn), bot_id)?
        .ok_or(EngineError::BotNotFound(bot_id))?;

    if bot.status == BotStatus::Running {
        return Ok(());
    }

    Bot::set_status(conn, bot_id, BotStatus::Running)?;
    Ok(())
}

/// Request a graceful stop. Idempotent: stopping a stopped bot is a no-op.
/// The worker observes the status change and runs the Stopping path (cancel
/// pending orders, tear the session down) on its next cycle.
pub fn stop_bot(db: &Database, bot_id: i64) -> EngineResult<()> {
    let conn = db.connection();

    let bot = Bot::find_by_id(Arc::clone(&conn), bot_id)?
        .ok_or(EngineError::BotNotFound(bot_id))?;

    if bot.status == BotStatus::Stopped {
        return Ok(());
    }

    Bot::set_status(conn, bot_id, BotStatus::Stopped)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MarketType;

    #[test]
    fn test_start_stop_idempotent() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();

        let bot = Bot::new(1, "t".to_string(), "BTCUSDT".to_string(), MarketType::Spot);
        let bot_id = bot.insert(db.connection()).unwrap();

        start_bot(&db, bot_id).unwrap();
        start_bot(&db, bot_id).unwrap();
        let loaded = Bot::find_by_id(db.connection(), bot_id).unwrap().unwrap();
        assert_eq!(loaded.status, BotStatus::Running);

        stop_bot(&db, bot_id).unwrap();
        stop_bot(&db, bot_id).unwrap();
        let loaded = Bot::find_by_id(db.connection(), bot_id).unwrap().unwrap();
        assert_eq!(loaded.status, BotStatus::Stopped);
    }

    #[test]
    fn test_start_missing_bot() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();

        assert!(matches!(
            start_bot(&db, 42),
            Err(EngineError::BotNotFound(42))
        ));
    }
}
