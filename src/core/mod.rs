// Core trading engine modules

pub mod grid;
pub mod risk;
pub mod session;
pub mod worker;

pub use grid::{compute_levels, derive_bounds, GridLevel, Progression};
pub use risk::{RiskGuard, RiskVerdict};
pub use session::{GridBotSession, SessionState, StatusReport};
pub use worker::{start_bot, stop_bot, WorkerOrchestrator};
