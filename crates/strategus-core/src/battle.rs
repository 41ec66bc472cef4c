//! Hand-off to the battle subsystem.
//!
//! The world never resolves fights itself. Once an encounter is committed it
//! is passed to a [`BattleSink`]; the battle subsystem later calls back into
//! the world service to resolve it. A failed hand-off is logged and the
//! encounter stays pending.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::encounter::Encounter;
use crate::error::BattleError;

/// Port to the battle subsystem.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BattleSink: Send + Sync {
    /// Accept a newly committed encounter.
    async fn begin(&self, encounter: Encounter) -> Result<(), BattleError>;
}

/// Forwards encounters into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelBattleSink {
    tx: mpsc::UnboundedSender<Encounter>,
}

impl ChannelBattleSink {
    /// Creates the sink and the receiving end the battle subsystem drains.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Encounter>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl BattleSink for ChannelBattleSink {
    async fn begin(&self, encounter: Encounter) -> Result<(), BattleError> {
        let id = encounter.id();
        self.tx
            .send(encounter)
            .map_err(|_| BattleError::Rejected(id, "battle channel closed".into()))
    }
}

/// Accepts every encounter and only logs it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingBattleSink;

#[async_trait]
impl BattleSink for LoggingBattleSink {
    async fn begin(&self, encounter: Encounter) -> Result<(), BattleError> {
        let [a, b] = encounter.members();
        tracing::info!(
            encounter = %encounter.id(),
            a = %a,
            b = %b,
            tick = encounter.trigger_tick(),
            "battle requested"
        );
        Ok(())
    }
}
