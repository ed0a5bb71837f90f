use async_trait::async_trait;
use teloxide::prelude::*;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use uuid::Uuid;

use common::actors::{Actor, ActorType, ControlMessage, HeartbeatGuard};
use common::config::TelegramConfig;

/// Forwards trade-log lines to a Telegram chat.
pub struct TelegramService {
    id: Uuid,
    bot: Bot,
    chat_id: ChatId,
    rx: broadcast::Receiver<String>,
}

#[async_trait]
impl Actor for TelegramService {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> ActorType {
        ActorType::Notifier
    }

    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
        let _heartbeat = HeartbeatGuard::new(self.spawn_heartbeat(supervisor_tx.clone()));
        info!("Starting Telegram Notification Service");

        loop {
            match self.rx.recv().await {
                Ok(msg) => {
                    // A failed send is reported, never fatal
                    if let Err(e) = self.bot.send_message(self.chat_id, msg).await {
                        error!("Failed to send Telegram message: {}", e);
                        let _ = supervisor_tx.try_send(ControlMessage::Error(
                            self.id,
                            format!("{:?}: send failed: {}", self.name(), e),
                        ));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Telegram service lagged behind. Missed {} messages.", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Telegram notification channel closed. Stopping service.");
                    supervisor_tx.try_send(ControlMessage::Shutdown(self.id))?;
                    return Ok(());
                }
            }
        }
    }
}

impl TelegramService {
    pub fn new(config: &TelegramConfig, rx: broadcast::Receiver<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            bot: Bot::new(&config.token),
            chat_id: ChatId(config.chat_id),
            rx,
        }
    }
}
