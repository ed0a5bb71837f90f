use std::{collections::HashMap, time::Duration};
use tracing::{debug, error, info, warn};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant},
};
use uuid::Uuid;

use crate::actors::{Actor, ActorType, ControlMessage};

pub type ActorFactory = Box<dyn Fn() -> Box<dyn Actor> + Send + Sync>;

/// Restarts registered actors whose heartbeat goes quiet.
pub struct Supervisor {
    actor_factories: HashMap<ActorType, ActorFactory>,
    // Actors report by instance id; restarts hand out fresh ids.
    instances: HashMap<Uuid, ActorType>,
    pulses: HashMap<ActorType, Instant>,
    handles: HashMap<ActorType, JoinHandle<()>>,
    check_every: Duration,
    timeout: Duration,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            actor_factories: HashMap::new(),
            instances: HashMap::new(),
            pulses: HashMap::new(),
            handles: HashMap::new(),
            check_every: Duration::from_secs(1),
            timeout: Duration::from_secs(3),
        }
    }

    pub fn with_timeouts(mut self, check_every: Duration, timeout: Duration) -> Self {
        self.check_every = check_every;
        self.timeout = timeout;
        self
    }

    pub fn register_actor(&mut self, actor_type: ActorType, factory: ActorFactory) {
        self.actor_factories.insert(actor_type, factory);
    }

    pub async fn start(&mut self) {
        let mut check_interval = time::interval(self.check_every);

        let (supervisor_tx, mut supervisor_rx) = mpsc::channel::<ControlMessage>(512);

        let actors: Vec<ActorType> = self.actor_factories.keys().copied().collect();
        actors.into_iter().for_each(|actor| {
            self.spawn_actor(actor, supervisor_tx.clone());
        });

        loop {
            tokio::select! {
                Some(msg) = supervisor_rx.recv() => self.handle_message(msg),

                _ = check_interval.tick() => {
                    let dead_actors = self.reap_unresponsive();
                    dead_actors.into_iter().for_each(|actor| {
                        self.spawn_actor(actor, supervisor_tx.clone());
                    });
                }
            }
        }
    }

    fn handle_message(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::Heartbeat(id) => match self.instances.get(&id) {
                Some(actor_type) => {
                    self.pulses.insert(*actor_type, Instant::now());
                }
                None => debug!("Ignoring heartbeat from retired actor {}", id),
            },
            ControlMessage::Shutdown(id) => {
                if let Some(actor_type) = self.instances.remove(&id) {
                    warn!("{:?} is shutting down gracefully.", actor_type);
                    self.pulses.remove(&actor_type);
                    if let Some(handle) = self.handles.remove(&actor_type) {
                        handle.abort();
                    }
                }
            }
            ControlMessage::Error(id, error_msg) => {
                if let Some(actor_type) = self.instances.get(&id) {
                    error!("Actor {:?} reported error: {}", actor_type, error_msg);
                }
            }
        }
    }

    /// Aborts actors whose last pulse is older than the timeout and returns their types.
    fn reap_unresponsive(&mut self) -> Vec<ActorType> {
        let Some(dead_timeout) = Instant::now().checked_sub(self.timeout) else {
            return Vec::new();
        };

        let dead_actors: Vec<ActorType> = self
            .pulses
            .iter()
            .filter(|(_, last)| **last < dead_timeout)
            .map(|(actor_type, _)| *actor_type)
            .collect();

        for actor_type in &dead_actors {
            warn!("{:?} is unresponsive!", actor_type);
            if let Some(handle) = self.handles.remove(actor_type) {
                handle.abort();
            }
            self.instances.retain(|_, t| t != actor_type);
        }
        dead_actors
    }

    fn spawn_actor(&mut self, actor_type: ActorType, tx: mpsc::Sender<ControlMessage>) {
        let Some(factory) = self.actor_factories.get(&actor_type) else {
            return;
        };
        let mut new_actor = factory();
        let id = new_actor.id();
        info!("Spawning {:?} as {}", actor_type, id);

        let new_actor_handle = tokio::spawn(async move {
            if let Err(e) = new_actor.run(tx).await {
                error!("Actor {:?} crashed: {}", actor_type, e);
            }
        });
        self.instances.insert(id, actor_type);
        self.handles.insert(actor_type, new_actor_handle);
        self.pulses.insert(actor_type, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Beats once, then stalls without exiting.
    struct Stalling {
        id: Uuid,
    }

    #[async_trait]
    impl Actor for Stalling {
        fn name(&self) -> ActorType {
            ActorType::TradingLoop
        }

        fn id(&self) -> Uuid {
            self.id
        }

        async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
            supervisor_tx.send(ControlMessage::Heartbeat(self.id)).await?;
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn silent_actor_is_restarted_with_a_new_id() {
        let spawned = Arc::new(AtomicUsize::new(0));
        let counter = spawned.clone();

        let mut supervisor = Supervisor::new()
            .with_timeouts(Duration::from_millis(10), Duration::from_millis(40));
        supervisor.register_actor(
            ActorType::TradingLoop,
            Box::new(move || -> Box<dyn Actor> {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::new(Stalling { id: Uuid::new_v4() })
            }),
        );

        let handle = tokio::spawn(async move { supervisor.start().await });
        time::sleep(Duration::from_millis(250)).await;
        handle.abort();

        assert!(spawned.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn stale_heartbeats_are_ignored() {
        let mut supervisor = Supervisor::new();
        supervisor.handle_message(ControlMessage::Heartbeat(Uuid::new_v4()));
        assert!(supervisor.pulses.is_empty());
    }
}
