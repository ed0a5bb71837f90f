pub mod supervisor;

pub use common::actors::{Actor, ActorType, ControlMessage, HeartbeatGuard};
