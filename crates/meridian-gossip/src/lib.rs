// crates/meridian-gossip/src/lib.rs
//
// meridian-gossip: the node service around the consensus engine.
//
// Owns the engine lock and busy flags, admits network events through the
// checkers, seals decided blocks on a single worker, rolls epochs over, and
// exposes the local-emission adapter used by the emitter.

pub mod blockproc;
pub mod config;
pub mod coordinator;
pub mod dag;
pub mod emitter;
pub mod emitter_world;
pub mod engine;
pub mod feed;
pub mod fetcher;
pub mod peers;
pub mod service;
pub mod state;

pub use config::{EmitterConfig, EngineConfig, ServiceConfig};
pub use coordinator::{EngineCoordinator, EngineState, EngineWriteGuard, Inflight, InflightGuard};
pub use dag::DagIndex;
pub use emitter::{Emitter, EmitterHandle};
pub use emitter_world::EmitterWorld;
pub use engine::OrderingEngine;
pub use feed::ServiceFeed;
pub use fetcher::Fetcher;
pub use peers::StaticPeers;
pub use service::{Admission, Service};
pub use state::{ServiceState, ServiceStateMachine};
