// crates/meridian-gossip/src/feed.rs
//
// Broadcast channels published by the service.
//
// The transport subscribes to emitted events to gossip them; RPC and tests
// subscribe to sealed blocks and epoch changes. Publishing never blocks:
// slow subscribers lag and skip, they do not stall admission.

use std::sync::Arc;

use tokio::sync::broadcast;

use meridian_core::{Block, Epoch, Event};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ServiceFeed {
    emitted: broadcast::Sender<Arc<Event>>,
    blocks: broadcast::Sender<Block>,
    epochs: broadcast::Sender<Epoch>,
}

impl ServiceFeed {
    pub fn new(capacity: usize) -> Self {
        let (emitted, _) = broadcast::channel(capacity);
        let (blocks, _) = broadcast::channel(capacity);
        let (epochs, _) = broadcast::channel(capacity);
        Self {
            emitted,
            blocks,
            epochs,
        }
    }

    /// Self events ready for broadcast to peers.
    pub fn subscribe_emitted(&self) -> broadcast::Receiver<Arc<Event>> {
        self.emitted.subscribe()
    }

    pub fn subscribe_blocks(&self) -> broadcast::Receiver<Block> {
        self.blocks.subscribe()
    }

    pub fn subscribe_epochs(&self) -> broadcast::Receiver<Epoch> {
        self.epochs.subscribe()
    }

    pub fn publish_emitted(&self, event: Arc<Event>) {
        if self.emitted.send(event).is_err() {
            tracing::trace!("No subscribers for emitted events");
        }
    }

    pub fn publish_block(&self, block: Block) {
        let _ = self.blocks.send(block);
    }

    pub fn publish_epoch(&self, epoch: Epoch) {
        let _ = self.epochs.send(epoch);
    }
}

impl Default for ServiceFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
