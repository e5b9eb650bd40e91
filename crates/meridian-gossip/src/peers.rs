// crates/meridian-gossip/src/peers.rs
//
// Fixed peer view for nodes running without a protocol manager.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use meridian_core::PeerSource;

/// A `PeerSource` whose values are set by hand.
#[derive(Debug)]
pub struct StaticPeers {
    peers: AtomicUsize,
    synced: AtomicBool,
}

impl StaticPeers {
    pub fn new(peers: usize, synced: bool) -> Self {
        Self {
            peers: AtomicUsize::new(peers),
            synced: AtomicBool::new(synced),
        }
    }

    pub fn set_peers(&self, peers: usize) {
        self.peers.store(peers, Ordering::Release);
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::Release);
    }
}

impl PeerSource for StaticPeers {
    fn peers_num(&self) -> usize {
        self.peers.load(Ordering::Acquire)
    }

    fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}
