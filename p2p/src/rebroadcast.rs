//! Rebroadcast handler (C6): keeps re-announcing our own unconfirmed
//! transactions so they don't get lost to a churning mempool elsewhere on
//! the network. Grounded on the teacher's `fsm::pingmgr`-style timer-driven
//! submanager shape, generalized to the add/delete-over-channel contract
//! spec §4.6 names.
use std::collections::HashMap;
use std::time::Duration;

use crossbeam_channel as chan;
use glyphchain_wire::{Transaction, Txid};
use log::debug;

use crate::hub::HubMessage;

/// Commands accepted by the rebroadcast handler.
pub enum RebroadcastMessage {
    Add(Transaction),
    Delete(Txid),
    Shutdown,
}

const INITIAL_DELAY: Duration = Duration::from_secs(5 * 60);
/// Upper bound of the random reset window applied after each broadcast
/// round (spec §4.6: "5-minute initial timer then random [0,30) minute
/// reset").
const RESET_WINDOW_MINUTES: u64 = 30;

struct Entry {
    tx: Transaction,
    next_broadcast: std::time::Instant,
}

/// Runs on its own thread; owns the set of pending transactions and decides
/// when to ask the hub to relay each one again.
pub struct Rebroadcaster {
    hub: chan::Sender<HubMessage>,
}

impl Rebroadcaster {
    pub fn new(hub: chan::Sender<HubMessage>) -> Self {
        Rebroadcaster { hub }
    }

    pub fn spawn(self, rx: chan::Receiver<RebroadcastMessage>) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || self.run(rx))
    }

    fn run(self, rx: chan::Receiver<RebroadcastMessage>) {
        let mut pending: HashMap<Txid, Entry> = HashMap::new();
        loop {
            let wakeup = pending.values().map(|e| e.next_broadcast).min();
            let timeout = wakeup
                .map(|at| at.saturating_duration_since(std::time::Instant::now()))
                .unwrap_or(Duration::from_secs(3600));

            match rx.recv_timeout(timeout.max(Duration::from_millis(1))) {
                Ok(RebroadcastMessage::Add(tx)) => {
                    let txid = tx.txid();
                    pending.insert(txid, Entry { tx, next_broadcast: std::time::Instant::now() + INITIAL_DELAY });
                }
                Ok(RebroadcastMessage::Delete(txid)) => {
                    pending.remove(&txid);
                }
                Ok(RebroadcastMessage::Shutdown) => return,
                Err(chan::RecvTimeoutError::Timeout) => {}
                Err(chan::RecvTimeoutError::Disconnected) => return,
            }

            let now = std::time::Instant::now();
            let due: Vec<Txid> = pending.iter().filter(|(_, e)| e.next_broadcast <= now).map(|(id, _)| *id).collect();
            for txid in due {
                if let Some(entry) = pending.get_mut(&txid) {
                    let (reply_tx, _reply_rx) = chan::bounded(0);
                    let _ = self.hub.send(HubMessage::RelayTransaction(entry.tx.clone(), reply_tx));
                    let jitter_minutes = fastrand::u64(0..RESET_WINDOW_MINUTES);
                    entry.next_broadcast = now + Duration::from_secs(jitter_minutes * 60);
                    debug!(target: "p2p", "rebroadcast {txid}: next in {jitter_minutes}m");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_delay_is_five_minutes() {
        assert_eq!(INITIAL_DELAY, Duration::from_secs(300));
    }

    #[test]
    fn reset_window_is_thirty_minutes() {
        assert_eq!(RESET_WINDOW_MINUTES, 30);
    }
}
