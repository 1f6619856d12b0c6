// BitBox HWW Driver
// Written in 2026 by
//   The bbhww developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the CC0 Public Domain Dedication
// along with this software.
// If not, see <http://creativecommons.org/publicdomain/zero/1.0/>.
//

//! # Events
//!
//! Sessions report asynchronous progress through a single callback slot.
//! Handlers run on whatever thread fired the event, so they must not block
//! and must not call back into the session's atomic API. Callers who need
//! to do real work in response should use [`EventSlot::channel`], which
//! hands events over a bounded queue and drops the newest event when the
//! queue is full.
//!

use std::fmt;
use std::sync::{mpsc, Arc, RwLock};

use crate::{BootloaderStatus, Status};

/// Something the application should know about
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// The session status changed
    StatusChanged(Status),
    /// A new channel hash is available for comparison with the device screen
    ChannelHashChanged,
    /// The attestation check finished with the given result
    AttestationCheckDone(bool),
    /// The firmware upgrade made progress, failed or finished
    BootloaderStatusChanged(BootloaderStatus),
    /// A seeded keystore became available
    KeystoreAvailable,
    /// The keystore was wiped or the device was reset
    KeystoreGone,
    /// Batched signing finished a round
    SignProgress {
        /// Rounds finished so far
        step: usize,
        /// Total number of rounds
        steps: usize,
    },
    /// Mobile pairing: the app scanned the code and key exchange started
    PairingStarted,
    /// Mobile pairing finished successfully
    PairingSuccess,
    /// Mobile pairing failed
    PairingError,
    /// Mobile pairing timed out waiting on the app
    PairingTimedout,
    /// The user aborted mobile pairing on the app or device
    PairingAborted,
    /// The app never scanned the pairing code
    PairingScanningFailed,
    /// The relay server could not be reached while pairing
    PairingPullMessageFailed,
    /// An existing mobile pairing was removed
    PairingRemoved,
    /// The paired app answered a ping
    MobileConnected,
    /// The paired app stopped answering pings
    MobileDisconnected,
}

type Callback = Arc<dyn Fn(Event) + Send + Sync>;

/// A slot holding the session's event handler
#[derive(Clone, Default)]
pub struct EventSlot {
    callback: Arc<RwLock<Option<Callback>>>,
}

impl fmt::Debug for EventSlot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("EventSlot")
    }
}

impl EventSlot {
    /// Creates an empty slot which discards events
    pub fn new() -> Self {
        Default::default()
    }

    /// Installs a handler, replacing any previous one
    pub fn set<F: Fn(Event) + Send + Sync + 'static>(&self, f: F) {
        let mut slot = match self.callback.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(Arc::new(f));
    }

    /// Installs a handler which queues events on a bounded channel
    ///
    /// When the receiver falls behind by `capacity` events, further events
    /// are dropped until it catches up.
    pub fn channel(&self, capacity: usize) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::sync_channel(capacity);
        self.set(move |event| {
            if let Err(mpsc::TrySendError::Full(event)) = tx.try_send(event) {
                log::debug!("event queue full, dropping {:?}", event);
            }
        });
        rx
    }

    /// Removes the handler
    pub fn clear(&self) {
        let mut slot = match self.callback.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = None;
    }

    /// Delivers an event to the handler, if any
    pub fn fire(&self, event: Event) {
        let slot = match self.callback.read() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(ref f) = *slot {
            f(event);
        }
    }
}
