//! Device-side sync engine
//!
//! The client half of the playback sync protocol: clock synchronization
//! against the server, local state mirroring, the reconciliation protocol
//! that realigns a device after an outage or backgrounding, and the
//! reconnection orchestrator that decides when reconciliation runs.
//!
//! The engine never owns room state; it submits intents over the
//! [`Transport`] seam and applies only server-confirmed results.

pub mod clock;
pub mod engine;
pub mod reconcile;
pub mod reconnect;
pub mod state;
pub mod transport;

pub use clock::{ClockSample, ClockSynchronizer};
pub use engine::SyncEngine;
pub use reconcile::{Changeset, ReconcileError, ReconcileOutcome, ReconcileTrigger, Reconciler};
pub use reconnect::{ConnectivityEvent, ConnectionPhase, ReconnectOutcome, ReconnectionOrchestrator};
pub use state::{LocalPlaybackState, PersistenceError, StatePersistence};
pub use transport::{Transport, TransportError};
