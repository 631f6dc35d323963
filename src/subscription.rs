use crate::error::{Result, RioError};
use crate::types::{SourceId, ZoneId};
use tokio::sync::broadcast;

/// A cached variable changed
///
/// Variable names are already lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateUpdate {
    Zone {
        id: ZoneId,
        variable: String,
        value: String,
    },
    Source {
        id: SourceId,
        variable: String,
        value: String,
    },
}

impl StateUpdate {
    pub fn variable(&self) -> &str {
        match self {
            StateUpdate::Zone { variable, .. } | StateUpdate::Source { variable, .. } => variable,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            StateUpdate::Zone { value, .. } | StateUpdate::Source { value, .. } => value,
        }
    }
}

/// Receiver for state updates
pub struct StateReceiver {
    rx: broadcast::Receiver<StateUpdate>,
}

impl StateReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<StateUpdate>) -> Self {
        Self { rx }
    }

    /// Receive the next state update
    ///
    /// Fails with `ConnectionClosed` once the client has been dropped.
    /// A slow receiver that falls behind skips the missed updates and gets
    /// an error saying how many were lost; the cache itself stays accurate.
    pub async fn recv(&mut self) -> Result<StateUpdate> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => RioError::ConnectionClosed,
            broadcast::error::RecvError::Lagged(n) => RioError::Lagged(n),
        })
    }

    /// Try to receive a state update without waiting
    ///
    /// Returns `None` if no update is available.
    pub fn try_recv(&mut self) -> Result<Option<StateUpdate>> {
        match self.rx.try_recv() {
            Ok(update) => Ok(Some(update)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(RioError::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Err(RioError::Lagged(n)),
        }
    }
}
