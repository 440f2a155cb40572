//! Connection Endpoints
//!
//! An endpoint is one accepted WebSocket connection scoped to a single
//! conversation. It is split in two halves:
//!
//! - [`EndpointHandle`]: the shareable side held by the [`RoomHub`](super::RoomHub).
//!   It can enqueue events without blocking and fire the close signal, but it
//!   never owns or touches the socket.
//! - the outbound receiver, owned by the connection's writer loop (single consumer).

use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::messages::Event;
use crate::types::{ConversationId, UserId};

/// Unique identifier for a connection endpoint
pub type EndpointId = Uuid;

/// Why a non-blocking enqueue was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The outbound queue is at capacity (slow consumer)
    Full,
    /// The writer loop is gone
    Closed,
}

/// Registry-side view of a connection
#[derive(Debug)]
pub struct EndpointHandle {
    id: EndpointId,
    subject: UserId,
    conversation_id: ConversationId,
    sender: mpsc::Sender<Arc<Event>>,
    close_signal: CancellationToken,
}

impl EndpointHandle {
    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn subject(&self) -> UserId {
        self.subject
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    /// Enqueue an event without waiting for queue space
    pub fn try_deliver(&self, event: &Arc<Event>) -> Result<(), DeliveryError> {
        match self.sender.try_send(Arc::clone(event)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DeliveryError::Full),
            Err(TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }

    /// Fire the close signal. Safe to call any number of times from any task.
    pub fn close(&self) {
        self.close_signal.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.close_signal.is_cancelled()
    }

    /// A clone of the close signal, for the connection's own loops
    pub fn close_signal(&self) -> CancellationToken {
        self.close_signal.clone()
    }

    /// Number of events waiting in the outbound queue
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

/// A freshly created endpoint: the shareable handle plus its queue consumer
pub struct Endpoint {
    pub handle: Arc<EndpointHandle>,
    pub outbound: mpsc::Receiver<Arc<Event>>,
}

impl Endpoint {
    /// Allocate an endpoint with a bounded outbound queue.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(subject: UserId, conversation_id: ConversationId, capacity: usize) -> Self {
        let (sender, outbound) = mpsc::channel(capacity.max(1));

        Self {
            handle: Arc::new(EndpointHandle {
                id: Uuid::new_v4(),
                subject,
                conversation_id,
                sender,
                close_signal: CancellationToken::new(),
            }),
            outbound,
        }
    }
}
