//! Per-connection error taxonomy for the realtime fabric.
//!
//! Broadcast writes never abort on a failing peer: each failure is recorded
//! as a [`ConnError`] and the batch is returned as a [`ConnErrors`]
//! multi-error. A closed-connection failure additionally evicts the peer
//! from the room it was being addressed through.

use std::fmt;

use uuid::Uuid;

/// What went wrong talking to one connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnErrorKind {
    /// The peer's outbound channel is gone; treated like EOF.
    #[error("connection closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// An error scoped to a single connection and operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnError {
    pub conn_id: Uuid,
    pub op: &'static str,
    pub kind: ConnErrorKind,
}

impl ConnError {
    pub fn closed(conn_id: Uuid, op: &'static str) -> Self {
        ConnError {
            conn_id,
            op,
            kind: ConnErrorKind::Closed,
        }
    }

    pub fn other(conn_id: Uuid, op: &'static str, reason: impl Into<String>) -> Self {
        ConnError {
            conn_id,
            op,
            kind: ConnErrorKind::Other(reason.into()),
        }
    }

    /// True when the peer should be evicted from rooms.
    pub fn is_closed(&self) -> bool {
        matches!(self.kind, ConnErrorKind::Closed)
    }
}

impl fmt::Display for ConnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn[{}] {}: {}", self.conn_id, self.op, self.kind)
    }
}

impl std::error::Error for ConnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Accumulated per-connection failures from one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnErrors(pub Vec<ConnError>);

impl ConnErrors {
    pub fn push(&mut self, err: ConnError) {
        self.0.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnError> {
        self.0.iter()
    }
}

impl fmt::Display for ConnErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "no connection errors");
        }
        writeln!(f, "{} connection error(s):", self.0.len())?;
        for err in &self.0 {
            writeln!(f, " - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConnErrors {}

/// Outcome of a room broadcast.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Conns(ConnErrors),
}
