//! Connection health record

/// Stage of the connection sequence
///
/// Stages are ordered; the sequence only ever moves one stage forward or
/// falls back to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionStage {
    /// Nothing established; the link must be joined
    Disconnected,
    /// Link joined; wall-clock time must be synced
    NetworkJoining,
    /// Time synced; transport security material must be installed
    TimeSyncing,
    /// Material installed; the session must be established
    TransportSecuring,
    /// Session established; control subscriptions pending
    SessionAuthenticating,
    /// Publishing allowed
    Ready,
}

impl ConnectionStage {
    /// The stage entered once this stage's action has succeeded
    pub const fn next(self) -> Self {
        match self {
            Self::Disconnected => Self::NetworkJoining,
            Self::NetworkJoining => Self::TimeSyncing,
            Self::TimeSyncing => Self::TransportSecuring,
            Self::TransportSecuring => Self::SessionAuthenticating,
            Self::SessionAuthenticating | Self::Ready => Self::Ready,
        }
    }
}

/// Why a healthy connection was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LossReason {
    NetworkDown,
    SessionLost,
    TimeUnavailable,
}

/// Connection state owned by the connectivity manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionState {
    stage: ConnectionStage,
    sequences_completed: u32,
    losses: u32,
}

impl ConnectionState {
    pub const fn new() -> Self {
        Self {
            stage: ConnectionStage::Disconnected,
            sequences_completed: 0,
            losses: 0,
        }
    }

    pub fn stage(&self) -> ConnectionStage {
        self.stage
    }

    pub fn is_ready(&self) -> bool {
        self.stage == ConnectionStage::Ready
    }

    /// Number of times the sequence reached `Ready`
    pub fn sequences_completed(&self) -> u32 {
        self.sequences_completed
    }

    /// Number of losses detected while `Ready`
    pub fn losses(&self) -> u32 {
        self.losses
    }

    /// Move to the next stage; the caller has verified its entry condition
    pub(crate) fn advance(&mut self) -> ConnectionStage {
        let next = self.stage.next();
        if next != self.stage {
            debug!("Connection stage {:?} -> {:?}", self.stage, next);
            self.stage = next;
            if next == ConnectionStage::Ready {
                self.sequences_completed = self.sequences_completed.saturating_add(1);
            }
        }
        next
    }

    /// Abandon a sequence in progress
    pub(crate) fn reset(&mut self) {
        self.stage = ConnectionStage::Disconnected;
    }

    /// Record a loss and fall back to `Disconnected`
    pub(crate) fn mark_lost(&mut self, reason: LossReason) {
        if self.stage == ConnectionStage::Ready {
            self.losses = self.losses.saturating_add(1);
        }
        warn!("Connection lost ({:?}) in stage {:?}", reason, self.stage);
        self.reset();
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}
