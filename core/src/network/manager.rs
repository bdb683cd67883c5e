//! Connectivity state machine
//!
//! Drives the connection sequence
//!
//! ```text
//! Disconnected -> NetworkJoining -> TimeSyncing -> TransportSecuring
//!              -> SessionAuthenticating -> Ready
//! ```
//!
//! Every step blocks with fixed-interval retries (see [`RetryPolicy`]). A loss
//! detected while `Ready` drops back to `Disconnected` and the next `drive`
//! repeats the whole sequence, time sync included.
//!
//! [`RetryPolicy`]: crate::retry::RetryPolicy

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::{Credentials, MonotonicClock, NetworkLink, PubSubSession, TimeSource};

use super::control::ControlHandler;
use super::state::{ConnectionStage, ConnectionState, LossReason};
use crate::config::ConnectivityConfig;
use crate::error::{Error, Operation};
use crate::retry::Retry;
use crate::time::TimeBase;

/// Owner of the connection state
pub struct ConnectivityManager {
    config: ConnectivityConfig,
    control_topic: &'static str,
    credentials: Credentials<'static>,
    state: ConnectionState,
}

impl ConnectivityManager {
    pub fn new(
        config: ConnectivityConfig,
        control_topic: &'static str,
        credentials: Credentials<'static>,
    ) -> Self {
        Self {
            config,
            control_topic,
            credentials,
            state: ConnectionState::new(),
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn stage(&self) -> ConnectionStage {
        self.state.stage()
    }

    /// Drop to `Disconnected` after an externally observed loss
    pub fn mark_lost(&mut self, reason: LossReason) {
        self.state.mark_lost(reason);
    }

    /// Run the sequence from the current stage until `Ready`
    ///
    /// A no-op when already `Ready`. On error (only possible with a bounded
    /// retry policy) the stage falls back to `Disconnected`.
    ///
    /// # Errors
    ///
    /// `RetriesExhausted` naming the stage that gave up: `NetworkJoin`,
    /// `TimeSync` or `SessionConnect`. A failed subscribe is not an error.
    pub async fn drive<L, T, S, C, D>(
        &mut self,
        link: &mut L,
        time: &mut TimeBase<T>,
        session: &mut S,
        clock: &C,
        delay: &mut D,
    ) -> Result<(), Error>
    where
        L: NetworkLink,
        T: TimeSource,
        S: PubSubSession,
        C: MonotonicClock,
        D: DelayNs,
    {
        if self.state.is_ready() {
            trace!("Connectivity already ready");
            return Ok(());
        }

        let result = self.run_sequence(link, time, session, clock, delay).await;
        if let Err(e) = result {
            warn!("Connection sequence aborted in {:?}: {:?}", self.state.stage(), e);
            self.state.reset();
        }
        result
    }

    async fn run_sequence<L, T, S, C, D>(
        &mut self,
        link: &mut L,
        time: &mut TimeBase<T>,
        session: &mut S,
        clock: &C,
        delay: &mut D,
    ) -> Result<(), Error>
    where
        L: NetworkLink,
        T: TimeSource,
        S: PubSubSession,
        C: MonotonicClock,
        D: DelayNs,
    {
        loop {
            match self.state.stage() {
                ConnectionStage::Disconnected => {
                    self.join_network(link, delay).await?;
                }
                ConnectionStage::NetworkJoining => {
                    time.resync(clock, delay).await?;
                }
                ConnectionStage::TimeSyncing => {
                    session.install_credentials(self.credentials);
                    debug!("Transport security material installed");
                }
                ConnectionStage::TransportSecuring => {
                    self.connect_session(session, delay).await?;
                }
                ConnectionStage::SessionAuthenticating => {
                    self.subscribe_control(session).await;
                }
                ConnectionStage::Ready => {
                    info!(
                        "Session ready ({} sequences, {} losses)",
                        self.state.sequences_completed(),
                        self.state.losses()
                    );
                    return Ok(());
                }
            }
            self.state.advance();
        }
    }

    async fn join_network<L, D>(&mut self, link: &mut L, delay: &mut D) -> Result<(), Error>
    where
        L: NetworkLink,
        D: DelayNs,
    {
        if link.is_joined() {
            debug!("Network link already up");
            return Ok(());
        }

        info!("Joining network");
        let mut retry = Retry::new(self.config.join_retry, Operation::NetworkJoin);
        let mut requested = false;
        loop {
            if !requested {
                match link.begin_join().await {
                    Ok(()) => requested = true,
                    Err(e) => warn!("Join request failed: {:?}", e),
                }
            }
            if link.is_joined() {
                info!("Network joined after {} retries", retry.failures());
                return Ok(());
            }
            debug!("trying network...");
            retry.backoff(delay).await?;
        }
    }

    async fn connect_session<S, D>(&mut self, session: &mut S, delay: &mut D) -> Result<(), Error>
    where
        S: PubSubSession,
        D: DelayNs,
    {
        let endpoint = self.config.endpoint;
        info!(
            "Connecting session to {}:{} as {}",
            endpoint.host,
            endpoint.port,
            self.config.client_id
        );
        let mut retry = Retry::new(self.config.session_retry, Operation::SessionConnect);
        loop {
            match session.connect(endpoint, self.config.client_id).await {
                Ok(()) => {
                    info!("Session connected");
                    return Ok(());
                }
                Err(e) => {
                    warn!("Session connect failed: {:?}, retrying...", e);
                    retry.backoff(delay).await?;
                }
            }
        }
    }

    async fn subscribe_control<S: PubSubSession>(&mut self, session: &mut S) {
        if !self.config.subscribe_control {
            return;
        }
        match session.subscribe(self.control_topic).await {
            Ok(()) => info!("Subscribed to {}", self.control_topic),
            Err(e) => warn!("Subscribe to {} failed: {:?}", self.control_topic, e),
        }
    }

    /// Poll link and session; hand inbound messages to `handler`
    ///
    /// Returns `true` while `Ready` and alive. Any loss drops the stage to
    /// `Disconnected`.
    pub async fn check_health<L, S, H>(&mut self, link: &L, session: &mut S, handler: &mut H) -> bool
    where
        L: NetworkLink,
        S: PubSubSession,
        H: ControlHandler,
    {
        if !self.state.is_ready() {
            return false;
        }
        if !link.is_joined() {
            self.state.mark_lost(LossReason::NetworkDown);
            return false;
        }
        if !session.is_connected() {
            self.state.mark_lost(LossReason::SessionLost);
            return false;
        }

        match session.poll().await {
            Ok(Some(message)) => {
                handler.on_control(message.topic, message.payload);
                true
            }
            Ok(None) => true,
            Err(e) => {
                warn!("Session poll failed: {:?}", e);
                self.state.mark_lost(LossReason::SessionLost);
                false
            }
        }
    }
}
