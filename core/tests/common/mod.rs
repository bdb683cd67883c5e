//! Host fakes for the hardware and network capabilities
//!
//! All fakes share one simulated clock. `FakeDelay` advances it, so a whole
//! device cycle runs instantly under `block_on`. State that tests inspect
//! after handing a fake to the device lives behind `Rc<RefCell<_>>` handles.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::{
    AnalogInput, Credentials, Endpoint, InboundMessage, MonotonicClock, NetworkError, NetworkLink,
    PubSubSession, SensorError, TimeSource,
};
use meter_core::{Device, DeviceConfig, DeviceParts, LoggingControlHandler};

pub const BASE_EPOCH: u64 = 1_700_000_000;

pub const CREDENTIALS: Credentials<'static> = Credentials {
    trust_anchor: b"trust-anchor",
    client_cert: b"client-cert",
    client_key: b"client-key",
};

#[derive(Clone, Default)]
pub struct FakeClock {
    millis: Rc<Cell<u64>>,
}

impl FakeClock {
    pub fn advance(&self, millis: u64) {
        self.millis.set(self.millis.get() + millis);
    }
}

impl MonotonicClock for FakeClock {
    fn now_millis(&self) -> u64 {
        self.millis.get()
    }
}

/// Delay that advances the shared clock instead of sleeping
pub struct FakeDelay {
    clock: FakeClock,
    pending_ns: u64,
}

impl FakeDelay {
    pub fn new(clock: FakeClock) -> Self {
        Self {
            clock,
            pending_ns: 0,
        }
    }
}

impl DelayNs for FakeDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.pending_ns += ns as u64;
        self.clock.advance(self.pending_ns / 1_000_000);
        self.pending_ns %= 1_000_000;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.clock.advance(ms as u64);
    }
}

/// ADC cycling through a shared list of raw counts
pub struct FakeAdc {
    samples: Rc<RefCell<Vec<Result<u16, SensorError>>>>,
    index: usize,
}

impl AnalogInput for FakeAdc {
    fn read_raw(&mut self) -> Result<u16, SensorError> {
        let samples = self.samples.borrow();
        if samples.is_empty() {
            return Err(SensorError::NotReady);
        }
        let sample = samples[self.index % samples.len()];
        self.index += 1;
        sample
    }
}

#[derive(Default)]
pub struct LinkState {
    pub joined: bool,
    /// `is_joined` checks that still report down after a join request
    pub checks_until_joined: u32,
    pub join_requested: bool,
    pub join_requests: u32,
}

pub struct FakeLink {
    state: Rc<RefCell<LinkState>>,
}

impl NetworkLink for FakeLink {
    async fn begin_join(&mut self) -> Result<(), NetworkError> {
        let mut state = self.state.borrow_mut();
        state.join_requests += 1;
        state.join_requested = true;
        Ok(())
    }

    fn is_joined(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if !state.joined && state.join_requested {
            if state.checks_until_joined == 0 {
                state.joined = true;
                state.join_requested = false;
            } else {
                state.checks_until_joined -= 1;
            }
        }
        state.joined
    }
}

#[derive(Default)]
pub struct TimeState {
    /// Answers returned before falling back to the clock-derived time
    pub scripted: VecDeque<Result<u64, NetworkError>>,
    /// Answer every request with this value once the script is exhausted
    pub fixed: Option<u64>,
    pub requests: u32,
}

/// Time source reporting `BASE_EPOCH` plus the simulated uptime
pub struct FakeTimeSource {
    clock: FakeClock,
    state: Rc<RefCell<TimeState>>,
}

impl TimeSource for FakeTimeSource {
    async fn request_time(&mut self) -> Result<u64, NetworkError> {
        let mut state = self.state.borrow_mut();
        state.requests += 1;
        if let Some(answer) = state.scripted.pop_front() {
            return answer;
        }
        Ok(state
            .fixed
            .unwrap_or(BASE_EPOCH + self.clock.now_millis() / 1000))
    }
}

#[derive(Default)]
pub struct SessionState {
    pub connected: bool,
    pub connect_failures: u32,
    pub connect_calls: u32,
    pub last_endpoint: Option<(String, u16, String)>,
    pub credentials_installed: u32,
    pub installed_trust_anchor: Vec<u8>,
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, Vec<u8>)>,
    pub fail_publish: bool,
    pub fail_subscribe: bool,
    pub fail_poll: bool,
    pub inbound: VecDeque<(String, Vec<u8>)>,
}

pub struct FakeSession {
    state: Rc<RefCell<SessionState>>,
    current: Option<(String, Vec<u8>)>,
}

impl PubSubSession for FakeSession {
    fn install_credentials(&mut self, credentials: Credentials<'static>) {
        let mut state = self.state.borrow_mut();
        state.credentials_installed += 1;
        state.installed_trust_anchor = credentials.trust_anchor.to_vec();
    }

    async fn connect(&mut self, endpoint: Endpoint<'_>, client_id: &str) -> Result<(), NetworkError> {
        let mut state = self.state.borrow_mut();
        state.connect_calls += 1;
        state.last_endpoint = Some((endpoint.host.into(), endpoint.port, client_id.into()));
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(NetworkError::MqttConnectionFailed);
        }
        state.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), NetworkError> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return Err(NetworkError::NotConnected);
        }
        if state.fail_subscribe {
            return Err(NetworkError::MqttSubscribeFailed);
        }
        state.subscriptions.push(topic.into());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), NetworkError> {
        let mut state = self.state.borrow_mut();
        if state.fail_publish {
            return Err(NetworkError::MqttPublishFailed);
        }
        state.published.push((topic.into(), payload.to_vec()));
        Ok(())
    }

    async fn poll(&mut self) -> Result<Option<InboundMessage<'_>>, NetworkError> {
        let next = {
            let mut state = self.state.borrow_mut();
            if state.fail_poll {
                state.connected = false;
                return Err(NetworkError::MqttConnectionFailed);
            }
            state.inbound.pop_front()
        };
        self.current = next;
        Ok(self.current.as_ref().map(|(topic, payload)| InboundMessage {
            topic: topic.as_str(),
            payload: payload.as_slice(),
        }))
    }
}

pub type TestDevice = Device<
    FakeAdc,
    FakeClock,
    FakeDelay,
    FakeLink,
    FakeTimeSource,
    FakeSession,
    LoggingControlHandler,
>;

/// Handles onto every fake's shared state
pub struct Harness {
    pub clock: FakeClock,
    pub samples: Rc<RefCell<Vec<Result<u16, SensorError>>>>,
    pub link: Rc<RefCell<LinkState>>,
    pub time: Rc<RefCell<TimeState>>,
    pub session: Rc<RefCell<SessionState>>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            clock: FakeClock::default(),
            samples: Rc::new(RefCell::new(Vec::new())),
            link: Rc::new(RefCell::new(LinkState::default())),
            time: Rc::new(RefCell::new(TimeState::default())),
            session: Rc::new(RefCell::new(SessionState::default())),
        }
    }

    /// Cycle through `counts`, one per conversion
    pub fn set_samples(&self, counts: &[u16]) {
        *self.samples.borrow_mut() = counts.iter().copied().map(Ok).collect();
    }

    pub fn adc(&self) -> FakeAdc {
        FakeAdc {
            samples: self.samples.clone(),
            index: 0,
        }
    }

    pub fn link(&self) -> FakeLink {
        FakeLink {
            state: self.link.clone(),
        }
    }

    pub fn time_source(&self) -> FakeTimeSource {
        FakeTimeSource {
            clock: self.clock.clone(),
            state: self.time.clone(),
        }
    }

    pub fn session(&self) -> FakeSession {
        FakeSession {
            state: self.session.clone(),
            current: None,
        }
    }

    pub fn delay(&self) -> FakeDelay {
        FakeDelay::new(self.clock.clone())
    }

    pub fn device(&self, config: DeviceConfig) -> TestDevice {
        let parts = DeviceParts {
            adc: self.adc(),
            clock: self.clock.clone(),
            delay: self.delay(),
            link: self.link(),
            time_source: self.time_source(),
            session: self.session(),
            control: LoggingControlHandler::new(),
            credentials: CREDENTIALS,
        };
        match Device::new(parts, config) {
            Ok(device) => device,
            Err(e) => panic!("invalid test config: {e}"),
        }
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.session.borrow().published.clone()
    }
}
