//! Ethernet link: W5500 + DHCP through embassy-net

use defmt::{debug, info};
use embassy_net::Stack;
use hal_abstractions::{NetworkError, NetworkLink};

pub struct EthLink {
    stack: Stack<'static>,
}

impl EthLink {
    pub fn new(stack: Stack<'static>) -> Self {
        Self { stack }
    }
}

impl NetworkLink for EthLink {
    /// DHCP runs inside the stack; only the link state can be checked here
    async fn begin_join(&mut self) -> Result<(), NetworkError> {
        if !self.stack.is_link_up() {
            debug!("Ethernet link down, waiting for cable");
            return Err(NetworkError::LinkDown);
        }
        info!("Ethernet link up, waiting for DHCP lease");
        Ok(())
    }

    fn is_joined(&self) -> bool {
        self.stack.is_link_up() && self.stack.is_config_up()
    }
}
