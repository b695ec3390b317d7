//! Transport backed by a [`VirtualSupply`]

use std::collections::VecDeque;

use psu_transport::{LineCodec, Transport, TransportError, TransportKind};
use tracing::trace;

use crate::supply::{VirtualSupply, VirtualSupplyConfig};

/// Read timeout reported when no reply is queued
const SIMULATED_TIMEOUT_MS: u64 = 500;

/// A transport that talks to an in-process virtual supply
///
/// Written lines are executed immediately; query replies are queued and
/// handed out one per `read`.
#[derive(Debug)]
pub struct SimulatedTransport {
    supply: VirtualSupply,
    codec: LineCodec,
    replies: VecDeque<Vec<u8>>,
    link_up: bool,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new(VirtualSupply::default())
    }
}

impl SimulatedTransport {
    /// Wrap an existing virtual supply
    pub fn new(supply: VirtualSupply) -> Self {
        Self {
            supply,
            codec: LineCodec::new(),
            replies: VecDeque::new(),
            link_up: true,
        }
    }

    /// Build a fresh virtual supply from configuration
    pub fn from_config(config: VirtualSupplyConfig) -> Self {
        Self::new(VirtualSupply::new(config))
    }

    /// The simulated instrument
    pub fn supply(&self) -> &VirtualSupply {
        &self.supply
    }

    /// Mutable access to the simulated instrument
    pub fn supply_mut(&mut self) -> &mut VirtualSupply {
        &mut self.supply
    }

    /// Simulate unplugging (or replugging) the cable
    pub fn set_link_up(&mut self, up: bool) {
        self.link_up = up;
        if !up {
            self.codec.clear();
            self.replies.clear();
        }
    }

    /// Replies waiting to be read
    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }
}

impl Transport for SimulatedTransport {
    fn write(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if !self.link_up {
            return Err(TransportError::Closed);
        }

        self.codec.push_bytes(payload)?;
        while let Some(line) = self.codec.next_line() {
            let text = String::from_utf8_lossy(&line);
            if let Some(reply) = self.supply.process_line(&text) {
                trace!("sim -> {:?}", reply);
                self.replies.push_back(reply.into_bytes());
            }
        }
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<u8>, TransportError> {
        if !self.link_up {
            return Err(TransportError::Closed);
        }
        self.replies
            .pop_front()
            .ok_or(TransportError::Timeout(SIMULATED_TIMEOUT_MS))
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Simulated
    }

    fn is_connected(&self) -> bool {
        self.link_up
    }

    fn describe(&self) -> String {
        format!("simulated {}", self.supply.config().model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_round_trip() {
        let mut sim = SimulatedTransport::default();
        sim.write(b"*IDN?\n").unwrap();
        assert_eq!(sim.pending_replies(), 1);
        let reply = sim.read().unwrap();
        assert!(reply.starts_with(b"PSU-SIM,"));
        assert!(reply.ends_with(b"\n"));
    }

    #[test]
    fn test_action_queues_nothing() {
        let mut sim = SimulatedTransport::default();
        sim.write(b"VOLT 5\n").unwrap();
        assert_eq!(sim.pending_replies(), 0);
        assert!(matches!(sim.read(), Err(TransportError::Timeout(_))));
        assert_eq!(sim.supply().set_voltage(), 5.0);
    }

    #[test]
    fn test_partial_line_waits_for_terminator() {
        let mut sim = SimulatedTransport::default();
        sim.write(b"VOLT ").unwrap();
        assert_eq!(sim.supply().received().len(), 0);
        sim.write(b"7\n").unwrap();
        assert_eq!(sim.supply().set_voltage(), 7.0);
    }

    #[test]
    fn test_link_down() {
        let mut sim = SimulatedTransport::default();
        sim.set_link_up(false);
        assert!(!sim.is_connected());
        assert!(matches!(sim.write(b"*RST\n"), Err(TransportError::Closed)));
        assert!(matches!(sim.read(), Err(TransportError::Closed)));
        assert_eq!(sim.kind(), TransportKind::Simulated);
    }
}
