//! Public port facade: the one type applications hold onto.
//!
//! Grounded on `OpenRDMThread`'s public surface (`Start`/`Stop`/`WriteDMX`/
//! `SendRDMRequest`/`RunFullDiscovery`/`RunIncrementalDiscovery`) layered over
//! [`ThreadHandles`].

use std::sync::Arc;

use crate::command_class::RequestCommandClass;
use crate::config::PortConfig;
use crate::consts::DMX_MAX_LENGTH;
use crate::error::{RdmError, TransportError};
use crate::rdm_codec::RdmResponse;
use crate::threads::ThreadHandles;
use crate::transport::{FtdiTransport, Transport};
use crate::types::DataPack;
use crate::uid::{Uid, UidSet};
use crate::widget::Widget;

/// A running DMX/RDM output port. Dropping it stops both worker threads.
pub struct Port<T: Transport + 'static = FtdiTransport> {
    threads: ThreadHandles<T>,
}

impl Port<FtdiTransport> {
    /// Opens the adapter named in `config` and starts both worker threads.
    pub fn open(config: PortConfig) -> Result<Self, TransportError> {
        let transport = FtdiTransport::open(&config.description)?;
        Ok(Self::start_with_transport(transport, config))
    }
}

impl<T: Transport + 'static> Port<T> {
    /// Starts a port over an already-constructed transport; used by callers
    /// supplying their own [`Transport`] (tests, alternate adapters).
    pub fn start_with_transport(transport: T, config: PortConfig) -> Self {
        let widget = Arc::new(Widget::new(transport, config.rdm_enabled));
        let threads = ThreadHandles::start(widget, config.dmx_refresh_ms, config.rdm_enabled);
        Port { threads }
    }

    /// Queues a DMX frame for the next refresh cycle. Frames longer than
    /// [`DMX_MAX_LENGTH`] are truncated, matching the wire's hard slot limit.
    pub fn write_dmx(&self, frame: &[u8]) {
        let frame = if frame.len() > DMX_MAX_LENGTH {
            &frame[..DMX_MAX_LENGTH]
        } else {
            frame
        };
        self.threads.write_dmx(frame);
    }

    /// Sends a GET/SET RDM request, invoking `callback` exactly once with the
    /// outcome. The callback runs on the RDM worker thread.
    pub fn send_rdm_request(
        &self,
        destination: Uid,
        command_class: RequestCommandClass,
        parameter_id: u16,
        parameter_data: DataPack,
        callback: impl FnOnce(Result<RdmResponse, RdmError>) + Send + 'static,
    ) {
        self.threads
            .send_rdm_request(destination, command_class, parameter_id, parameter_data, callback);
    }

    /// Runs a full table-of-devices discovery, invoking `callback` exactly
    /// once with the resulting TOD.
    pub fn run_full_discovery(&self, callback: impl FnOnce(UidSet) + Send + 'static) {
        self.threads.run_full_discovery(callback);
    }

    /// Runs an incremental discovery, invoking `callback` exactly once with
    /// `(added, removed)`.
    pub fn run_incremental_discovery(
        &self,
        callback: impl FnOnce(UidSet, UidSet) + Send + 'static,
    ) {
        self.threads.run_incremental_discovery(callback);
    }

    /// Stops both worker threads. Also runs on drop.
    pub fn stop(&mut self) {
        self.threads.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};

    struct LoopbackTransport {
        description: String,
    }

    impl Transport for LoopbackTransport {
        fn send_and_receive(&mut self, _frame: &[u8]) -> Result<Vec<u8>, TransportError> {
            Ok(Vec::new())
        }

        fn description(&self) -> &str {
            &self.description
        }
    }

    #[test]
    fn write_dmx_truncates_oversized_frames() {
        let transport = LoopbackTransport {
            description: "loopback".to_string(),
        };
        let mut port = Port::start_with_transport(transport, PortConfig::new("loopback"));
        port.write_dmx(&vec![1u8; DMX_MAX_LENGTH + 100]);
        port.stop();
    }

    #[test]
    fn full_discovery_callback_runs_exactly_once() {
        let transport = LoopbackTransport {
            description: "loopback".to_string(),
        };
        let port = Port::start_with_transport(transport, PortConfig::new("loopback"));
        let (tx, rx) = mpsc::channel();
        let calls = Arc::new(Mutex::new(0));
        let calls_clone = Arc::clone(&calls);
        port.run_full_discovery(move |tod| {
            *calls_clone.lock().unwrap() += 1;
            tx.send(tod).unwrap();
        });
        let tod = rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap();
        assert!(tod.is_empty());
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
