//! The widget: owns the transport and implements DMX output, RDM request/
//! response transactions, and the discovery algorithm.
//!
//! Grounded directly on `OpenRDMWidget.cpp`/`OpenRDMWidget.h` and `rdm.cpp`'s
//! `generateUID`. `sendRDMPacket`'s retry/ACK_TIMER/ACK_OVERFLOW loop and
//! `discover`'s recursive binary search are carried over near-verbatim,
//! translated into owned `Uid`/`UidSet` values and `Result`-returning calls.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::command_class::{RequestCommandClass, ResponseCommandClass};
use crate::consts::{
    RDM_CONTROL_MANAGED_PROXY_BITMASK, RDM_DEFAULT_MAX_TIME_MS, RDM_DEFAULT_RETRIES,
    RDM_STATUS_ERROR, RDM_UID_MAX,
};
use crate::error::RdmError;
use crate::pids::{
    DISC_MUTE, DISC_UNIQUE_BRANCH, DISC_UN_MUTE, PROXIED_DEVICES, PROXY_DEV_COUNT, QUEUED_MESSAGE,
};
use crate::rdm_codec::{parse_discovery_response, parse_rdm_frame, RdmRequest, RdmResponse};
use crate::transport::Transport;
use crate::types::{DataPack, ResponseType};
use crate::uid::{generate_controller_uid, Uid, UidSet};

struct DiscoveryState {
    tod: UidSet,
    lost: UidSet,
    proxies: UidSet,
}

/// Owns one physical adapter. Safe to share across the DMX refresh thread and
/// the RDM transaction thread: every field uses interior mutability with its
/// own lock, matching the original's per-concern mutex split (`dev_mutex`,
/// `tod_mutex`) rather than one coarse lock.
pub struct Widget<T: Transport> {
    transport: Mutex<T>,
    uid: Uid,
    rdm_enabled: bool,
    transaction_number: AtomicU8,
    discovery_in_progress: AtomicBool,
    discovery_state: Mutex<DiscoveryState>,
}

impl<T: Transport> Widget<T> {
    pub fn new(transport: T, rdm_enabled: bool) -> Self {
        let uid = generate_controller_uid(transport.description());
        Widget {
            transport: Mutex::new(transport),
            uid,
            rdm_enabled,
            transaction_number: AtomicU8::new(0),
            discovery_in_progress: AtomicBool::new(false),
            discovery_state: Mutex::new(DiscoveryState {
                tod: UidSet::new(),
                lost: UidSet::new(),
                proxies: UidSet::new(),
            }),
        }
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn tod(&self) -> UidSet {
        self.discovery_state.lock().unwrap().tod.clone()
    }

    fn next_transaction_number(&self) -> u8 {
        self.transaction_number.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends one DMX frame. Errors are logged and absorbed, matching the
    /// original widget's fire-and-forget `writeDMX`; the refresh thread keeps
    /// running regardless.
    pub fn write_dmx(&self, frame: &[u8]) {
        let mut buf = Vec::with_capacity(frame.len() + 1);
        buf.push(crate::consts::DMX_START_CODE);
        buf.extend_from_slice(frame);

        let mut transport = self.transport.lock().unwrap();
        if let Err(err) = transport.send_and_receive(&buf) {
            warn!("DMX write failed: {err}");
            if matches!(err, crate::error::TransportError::DeviceUnavailable) {
                drop(transport);
                std::thread::sleep(Duration::from_millis(
                    crate::consts::DEVICE_UNAVAILABLE_BACKOFF_MS,
                ));
            }
        }
    }

    /// Sends one RDM frame and parses whatever response comes back, without
    /// any retry or transaction-matching logic — that lives in
    /// [`Widget::send_rdm_transaction`].
    ///
    /// `is_discovery` controls how the leading break-marker byte the adapter
    /// prepends to every read is handled: a `DISC_UNIQUE_BRANCH` response is
    /// framed by its own preamble/separator and the marker byte is left in
    /// place, but a GET/SET response's frame starts right at the RDM start
    /// code, so the marker byte is dropped before returning.
    fn write_rdm_raw(&self, request: &RdmRequest, is_discovery: bool) -> Result<Vec<u8>, RdmError> {
        let frame = request.pack();
        let mut buf = Vec::with_capacity(frame.len() + 1);
        buf.push(crate::consts::RDM_START_CODE);
        buf.extend_from_slice(&frame);

        let mut transport = self.transport.lock().unwrap();
        match transport.send_and_receive(&buf) {
            Ok(mut response) => {
                if !is_discovery && !response.is_empty() {
                    response.remove(0);
                }
                Ok(response)
            },
            Err(crate::error::TransportError::DeviceUnavailable) => {
                drop(transport);
                std::thread::sleep(Duration::from_millis(
                    crate::consts::DEVICE_UNAVAILABLE_BACKOFF_MS,
                ));
                Err(RdmError::TransportFailure(
                    crate::error::TransportError::DeviceUnavailable,
                ))
            },
            Err(err) => Err(RdmError::TransportFailure(err)),
        }
    }

    /// Implements the full request/retry loop from `sendRDMPacket`: ACK is a
    /// terminal success, NACK retries the request, ACK_TIMER rewrites the
    /// retry into a `GET QUEUED_MESSAGE` and sleeps the advertised delay, and
    /// ACK_OVERFLOW accumulates each fragment's parameter data and re-sends
    /// the same request for the next one, concatenating everything into the
    /// final response once the terminating ACK arrives.
    pub fn send_rdm_transaction(
        &self,
        mut request: RdmRequest,
    ) -> Result<RdmResponse, RdmError> {
        self.send_rdm_transaction_with(
            &mut request,
            RDM_DEFAULT_RETRIES,
            RDM_DEFAULT_MAX_TIME_MS,
        )
    }

    fn send_rdm_transaction_with(
        &self,
        request: &mut RdmRequest,
        retries: u32,
        max_time_ms: u64,
    ) -> Result<RdmResponse, RdmError> {
        let destination = request.destination_uid;
        let requested_pid = request.parameter_id;
        let is_discover = request.command_class == RequestCommandClass::DiscoveryCommand;

        let start = Instant::now();
        let max_time = Duration::from_millis(max_time_ms);
        let mut overflow_data: Vec<u8> = Vec::new();

        for attempt in 0..=retries {
            if attempt != 0 {
                request.transaction_number = self.next_transaction_number();
            }
            if attempt > 0 && start.elapsed() > max_time {
                break;
            }

            let raw = match self.write_rdm_raw(request, is_discover) {
                Ok(raw) => raw,
                Err(err) => return Err(err),
            };
            if raw.is_empty() {
                continue;
            }

            let response = match parse_rdm_frame(&raw) {
                Ok(response) => response,
                Err(_) => continue,
            };
            if response.transaction_number != request.transaction_number {
                continue;
            }
            if response.parameter_id != requested_pid {
                continue;
            }

            let is_discover_response = response.command_class
                == ResponseCommandClass::DiscoveryCommandResponse
                || is_discover;

            if is_discover_response {
                if response.response_type == ResponseType::Ack {
                    return Ok(response);
                }
                continue;
            }

            match response.response_type {
                ResponseType::Ack => {
                    if overflow_data.is_empty() {
                        return Ok(response);
                    }
                    overflow_data.extend_from_slice(&response.parameter_data);
                    return Ok(RdmResponse {
                        parameter_data: overflow_data,
                        ..response
                    });
                },
                ResponseType::AckOverflow => {
                    overflow_data.extend_from_slice(&response.parameter_data);
                },
                ResponseType::AckTimer => {
                    if response.parameter_data.len() != 2 {
                        continue;
                    }
                    let delay_ms = 100u64
                        * u16::from_be_bytes([
                            response.parameter_data[0],
                            response.parameter_data[1],
                        ]) as u64;
                    request.command_class = RequestCommandClass::GetCommand;
                    request.parameter_id = QUEUED_MESSAGE;
                    request.parameter_data =
                        DataPack::from_slice(&[RDM_STATUS_ERROR]).expect("1 byte fits");
                    std::thread::sleep(Duration::from_millis(delay_ms.min(max_time_ms)));
                },
                ResponseType::Nack => {},
            }
        }

        if destination.is_broadcast() {
            return Err(RdmError::WasBroadcast);
        }
        Err(RdmError::Timeout(destination))
    }

    fn build_request(
        &self,
        destination: Uid,
        command_class: RequestCommandClass,
        parameter_id: u16,
        parameter_data: DataPack,
    ) -> RdmRequest {
        RdmRequest {
            destination_uid: destination,
            source_uid: self.uid,
            transaction_number: self.next_transaction_number(),
            port_id: 1,
            sub_device: 0,
            command_class,
            parameter_id,
            parameter_data,
        }
    }

    /// Sends `DISC_MUTE`/`DISC_UN_MUTE` to `addr`. Returns `None` if the
    /// device didn't respond at all, or `Some(is_proxy)` if it did — the two
    /// outcomes are distinguished because the incremental discovery walk
    /// treats them differently (lost vs. still-present-but-not-a-proxy).
    fn send_mute(&self, addr: Uid, unmute: bool) -> Result<Option<bool>, RdmError> {
        let pid = if unmute {
            DISC_UN_MUTE
        } else {
            DISC_MUTE
        };
        let request = self.build_request(addr, RequestCommandClass::DiscoveryCommand, pid, DataPack::new());

        let response = match self.send_rdm_transaction(request) {
            Ok(response) => response,
            Err(RdmError::Timeout(_)) | Err(RdmError::WasBroadcast) => return Ok(None),
            Err(err) => return Err(err),
        };

        if response.source_uid != addr {
            return Ok(None);
        }

        let is_proxy = match response.parameter_data.len() {
            2 | 8 => {
                let control_field =
                    u16::from_be_bytes([response.parameter_data[0], response.parameter_data[1]]);
                control_field & RDM_CONTROL_MANAGED_PROXY_BITMASK != 0
            },
            _ => false,
        };

        Ok(Some(is_proxy))
    }

    /// Recursive binary-search discovery over `[start, end]`, matching
    /// `OpenRDMWidget::discover`.
    fn discover(&self, start: u64, end: u64) -> Result<UidSet, RdmError> {
        let mute_uid = if start != end {
            let mut branch_data = [0u8; 12];
            branch_data[0..6].copy_from_slice(&Uid::from_u64(start).pack());
            branch_data[6..12].copy_from_slice(&Uid::from_u64(end).pack());
            let parameter_data = DataPack::from_slice(&branch_data).expect("12 <= 231");

            let request = self.build_request(
                Uid::BROADCAST,
                RequestCommandClass::DiscoveryCommand,
                DISC_UNIQUE_BRANCH,
                parameter_data,
            );

            let raw = match self.write_rdm_raw(&request, true) {
                Ok(raw) => raw,
                Err(RdmError::TransportFailure(_)) => return Ok(UidSet::new()),
                Err(err) => return Err(err),
            };

            // No bytes at all means nothing answered in this range — done,
            // not a collision. Only a non-empty but unparseable reply means
            // more than one responder answered at once, which is what
            // actually needs splitting and recursing.
            if raw.is_empty() {
                return Ok(UidSet::new());
            }

            match parse_discovery_response(&raw) {
                Ok(uid) => uid,
                Err(_) => {
                    if end <= start {
                        return Ok(UidSet::new());
                    }
                    let span = end - start + 1;
                    let lower_half_max = start + span / 2 - 1;
                    let lower = self.discover(start, lower_half_max)?;
                    let upper = self.discover(lower_half_max + 1, end)?;
                    return Ok(lower.union(&upper));
                },
            }
        } else {
            Uid::from_u64(start)
        };

        let is_proxy = match self.send_mute(mute_uid, false)? {
            Some(is_proxy) => is_proxy,
            None => return Ok(UidSet::new()),
        };
        let mut discovered = UidSet::new();
        discovered.add(mute_uid);

        if !is_proxy {
            return Ok(discovered);
        }

        Ok(discovered.union(&self.get_proxy_tod(mute_uid)?))
    }

    /// Fetches `PROXIED_DEVICES` from a managed-proxy responder, paging
    /// through ACK_OVERFLOW fragments via `send_rdm_transaction`.
    fn get_proxy_tod(&self, addr: Uid) -> Result<UidSet, RdmError> {
        let request = self.build_request(
            addr,
            RequestCommandClass::GetCommand,
            PROXIED_DEVICES,
            DataPack::new(),
        );

        let response = match self.send_rdm_transaction(request) {
            Ok(response) => response,
            Err(RdmError::Timeout(_)) => return Ok(UidSet::new()),
            Err(err) => return Err(err),
        };

        let mut tod = UidSet::new();
        for chunk in response.parameter_data.chunks(6) {
            if chunk.len() == 6 {
                tod.add(Uid::parse(chunk.try_into().unwrap()));
            }
        }
        Ok(tod)
    }

    fn has_proxy_tod_changed(&self, addr: Uid) -> Result<bool, RdmError> {
        let request = self.build_request(
            addr,
            RequestCommandClass::GetCommand,
            PROXY_DEV_COUNT,
            DataPack::new(),
        );

        let response = match self.send_rdm_transaction(request) {
            Ok(response) => response,
            Err(RdmError::Timeout(_)) => return Ok(false),
            Err(err) => return Err(err),
        };

        if response.parameter_data.len() != 3 {
            return Ok(false);
        }
        Ok(response.parameter_data[2] != 0)
    }

    /// Full table-of-devices rediscovery: unmutes everything, then walks the
    /// entire 48-bit UID space.
    pub fn full_rdm_discovery(&self) -> Result<UidSet, RdmError> {
        if !self.rdm_enabled {
            return Err(RdmError::DiscoveryNotSupported);
        }
        if self
            .discovery_in_progress
            .swap(true, Ordering::AcqRel)
        {
            return Ok(self.tod());
        }

        let result = (|| {
            self.send_mute(Uid::BROADCAST, true)?;
            let tod = self.discover(0, RDM_UID_MAX)?;
            for uid in tod.iter() {
                debug!("RDM device discovered: {uid}");
            }
            let mut state = self.discovery_state.lock().unwrap();
            state.tod = tod.clone();
            state.lost = UidSet::new();
            state.proxies = UidSet::new();
            Ok(tod)
        })();

        self.discovery_in_progress.store(false, Ordering::Release);
        result
    }

    /// Incremental rediscovery: re-mutes known devices to confirm they're
    /// still present, re-probes lost devices, walks the address space for
    /// anything new, and re-scans proxy sub-trees whose device count changed.
    /// Returns `(added, removed)`.
    pub fn incremental_rdm_discovery(&self) -> Result<(UidSet, UidSet), RdmError> {
        if !self.rdm_enabled {
            return Err(RdmError::DiscoveryNotSupported);
        }
        if self
            .discovery_in_progress
            .swap(true, Ordering::AcqRel)
        {
            return Ok((UidSet::new(), UidSet::new()));
        }

        let result = self.incremental_rdm_discovery_inner();
        self.discovery_in_progress.store(false, Ordering::Release);
        result
    }

    fn incremental_rdm_discovery_inner(&self) -> Result<(UidSet, UidSet), RdmError> {
        self.send_mute(Uid::BROADCAST, true)?;

        let (known_tod, known_lost, mut known_proxies) = {
            let state = self.discovery_state.lock().unwrap();
            (state.tod.clone(), state.lost.clone(), state.proxies.clone())
        };

        let mut found = UidSet::new();
        let mut new_lost = UidSet::new();
        let mut new_proxies = UidSet::new();

        for &candidate in &known_tod {
            match self.send_mute(candidate, false)? {
                Some(true) => {
                    new_proxies.add(candidate);
                    known_proxies.add(candidate);
                },
                Some(false) => {
                    known_proxies.remove(candidate);
                },
                None => {
                    new_lost.add(candidate);
                    known_proxies.remove(candidate);
                },
            }
        }

        for &candidate in &known_lost {
            if let Some(is_proxy) = self.send_mute(candidate, false)? {
                found.add(candidate);
                if is_proxy {
                    new_proxies.add(candidate);
                    known_proxies.add(candidate);
                }
            }
        }

        let mut discovered = self.discover(0, RDM_UID_MAX)?;

        for &proxy_uid in &known_proxies {
            if !new_proxies.contains(proxy_uid) && !self.has_proxy_tod_changed(proxy_uid)? {
                continue;
            }
            let proxy_tod = self.get_proxy_tod(proxy_uid)?;
            discovered = discovered.union(&proxy_tod);
        }

        for &uid in &discovered {
            new_lost.remove(uid);
            if !known_tod.contains(uid) {
                found.add(uid);
            }
        }

        for uid in new_lost.iter() {
            debug!("RDM device lost: {uid}");
        }
        for uid in found.iter() {
            debug!("RDM device discovered: {uid}");
        }

        let mut state = self.discovery_state.lock().unwrap();
        state.tod = known_tod.difference(&new_lost).union(&found);
        state.lost = known_lost.union(&new_lost).difference(&found);
        state.proxies = known_proxies;

        Ok((found, new_lost))
    }

    /// A GET/SET RDM transaction against a specific device, for public use
    /// from the port facade.
    pub fn send_get_or_set(
        &self,
        destination: Uid,
        command_class: RequestCommandClass,
        parameter_id: u16,
        parameter_data: DataPack,
    ) -> Result<RdmResponse, RdmError> {
        if !self.rdm_enabled {
            return Err(RdmError::DiscoveryNotSupported);
        }
        let request = self.build_request(destination, command_class, parameter_id, parameter_data);
        self.send_rdm_transaction(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    struct MockTransport {
        description: String,
        responses: StdMutex<std::collections::VecDeque<Vec<u8>>>,
    }

    impl Transport for MockTransport {
        fn send_and_receive(&mut self, _frame: &[u8]) -> Result<Vec<u8>, crate::error::TransportError> {
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default())
        }

        fn description(&self) -> &str {
            &self.description
        }
    }

    fn widget_with_responses(responses: Vec<Vec<u8>>) -> Widget<MockTransport> {
        let transport = MockTransport {
            description: "mock".to_string(),
            responses: StdMutex::new(responses.into()),
        };
        Widget::new(transport, true)
    }

    #[test]
    fn generates_non_broadcast_uid_from_description() {
        let widget = widget_with_responses(vec![]);
        assert!(!widget.uid().is_broadcast());
    }

    #[test]
    fn full_discovery_with_no_responses_yields_empty_tod() {
        let widget = widget_with_responses(vec![]);
        let tod = widget.full_rdm_discovery().unwrap();
        assert!(tod.is_empty());
    }

    #[test]
    fn discovery_not_supported_when_rdm_disabled() {
        let transport = MockTransport {
            description: "mock".to_string(),
            responses: StdMutex::new(Default::default()),
        };
        let widget = Widget::new(transport, false);
        assert!(matches!(
            widget.full_rdm_discovery(),
            Err(RdmError::DiscoveryNotSupported)
        ));
    }

    #[test]
    fn concurrent_discovery_returns_current_tod_instead_of_racing() {
        let widget = Arc::new(widget_with_responses(vec![]));
        widget.discovery_in_progress.store(true, Ordering::Release);
        let tod = widget.full_rdm_discovery().unwrap();
        assert!(tod.is_empty());
    }
}
