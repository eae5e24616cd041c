//! The two worker threads: continuous DMX refresh and serialized RDM
//! transactions/discovery.
//!
//! Grounded on `dmx_thread`/`rdm_thread` in `OpenRDMThread.cpp`. The DMX loop
//! is carried over timing logic and all; the RDM loop runs its message queue
//! loop in full — the original's early `return;` before that loop (a known,
//! commented "get DMX working first" shortcut) is not reproduced here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::debug;

use crate::command_class::RequestCommandClass;
use crate::consts::{RDM_QUEUE_MAX_LENGTH, RDM_QUEUE_SEMA_TIMEOUT_MS};
use crate::error::RdmError;
use crate::rdm_codec::RdmResponse;
use crate::semaphore::Semaphore;
use crate::transport::Transport;
use crate::types::DataPack;
use crate::uid::{Uid, UidSet};
use crate::widget::Widget;

/// A single DMX frame, double-buffered between the caller and the refresh
/// thread via `dmx_mutex`/`dmx_sema`.
struct DmxSlot {
    data: Vec<u8>,
    changed: bool,
}

/// One queued unit of RDM-thread work.
enum RdmJob {
    Request {
        destination: Uid,
        command_class: RequestCommandClass,
        parameter_id: u16,
        parameter_data: DataPack,
        callback: Box<dyn FnOnce(Result<RdmResponse, RdmError>) + Send>,
    },
    FullDiscovery {
        callback: Box<dyn FnOnce(UidSet) + Send>,
    },
    IncrementalDiscovery {
        callback: Box<dyn FnOnce(UidSet, UidSet) + Send>,
    },
}

/// Shared handles the port facade uses to talk to the two worker threads.
pub struct ThreadHandles<T: Transport + 'static> {
    widget: Arc<Widget<T>>,
    dmx_slot: Arc<Mutex<DmxSlot>>,
    dmx_sema: Arc<Semaphore>,
    rdm_queue: Arc<Mutex<std::collections::VecDeque<RdmJob>>>,
    rdm_sema: Arc<Semaphore>,
    exit_flag: Arc<AtomicBool>,
    dmx_handle: Option<JoinHandle<()>>,
    rdm_handle: Option<JoinHandle<()>>,
}

impl<T: Transport + 'static> ThreadHandles<T> {
    pub fn start(widget: Arc<Widget<T>>, dmx_refresh_ms: u32, rdm_enabled: bool) -> Self {
        let exit_flag = Arc::new(AtomicBool::new(false));
        let dmx_slot = Arc::new(Mutex::new(DmxSlot {
            data: vec![0u8; crate::consts::DMX_MAX_LENGTH],
            changed: false,
        }));
        let dmx_sema = Arc::new(Semaphore::new(0));
        let rdm_queue = Arc::new(Mutex::new(std::collections::VecDeque::new()));
        let rdm_sema = Arc::new(Semaphore::new(0));

        let dmx_handle = {
            let widget = Arc::clone(&widget);
            let dmx_slot = Arc::clone(&dmx_slot);
            let dmx_sema = Arc::clone(&dmx_sema);
            let exit_flag = Arc::clone(&exit_flag);
            Some(std::thread::spawn(move || {
                dmx_thread(widget, dmx_refresh_ms, dmx_sema, dmx_slot, exit_flag)
            }))
        };

        let rdm_handle = if rdm_enabled {
            let widget = Arc::clone(&widget);
            let rdm_queue = Arc::clone(&rdm_queue);
            let rdm_sema = Arc::clone(&rdm_sema);
            let exit_flag = Arc::clone(&exit_flag);
            Some(std::thread::spawn(move || {
                rdm_thread(widget, rdm_queue, rdm_sema, exit_flag)
            }))
        } else {
            None
        };

        ThreadHandles {
            widget,
            dmx_slot,
            dmx_sema,
            rdm_queue,
            rdm_sema,
            exit_flag,
            dmx_handle,
            rdm_handle,
        }
    }

    pub fn stop(&mut self) {
        self.exit_flag.store(true, Ordering::Release);
        self.dmx_sema.notify();
        self.rdm_sema.notify();
        if let Some(handle) = self.dmx_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.rdm_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn write_dmx(&self, frame: &[u8]) {
        let mut slot = self.dmx_slot.lock().unwrap();
        slot.data.clear();
        slot.data.extend_from_slice(frame);
        slot.changed = true;
        drop(slot);
        self.dmx_sema.notify();
    }

    /// Enqueues one RDM job, rejecting it with `FailedToSend` semantics if
    /// the rdm thread isn't running or the queue is full — matching
    /// `SendRDMRequest`'s `RDM_FAILED_TO_SEND` fallback.
    fn enqueue(&self, job: RdmJob) -> Result<(), RdmJob> {
        if self.rdm_handle.is_none() {
            return Err(job);
        }
        let mut queue = self.rdm_queue.lock().unwrap();
        if queue.len() >= RDM_QUEUE_MAX_LENGTH {
            return Err(job);
        }
        queue.push_back(job);
        drop(queue);
        self.rdm_sema.notify();
        Ok(())
    }

    /// Enqueues a GET/SET request. Rejects up front, without touching the
    /// queue, a request addressed with `DiscoveryCommand` (discovery is only
    /// ever driven through [`ThreadHandles::run_full_discovery`]/
    /// [`ThreadHandles::run_incremental_discovery`]) or one addressed to a
    /// UID outside the current table of devices.
    pub fn send_rdm_request(
        &self,
        destination: Uid,
        command_class: RequestCommandClass,
        parameter_id: u16,
        parameter_data: DataPack,
        callback: impl FnOnce(Result<RdmResponse, RdmError>) + Send + 'static,
    ) {
        if command_class == RequestCommandClass::DiscoveryCommand {
            callback(Err(RdmError::DiscoveryNotSupported));
            return;
        }
        if !self.widget.tod().contains(destination) {
            callback(Err(RdmError::UnknownUid(destination)));
            return;
        }

        let job = RdmJob::Request {
            destination,
            command_class,
            parameter_id,
            parameter_data,
            callback: Box::new(callback),
        };
        if let Err(RdmJob::Request { callback, .. }) = self.enqueue(job) {
            callback(Err(RdmError::PortStopped));
        }
    }

    pub fn run_full_discovery(&self, callback: impl FnOnce(UidSet) + Send + 'static) {
        let job = RdmJob::FullDiscovery {
            callback: Box::new(callback),
        };
        if let Err(RdmJob::FullDiscovery { callback }) = self.enqueue(job) {
            callback(self.widget.tod());
        }
    }

    pub fn run_incremental_discovery(
        &self,
        callback: impl FnOnce(UidSet, UidSet) + Send + 'static,
    ) {
        let job = RdmJob::IncrementalDiscovery {
            callback: Box::new(callback),
        };
        if let Err(RdmJob::IncrementalDiscovery { callback }) = self.enqueue(job) {
            callback(self.widget.tod(), UidSet::new());
        }
    }
}

impl<T: Transport + 'static> Drop for ThreadHandles<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dmx_thread<T: Transport + 'static>(
    widget: Arc<Widget<T>>,
    dmx_refresh_ms: u32,
    dmx_sema: Arc<Semaphore>,
    dmx_slot: Arc<Mutex<DmxSlot>>,
    exit_flag: Arc<AtomicBool>,
) {
    let refresh_period = Duration::from_millis(dmx_refresh_ms as u64);
    let mut frame = vec![0u8; crate::consts::DMX_MAX_LENGTH];
    let mut last_sent = Instant::now();

    while !exit_flag.load(Ordering::Acquire) {
        let acquired = dmx_sema.wait_for(refresh_period);

        let mut changed = false;
        if acquired {
            let mut slot = dmx_slot.lock().unwrap();
            changed = slot.changed;
            if changed {
                frame.clear();
                frame.extend_from_slice(&slot.data);
                slot.changed = false;
            }
        }

        if changed {
            widget.write_dmx(&frame);
            last_sent = Instant::now();
        }

        if !acquired || last_sent.elapsed() > refresh_period {
            let slot = dmx_slot.lock().unwrap();
            frame.clear();
            frame.extend_from_slice(&slot.data);
            drop(slot);
            widget.write_dmx(&frame);
            last_sent = Instant::now();
        }
    }
}

fn rdm_thread<T: Transport + 'static>(
    widget: Arc<Widget<T>>,
    rdm_queue: Arc<Mutex<std::collections::VecDeque<RdmJob>>>,
    rdm_sema: Arc<Semaphore>,
    exit_flag: Arc<AtomicBool>,
) {
    let timeout = Duration::from_millis(RDM_QUEUE_SEMA_TIMEOUT_MS);

    while !exit_flag.load(Ordering::Acquire) {
        if !rdm_sema.wait_for(timeout) {
            continue;
        }

        let job = {
            let mut queue = rdm_queue.lock().unwrap();
            queue.pop_front()
        };

        let Some(job) = job else { continue };

        match job {
            RdmJob::Request {
                destination,
                command_class,
                parameter_id,
                parameter_data,
                callback,
            } => {
                let result =
                    widget.send_get_or_set(destination, command_class, parameter_id, parameter_data);
                callback(result);
            },
            RdmJob::FullDiscovery { callback } => {
                let tod = widget.full_rdm_discovery().unwrap_or_else(|err| {
                    debug!("full discovery failed: {err}");
                    widget.tod()
                });
                callback(tod);
            },
            RdmJob::IncrementalDiscovery { callback } => {
                let (added, removed) =
                    widget
                        .incremental_rdm_discovery()
                        .unwrap_or_else(|err| {
                            debug!("incremental discovery failed: {err}");
                            (UidSet::new(), UidSet::new())
                        });
                callback(added, removed);
            },
        }
    }
}
