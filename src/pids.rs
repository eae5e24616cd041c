//! RDM parameter IDs used by the widget's discovery and proxy-TOD logic.
//!
//! Responder-only PIDs (`IDENTIFY_DEVICE`, `DEVICE_INFO`, ...) aren't needed by
//! a controller-side widget and live only in the original plugin; they were
//! dropped rather than carried along unused.

pub use crate::consts::{
    RDM_PID_DISC_MUTE as DISC_MUTE, RDM_PID_DISC_UNIQUE_BRANCH as DISC_UNIQUE_BRANCH,
    RDM_PID_DISC_UNMUTE as DISC_UN_MUTE, RDM_PID_PROXIED_DEVICES as PROXIED_DEVICES,
    RDM_PID_PROXY_DEV_COUNT as PROXY_DEV_COUNT, RDM_PID_QUEUED_MESSAGE as QUEUED_MESSAGE,
};
