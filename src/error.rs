//! Crate-wide error taxonomy.

use thiserror::Error;

use crate::uid::Uid;

/// Errors from the serial/USB transport layer, independent of DMX/RDM semantics.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open adapter {description:?}: {source}")]
    Open {
        description: String,
        #[source]
        source: serialport::Error,
    },
    #[error("write to adapter failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("read from adapter failed: {0}")]
    Read(#[source] std::io::Error),
    #[error("timed out waiting for a response")]
    Timeout,
    #[error("adapter became unavailable and was reopened")]
    DeviceUnavailable,
}

/// Errors surfaced by a port's RDM request/response path, mirroring the
/// `rdm_response_code` values an RDM controller reports to its caller.
#[derive(Debug, Error)]
pub enum RdmError {
    #[error("failed to send request: {0}")]
    TransportFailure(#[from] TransportError),
    #[error("RDM discovery is not supported on this port")]
    DiscoveryNotSupported,
    #[error("no response from {0}")]
    Timeout(Uid),
    #[error("request addressed a broadcast UID; no response is expected")]
    WasBroadcast,
    #[error("{0} is not in the current table of devices")]
    UnknownUid(Uid),
    #[error("malformed response: {0}")]
    Malformed(#[from] crate::rdm_codec::RdmCodecError),
    #[error("responder returned NACK for parameter {parameter_id:#06x}")]
    Nacked { parameter_id: u16 },
    #[error("port is not running")]
    PortStopped,
}
