//! Output-side DMX512 (ANSI E1.11) and RDM (ANSI E1.20) plugin core for an
//! FTDI-based USB/RS485 adapter: a continuous DMX refresh thread, a serialized
//! RDM transaction thread, and table-of-devices discovery (full + incremental,
//! including managed-proxy sub-trees) behind a small [`port::Port`] facade.
//!
//! Please refer to the [official specifications](https://tsp.esta.org/)
//! published by the ESTA for the wire protocols this crate implements.
//!
//! # Usage
//!
//! ```no_run
//! use openrdm_widget::config::PortConfig;
//! use openrdm_widget::port::Port;
//!
//! let port = Port::open(PortConfig::new("s:0x0403:0x6001:00418TL8")).unwrap();
//!
//! // Continuously refresh a DMX universe.
//! port.write_dmx(&[255u8; 512]);
//!
//! // Discover RDM devices and identify the first one found.
//! port.run_full_discovery(|tod| {
//!     for uid in tod.iter() {
//!         println!("found RDM device {uid}");
//!     }
//! });
//! ```

pub mod command_class;
pub mod config;
pub mod consts;
pub mod error;
mod layouts;
mod pids;
pub mod port;
pub mod rdm_codec;
mod semaphore;
mod threads;
pub mod transport;
pub mod types;
pub mod uid;
pub mod widget;
