//! Port configuration, mirroring the teacher's `DmxControllerConfig` pattern.

/// Configuration for a single widget port.
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial port description understood by the transport, e.g.
    /// `s:0x0403:0x6001:00418TL8` or a plain device path.
    pub description: String,
    /// DMX refresh period in milliseconds; the widget re-sends the last frame
    /// at least this often even if nothing changed.
    pub dmx_refresh_ms: u32,
    /// Whether the RDM thread and RDM-capable operations are enabled at all.
    pub rdm_enabled: bool,
}

impl PortConfig {
    pub fn new(description: impl Into<String>) -> Self {
        PortConfig {
            description: description.into(),
            dmx_refresh_ms: crate::consts::DEFAULT_DMX_REFRESH_MS,
            rdm_enabled: true,
        }
    }

    pub fn with_dmx_refresh_ms(mut self, refresh_ms: u32) -> Self {
        self.dmx_refresh_ms = refresh_ms.clamp(
            crate::consts::MIN_DMX_REFRESH_MS,
            crate::consts::MAX_DMX_REFRESH_MS,
        );
        self
    }

    pub fn with_rdm_enabled(mut self, rdm_enabled: bool) -> Self {
        self.rdm_enabled = rdm_enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_refresh_interval_to_bounds() {
        let config = PortConfig::new("test").with_dmx_refresh_ms(1);
        assert_eq!(config.dmx_refresh_ms, crate::consts::MIN_DMX_REFRESH_MS);

        let config = PortConfig::new("test").with_dmx_refresh_ms(1_000_000);
        assert_eq!(config.dmx_refresh_ms, crate::consts::MAX_DMX_REFRESH_MS);
    }
}
