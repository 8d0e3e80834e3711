/// Configuration for the channel layer.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Bytes held back from the transport's maximum payload size when
    /// sizing fragment chunks. Covers the 49-byte frame header plus any
    /// per-call overhead the transport adds below this layer.
    pub reserved_margin: u32,
    /// Service type assigned to sessions the transport accepts on our
    /// behalf (server side), where no caller supplied one.
    pub default_service_type: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reserved_margin: 512,
            default_service_type: 0,
        }
    }
}
