use netprop::SnapshotConfig;

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub ticks: u32,
    pub tick_rate: u32,
    /// Sleep between ticks instead of running flat out.
    pub realtime: bool,
    pub entities: usize,
    pub clients: usize,
    /// Clients verify their reconstructed state against the server every N snapshots.
    pub verify_interval: u32,
    pub stats_interval: u32,
    pub snapshot: SnapshotConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ticks: 600,
            tick_rate: 60,
            realtime: false,
            entities: 64,
            clients: 4,
            verify_interval: 30,
            stats_interval: 120,
            snapshot: SnapshotConfig::default(),
        }
    }
}
