//! Connection parameters and per-link state.
use bt_hci::param::ConnHandle;
use embassy_time::Duration;

use crate::phy::PhyPair;

/// Supervision timeout shared by every preset.
pub const SUPERVISION_TIMEOUT: Duration = Duration::from_millis(6000);

/// Connection parameter presets a peripheral can ask for.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnPreset {
    /// Shortest interval, for bulk transfers.
    Turbo,
    /// Balanced default.
    #[default]
    Standard,
    /// Longest interval, for idle links.
    LowPower,
}

impl ConnPreset {
    pub fn params(&self) -> ConnParams {
        let (min, max, slave_latency) = match self {
            ConnPreset::Turbo => (15, 30, 0),
            ConnPreset::Standard => (480, 510, 1),
            ConnPreset::LowPower => (1950, 1980, 0),
        };
        ConnParams {
            min_interval: Duration::from_millis(min),
            max_interval: Duration::from_millis(max),
            slave_latency,
            supervision_timeout: SUPERVISION_TIMEOUT,
        }
    }
}

/// Connection interval range, latency and supervision timeout.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnParams {
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub slave_latency: u16,
    pub supervision_timeout: Duration,
}

impl ConnParams {
    /// Whether parameters granted by the central satisfy this request.
    pub fn accepts(&self, granted: &ConnParams) -> bool {
        granted.min_interval >= self.min_interval
            && granted.max_interval <= self.max_interval
            && granted.min_interval <= granted.max_interval
            && granted.slave_latency == self.slave_latency
            && granted.supervision_timeout == self.supervision_timeout
    }
}

/// State of the one link a peripheral keeps.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub handle: ConnHandle,
    pub phy: PhyPair,
    pub negotiated_params: ConnParams,
    pub retry_count: u8,
}

impl ConnectionState {
    pub(crate) fn new(handle: ConnHandle) -> Self {
        Self {
            handle,
            phy: PhyPair::default(),
            negotiated_params: ConnPreset::default().params(),
            retry_count: 0,
        }
    }
}
