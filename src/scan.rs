//! Passive scanning.
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Duration;
use heapless::Vec;

use crate::ad_structure::AdStructure;
use crate::codec;
use crate::config::SCAN_REPORT_DEFAULT_MAX_LEN;
use crate::event::RawScanReport;
use crate::host::RadioContext;
use crate::phy::{ChannelMask, Phy, PhySet};
use crate::radio::{RadioController, RadioOwnership};
use crate::{Error, RadioError};

/// Longest scan window interval accepted.
pub const SCAN_INTERVAL_MAX_MS: u32 = 10_000;
/// Largest payload a report can carry.
pub const SCAN_REPORT_MAX_LEN: usize = 255;

/// Scanner configuration.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    /// PHYs to listen on. Reports on other PHYs are dropped.
    pub phys: PhySet,
    pub channels: ChannelMask,
    /// Reports with a longer payload are dropped.
    pub max_payload_len: usize,
}

impl ScanConfig {
    const DEFAULT: ScanConfig = ScanConfig {
        phys: PhySet::M1M2,
        channels: ChannelMask::ALL,
        max_payload_len: SCAN_REPORT_DEFAULT_MAX_LEN,
    };
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Parameters handed to the controller when scanning starts.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParams {
    pub interval: Duration,
    pub window: Duration,
    /// Total scan duration, one interval per active channel.
    pub timeout: Duration,
    pub phys: PhySet,
    pub channels: ChannelMask,
}

/// Advertisement received while scanning.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Advertiser address, most significant byte first.
    pub addr: [u8; 6],
    pub rssi: i8,
    pub payload: Vec<u8, SCAN_REPORT_MAX_LEN>,
    pub primary_phy: Phy,
    pub secondary_phy: Option<Phy>,
    pub channel_index: u8,
    pub tx_power: Option<i8>,
}

impl ScanReport {
    pub fn is_coded_phy(&self) -> bool {
        self.primary_phy == Phy::LeCoded
    }

    /// Parse the payload as advertising data structures.
    pub fn ad_structures(&self) -> impl Iterator<Item = Result<AdStructure<'_>, codec::Error>> {
        AdStructure::decode(&self.payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanPhase {
    Idle,
    Scanning,
}

pub(crate) struct ScannerState {
    phase: ScanPhase,
    config: ScanConfig,
    params: Option<ScanParams>,
}

impl ScannerState {
    pub(crate) const fn new() -> Self {
        Self {
            phase: ScanPhase::Idle,
            config: ScanConfig::DEFAULT,
            params: None,
        }
    }

    fn configure(&mut self, config: ScanConfig) -> Result<(), Error> {
        if self.phase == ScanPhase::Scanning {
            return Err(Error::InvalidState);
        }
        if config.channels.is_empty() || config.max_payload_len > SCAN_REPORT_MAX_LEN {
            return Err(Error::InvalidParam);
        }
        self.config = config;
        Ok(())
    }

    pub(crate) fn start<C: RadioController>(
        &mut self,
        ownership: &RadioOwnership,
        controller: &C,
        interval_ms: u32,
        window_ms: u32,
    ) -> Result<ScanParams, RadioError<C::Error>> {
        if self.phase == ScanPhase::Scanning || !ownership.is_owned() {
            return Err(Error::InvalidState.into());
        }
        if self.config.phys.has_coded() && !controller.supports_coded_phy() {
            return Err(Error::InvalidState.into());
        }
        if window_ms == 0 || window_ms > interval_ms || interval_ms > SCAN_INTERVAL_MAX_MS {
            return Err(Error::InvalidParam.into());
        }

        let timeout_ms = interval_ms as u64 * self.config.channels.active_count() as u64;
        let params = ScanParams {
            interval: Duration::from_millis(interval_ms as u64),
            window: Duration::from_millis(window_ms as u64),
            timeout: Duration::from_millis(timeout_ms),
            phys: self.config.phys,
            channels: self.config.channels,
        };
        controller.start_scan(&params).map_err(RadioError::Controller)?;
        debug!("[scan] started, timeout {} ms", timeout_ms);
        self.phase = ScanPhase::Scanning;
        self.params = Some(params);
        Ok(params)
    }

    pub(crate) fn stop<C: RadioController>(&mut self, controller: &C) -> Result<(), RadioError<C::Error>> {
        if self.phase == ScanPhase::Idle {
            return Ok(());
        }
        self.phase = ScanPhase::Idle;
        controller.stop_scan().map_err(RadioError::Controller)
    }

    /// Filter and copy a report. Returns `None` for reports the configuration excludes.
    pub(crate) fn on_report(&self, raw: &RawScanReport<'_>) -> Option<ScanReport> {
        if self.phase != ScanPhase::Scanning {
            return None;
        }
        let data_phy = raw.secondary_phy.unwrap_or(raw.primary_phy);
        if !self.config.phys.contains(raw.primary_phy) || !self.config.phys.contains(data_phy) {
            trace!("[scan] dropping report on {:?}", data_phy);
            return None;
        }
        if raw.data.len() > self.config.max_payload_len {
            trace!("[scan] dropping {} byte report", raw.data.len());
            return None;
        }
        let payload = Vec::from_slice(raw.data).ok()?;
        let mut addr = raw.addr;
        addr.reverse();
        Some(ScanReport {
            addr,
            rssi: raw.rssi,
            payload,
            primary_phy: raw.primary_phy,
            secondary_phy: raw.secondary_phy,
            channel_index: raw.channel_index,
            tx_power: raw.tx_power,
        })
    }

    /// The controller ended the scan. Returns whether a scan was running.
    pub(crate) fn on_timeout(&mut self) -> bool {
        let was_scanning = self.phase == ScanPhase::Scanning;
        self.phase = ScanPhase::Idle;
        was_scanning
    }
}

/// Handle for the scanning role.
pub struct Scanner<'d, M: RawMutex, C: RadioController> {
    ctx: &'d RadioContext<M, C>,
}

impl<'d, M: RawMutex, C: RadioController> Scanner<'d, M, C> {
    pub(crate) fn new(ctx: &'d RadioContext<M, C>) -> Self {
        Self { ctx }
    }

    /// Replace the scan configuration. Not allowed while scanning.
    pub fn set_config(&mut self, config: ScanConfig) -> Result<(), Error> {
        self.ctx.with_state(|state| state.scanner.configure(config))
    }

    pub fn config(&self) -> ScanConfig {
        self.ctx.with_state(|state| state.scanner.config)
    }

    /// Start scanning with a window of `window_ms` every `interval_ms`.
    ///
    /// The scan ends by itself after one interval per active channel, raising
    /// [`CommEvent::Timeout`](crate::event::CommEvent::Timeout).
    pub fn start(&mut self, interval_ms: u32, window_ms: u32) -> Result<ScanParams, RadioError<C::Error>> {
        let controller = &self.ctx.controller;
        self.ctx.with_state(|state| {
            state
                .scanner
                .start(&state.ownership, controller, interval_ms, window_ms)
        })
    }

    /// Stop scanning. Does nothing when idle.
    pub fn stop(&mut self) -> Result<(), RadioError<C::Error>> {
        let controller = &self.ctx.controller;
        self.ctx.with_state(|state| state.scanner.stop(controller))
    }

    /// Interval and window of the running scan.
    pub fn scan_window(&self) -> Option<(Duration, Duration)> {
        self.ctx.with_state(|state| match state.scanner.phase {
            ScanPhase::Scanning => state.scanner.params.map(|p| (p.interval, p.window)),
            ScanPhase::Idle => None,
        })
    }

    pub fn is_scanning(&self) -> bool {
        self.ctx.with_state(|state| state.scanner.phase == ScanPhase::Scanning)
    }
}
