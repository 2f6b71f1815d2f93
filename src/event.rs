//! Events flowing through the engine.
//!
//! [`RadioEvent`]s come up from the controller and are handed to
//! [`RadioContext::dispatch`](crate::RadioContext::dispatch). [`CommEvent`]s go out to the
//! application through [`RadioContext::next_event`](crate::RadioContext::next_event).
use bt_hci::param::ConnHandle;

use crate::connection::ConnParams;
use crate::phy::{Phy, PhyPair};
use crate::radio::RadioActivity;
use crate::scan::ScanReport;

/// Advertising report as delivered by the controller.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct RawScanReport<'a> {
    /// Advertiser address in over-the-air order, least significant byte first.
    pub addr: [u8; 6],
    pub rssi: i8,
    pub data: &'a [u8],
    pub primary_phy: Phy,
    pub secondary_phy: Option<Phy>,
    pub channel_index: u8,
    pub tx_power: Option<i8>,
}

/// Link layer event.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub enum RadioEvent<'a> {
    /// A central connected.
    Connected { handle: ConnHandle },
    /// The link went down.
    Disconnected { handle: ConnHandle, reason: u8 },
    /// The central wants to change PHY.
    PhyUpdateRequest { handle: ConnHandle },
    /// PHY procedure completed.
    PhyUpdated { handle: ConnHandle, phys: PhyPair },
    /// PHY procedure failed, typically on a collision with a peer procedure.
    PhyUpdateFailed { handle: ConnHandle, status: u8 },
    /// The central applied new connection parameters.
    ConnParamsUpdated { handle: ConnHandle, params: ConnParams },
    /// The central rejected the parameter request or it timed out.
    ConnParamsUpdateFailed { handle: ConnHandle },
    /// The peer asked to pair.
    SecurityRequest { handle: ConnHandle },
    /// The advertising set finished its events.
    AdvSetTerminated,
    /// An advertisement was received while scanning.
    ScanReport(RawScanReport<'a>),
    /// The scan ran for its full duration.
    ScanTimeout,
    /// Radio on/off notification.
    RadioActivity(RadioActivity),
}

/// Outcome delivered to the application.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub enum CommEvent {
    Connected(ConnHandle),
    Disconnected { handle: ConnHandle, reason: u8 },
    /// An advertisement finished its repeats.
    Sent,
    /// A scan report.
    Received(ScanReport),
    /// Scanning ended without being stopped.
    Timeout,
    /// Pending advertisements were dropped.
    Aborted,
    /// The central applied parameters that satisfy the request.
    ParamsUpdated(ConnParams),
    /// The link PHY changed.
    PhyUpdated(PhyPair),
}
