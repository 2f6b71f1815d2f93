//! Radio controller interface and ownership of the radio among roles.
use bt_hci::param::{BdAddr, ConnHandle, DisconnectReason};

use crate::advertise::AdvertisementDescriptor;
use crate::connection::ConnParams;
use crate::phy::{Phy, PhyPair};
use crate::scan::ScanParams;
use crate::{Error, RadioError};

/// Link layer controller driven by the engine.
///
/// Every method is called with the engine state locked, possibly from the radio interrupt, and
/// must return without waiting on the air.
pub trait RadioController {
    /// Controller specific error.
    type Error;

    /// Power up the link layer with the given default modulation.
    fn enable(&self, modulation: Phy) -> Result<(), Self::Error>;

    /// Power down the link layer.
    fn disable(&self) -> Result<(), Self::Error>;

    /// Random static device address in use.
    fn address(&self) -> Result<BdAddr, Self::Error>;

    /// Replace the random static device address.
    fn set_address(&self, address: BdAddr) -> Result<(), Self::Error>;

    /// Whether the controller can use the coded PHY.
    fn supports_coded_phy(&self) -> bool;

    /// Load an advertising set. Replaces any previous set.
    fn configure_adv_set(&self, descriptor: &AdvertisementDescriptor) -> Result<(), Self::Error>;

    /// Start advertising the configured set.
    fn start_adv(&self) -> Result<(), Self::Error>;

    /// Stop advertising.
    fn stop_adv(&self) -> Result<(), Self::Error>;

    /// Start scanning. The controller reports `ScanTimeout` when `params.timeout` elapses.
    fn start_scan(&self, params: &ScanParams) -> Result<(), Self::Error>;

    /// Stop scanning.
    fn stop_scan(&self) -> Result<(), Self::Error>;

    /// Ask the central for new connection parameters.
    fn update_conn_params(&self, handle: ConnHandle, params: &ConnParams) -> Result<(), Self::Error>;

    /// Propose or answer a PHY update.
    fn update_phy(&self, handle: ConnHandle, phys: PhyPair) -> Result<(), Self::Error>;

    /// Terminate a connection.
    fn disconnect(&self, handle: ConnHandle, reason: DisconnectReason) -> Result<(), Self::Error>;

    /// Answer a security request with "pairing not supported".
    fn reject_pairing(&self, handle: ConnHandle) -> Result<(), Self::Error>;
}

/// Role that may own the radio.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioRole {
    Advertising,
    Gatt,
    Mesh,
}

/// Outcome of a successful [`RadioOwnership::acquire`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// The radio was down and has been brought up for this role.
    BroughtUp,
    /// The role already held the radio.
    AlreadyHeld,
}

/// Radio on/off notification delivered by the controller.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioActivity {
    /// The radio is about to transmit or receive.
    BeforeRadioOn,
    /// The radio has just turned off.
    AfterRadioOff,
}

/// Handler for [`RadioActivity`], called in interrupt context.
pub type ActivityHandler = fn(RadioActivity);

/// Tracks which role brought the radio up.
#[derive(Debug, Default)]
pub struct RadioOwnership {
    owner: Option<RadioRole>,
}

impl RadioOwnership {
    pub const fn new() -> Self {
        Self { owner: None }
    }

    /// Claim the radio for `role`, bringing the controller up if nobody holds it.
    pub fn acquire<C: RadioController>(
        &mut self,
        role: RadioRole,
        controller: &C,
        modulation: Phy,
    ) -> Result<Acquisition, RadioError<C::Error>> {
        match self.owner {
            Some(owner) if owner == role => Ok(Acquisition::AlreadyHeld),
            Some(owner) => {
                debug!("[radio] {:?} denied, radio held by {:?}", role, owner);
                Err(Error::AlreadyOwned.into())
            }
            None => {
                if modulation == Phy::LeCoded && !controller.supports_coded_phy() {
                    return Err(Error::NotSupported.into());
                }
                controller.enable(modulation).map_err(RadioError::Controller)?;
                self.owner = Some(role);
                debug!("[radio] up, owner {:?}", role);
                Ok(Acquisition::BroughtUp)
            }
        }
    }

    /// Give the radio back and power it down. Releasing an unowned radio does nothing.
    pub fn release<C: RadioController>(&mut self, role: RadioRole, controller: &C) -> Result<(), RadioError<C::Error>> {
        match self.owner {
            None => Ok(()),
            Some(owner) if owner != role => Err(Error::Forbidden.into()),
            Some(_) => {
                self.owner = None;
                debug!("[radio] down, released by {:?}", role);
                controller.disable().map_err(RadioError::Controller)
            }
        }
    }

    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }

    pub fn owner(&self) -> Option<RadioRole> {
        self.owner
    }
}

/// Single slot for the radio activity handler.
#[derive(Default)]
pub(crate) struct ActivitySlot {
    handler: Option<ActivityHandler>,
}

impl ActivitySlot {
    pub(crate) const fn new() -> Self {
        Self { handler: None }
    }

    /// Install or clear the handler. An installed handler is never replaced by another one.
    pub(crate) fn set(&mut self, handler: Option<ActivityHandler>) -> Result<(), Error> {
        match (handler, self.handler) {
            (Some(_), Some(_)) => Err(Error::InvalidState),
            (handler, _) => {
                self.handler = handler;
                Ok(())
            }
        }
    }

    pub(crate) fn handler(&self) -> Option<ActivityHandler> {
        self.handler
    }
}
