use core::cell::{Cell, RefCell};
use core::mem::{discriminant, Discriminant};

use bt_hci::param::{BdAddr, ConnHandle, DisconnectReason};

use crate::advertise::AdvertisementDescriptor;
use crate::connection::ConnParams;
use crate::phy::{Phy, PhyPair};
use crate::radio::RadioController;
use crate::scan::ScanParams;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Enable(Phy),
    Disable,
    SetAddress(BdAddr),
    ConfigureAdvSet(AdvertisementDescriptor),
    StartAdv,
    StopAdv,
    StartScan(ScanParams),
    StopScan,
    UpdateConnParams(ConnHandle, ConnParams),
    UpdatePhy(ConnHandle, PhyPair),
    Disconnect(ConnHandle, DisconnectReason),
    RejectPairing(ConnHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

/// Records every call. Failures are armed per call kind.
pub struct MockController {
    calls: RefCell<Vec<Call>>,
    failures: RefCell<Vec<Discriminant<Call>>>,
    coded: Cell<bool>,
    address: Cell<BdAddr>,
}

impl MockController {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            failures: RefCell::new(Vec::new()),
            coded: Cell::new(true),
            address: Cell::new(BdAddr::new([0x11, 0x22, 0x33, 0x44, 0x55, 0xc6])),
        }
    }

    /// Make the next call of the same kind as `call` fail.
    pub fn fail_next(&self, call: Call) {
        self.failures.borrow_mut().push(discriminant(&call));
    }

    pub fn set_coded_support(&self, supported: bool) {
        self.coded.set(supported);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| f(c)).count()
    }

    fn record(&self, call: Call) -> Result<(), MockError> {
        let kind = discriminant(&call);
        self.calls.borrow_mut().push(call);
        let mut failures = self.failures.borrow_mut();
        if let Some(pos) = failures.iter().position(|f| *f == kind) {
            failures.remove(pos);
            return Err(MockError);
        }
        Ok(())
    }
}

impl RadioController for MockController {
    type Error = MockError;

    fn enable(&self, modulation: Phy) -> Result<(), Self::Error> {
        self.record(Call::Enable(modulation))
    }

    fn disable(&self) -> Result<(), Self::Error> {
        self.record(Call::Disable)
    }

    fn address(&self) -> Result<BdAddr, Self::Error> {
        Ok(self.address.get())
    }

    fn set_address(&self, address: BdAddr) -> Result<(), Self::Error> {
        self.record(Call::SetAddress(address))?;
        self.address.set(address);
        Ok(())
    }

    fn supports_coded_phy(&self) -> bool {
        self.coded.get()
    }

    fn configure_adv_set(&self, descriptor: &AdvertisementDescriptor) -> Result<(), Self::Error> {
        self.record(Call::ConfigureAdvSet(descriptor.clone()))
    }

    fn start_adv(&self) -> Result<(), Self::Error> {
        self.record(Call::StartAdv)
    }

    fn stop_adv(&self) -> Result<(), Self::Error> {
        self.record(Call::StopAdv)
    }

    fn start_scan(&self, params: &ScanParams) -> Result<(), Self::Error> {
        self.record(Call::StartScan(*params))
    }

    fn stop_scan(&self) -> Result<(), Self::Error> {
        self.record(Call::StopScan)
    }

    fn update_conn_params(&self, handle: ConnHandle, params: &ConnParams) -> Result<(), Self::Error> {
        self.record(Call::UpdateConnParams(handle, *params))
    }

    fn update_phy(&self, handle: ConnHandle, phys: PhyPair) -> Result<(), Self::Error> {
        self.record(Call::UpdatePhy(handle, phys))
    }

    fn disconnect(&self, handle: ConnHandle, reason: DisconnectReason) -> Result<(), Self::Error> {
        self.record(Call::Disconnect(handle, reason))
    }

    fn reject_pairing(&self, handle: ConnHandle) -> Result<(), Self::Error> {
        self.record(Call::RejectPairing(handle))
    }
}
