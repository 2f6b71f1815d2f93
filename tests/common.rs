use std::cell::{Cell, RefCell};

use bt_hci::param::{BdAddr, ConnHandle, DisconnectReason};
use trouble_radio::advertise::AdvertisementDescriptor;
use trouble_radio::connection::ConnParams;
use trouble_radio::phy::{Phy, PhyPair};
use trouble_radio::scan::ScanParams;
use trouble_radio::RadioController;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, PartialEq)]
#[allow(unused)]
pub enum Op {
    Enable(Phy),
    Disable,
    SetAddress(BdAddr),
    Configure(AdvertisementDescriptor),
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
pub struct Refused;

/// Controller that accepts everything except what the test scripts it to refuse.
#[derive(Default)]
pub struct ScriptedController {
    ops: RefCell<Vec<Op>>,
    refuse_conn_params: Cell<bool>,
    refuse_start_adv: Cell<usize>,
    address: Cell<BdAddr>,
}

#[allow(unused)]
impl ScriptedController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_conn_params(&self, refuse: bool) {
        self.refuse_conn_params.set(refuse);
    }

    pub fn refuse_start_adv(&self, times: usize) {
        self.refuse_start_adv.set(times);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.borrow().clone()
    }

    pub fn count(&self, f: impl Fn(&Op) -> bool) -> usize {
        self.ops.borrow().iter().filter(|op| f(op)).count()
    }

    pub fn configured(&self) -> Vec<AdvertisementDescriptor> {
        self.ops
            .borrow()
            .iter()
            .filter_map(|op| match op {
                Op::Configure(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    fn log(&self, op: Op) {
        self.ops.borrow_mut().push(op);
    }
}

impl RadioController for ScriptedController {
    type Error = Refused;

    fn enable(&self, modulation: Phy) -> Result<(), Self::Error> {
        self.log(Op::Enable(modulation));
        Ok(())
    }

    fn disable(&self) -> Result<(), Self::Error> {
        self.log(Op::Disable);
        Ok(())
    }

    fn address(&self) -> Result<BdAddr, Self::Error> {
        Ok(self.address.get())
    }

    fn set_address(&self, address: BdAddr) -> Result<(), Self::Error> {
        self.log(Op::SetAddress(address));
        self.address.set(address);
        Ok(())
    }

    fn supports_coded_phy(&self) -> bool {
        true
    }

    fn configure_adv_set(&self, descriptor: &AdvertisementDescriptor) -> Result<(), Self::Error> {
        self.log(Op::Configure(descriptor.clone()));
        Ok(())
    }

    fn start_adv(&self) -> Result<(), Self::Error> {
        self.log(Op::StartAdv);
        match self.refuse_start_adv.get() {
            0 => Ok(()),
            n => {
                self.refuse_start_adv.set(n - 1);
                Err(Refused)
            }
        }
    }

    fn stop_adv(&self) -> Result<(), Self::Error> {
        self.log(Op::StopAdv);
        Ok(())
    }

    fn start_scan(&self, params: &ScanParams) -> Result<(), Self::Error> {
        self.log(Op::StartScan(*params));
        Ok(())
    }

    fn stop_scan(&self) -> Result<(), Self::Error> {
        self.log(Op::StopScan);
        Ok(())
    }

    fn update_conn_params(&self, handle: ConnHandle, params: &ConnParams) -> Result<(), Self::Error> {
        self.log(Op::UpdateConnParams(handle, *params));
        if self.refuse_conn_params.get() {
            Err(Refused)
        } else {
            Ok(())
        }
    }

    fn update_phy(&self, handle: ConnHandle, phys: PhyPair) -> Result<(), Self::Error> {
        self.log(Op::UpdatePhy(handle, phys));
        Ok(())
    }

    fn disconnect(&self, handle: ConnHandle, reason: DisconnectReason) -> Result<(), Self::Error> {
        self.log(Op::Disconnect(handle, reason));
        Ok(())
    }

    fn reject_pairing(&self, handle: ConnHandle) -> Result<(), Self::Error> {
        self.log(Op::RejectPairing(handle));
        Ok(())
    }
}
