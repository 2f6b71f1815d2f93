//! Shared radio context and event dispatch.
//!
//! A [`RadioContext`] owns the controller and the state of every role. Role handles borrow it,
//! the radio interrupt feeds it through [`RadioContext::dispatch`], and the application drains
//! outcomes with [`RadioContext::next_event`].
use core::cell::RefCell;

use bt_hci::param::BdAddr;

use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Instant, Timer};

use crate::advertiser::{Advertiser, AdvertiserState};
use crate::config::EVENT_QUEUE_SIZE;
use crate::event::{CommEvent, RadioEvent};
use crate::gatt_link::{GattLinkManager, LinkState};
use crate::phy::Phy;
use crate::radio::{ActivityHandler, ActivitySlot, RadioController, RadioOwnership, RadioRole};
use crate::scan::{Scanner, ScannerState};
use crate::{Error, RadioError};

/// Radio wide configuration.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RadioConfig {
    /// Modulation for extended advertising and connections.
    pub modulation: Phy,
}

pub(crate) struct State {
    pub(crate) ownership: RadioOwnership,
    pub(crate) advertiser: AdvertiserState,
    pub(crate) scanner: ScannerState,
    pub(crate) link: LinkState,
    pub(crate) activity: ActivitySlot,
}

impl State {
    const fn new() -> Self {
        Self {
            ownership: RadioOwnership::new(),
            advertiser: AdvertiserState::new(),
            scanner: ScannerState::new(),
            link: LinkState::new(),
            activity: ActivitySlot::new(),
        }
    }
}

/// Everything the radio engine needs, shared by reference between the application, the radio
/// interrupt and the timer task.
///
/// Use a `CriticalSectionRawMutex` when [`dispatch`](Self::dispatch) runs in an interrupt.
pub struct RadioContext<M: RawMutex, C: RadioController> {
    pub(crate) controller: C,
    pub(crate) config: RadioConfig,
    state: Mutex<M, RefCell<State>>,
    events: Channel<M, CommEvent, EVENT_QUEUE_SIZE>,
    timer: Signal<M, ()>,
}

impl<M: RawMutex, C: RadioController> RadioContext<M, C> {
    pub fn new(controller: C, config: RadioConfig) -> Self {
        Self {
            controller,
            config,
            state: Mutex::new(RefCell::new(State::new())),
            events: Channel::new(),
            timer: Signal::new(),
        }
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            f(&mut state)
        })
    }

    pub(crate) fn wake_timer(&self) {
        self.timer.signal(());
    }

    fn notify(&self, event: CommEvent) {
        if let Err(e) = self.events.try_send(event) {
            warn!("[radio] event queue full, dropping {:?}", e);
        }
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    pub fn advertiser(&self) -> Advertiser<'_, M, C> {
        Advertiser::new(self)
    }

    pub fn scanner(&self) -> Scanner<'_, M, C> {
        Scanner::new(self)
    }

    pub fn gatt_link(&self) -> GattLinkManager<'_, M, C> {
        GattLinkManager::new(self)
    }

    pub fn is_owned(&self) -> bool {
        self.with_state(|state| state.ownership.is_owned())
    }

    pub fn owner(&self) -> Option<RadioRole> {
        self.with_state(|state| state.ownership.owner())
    }

    /// Random static address of the radio. Fails with `InvalidState` while no role holds the radio.
    pub fn address(&self) -> Result<BdAddr, RadioError<C::Error>> {
        if !self.is_owned() {
            return Err(Error::InvalidState.into());
        }
        self.controller.address().map_err(RadioError::Controller)
    }

    /// Change the random static address of the radio. Fails with `InvalidState` while no role
    /// holds the radio.
    pub fn set_address(&self, address: BdAddr) -> Result<(), RadioError<C::Error>> {
        if !self.is_owned() {
            return Err(Error::InvalidState.into());
        }
        debug!("[radio] address {:?}", address);
        self.controller.set_address(address).map_err(RadioError::Controller)
    }

    /// Install the radio activity handler, or clear it with `None`.
    ///
    /// An installed handler must be cleared before another one can be installed.
    pub fn set_activity_handler(&self, handler: Option<ActivityHandler>) -> Result<(), Error> {
        self.with_state(|state| state.activity.set(handler))
    }

    /// Feed a controller event to the roles.
    ///
    /// Safe to call from the radio interrupt: it never waits, and outcomes that do not fit the
    /// event queue are dropped with a warning. The activity handler runs after the state lock is
    /// released, so it may call back into the context.
    pub fn dispatch(&self, event: RadioEvent<'_>) {
        if let RadioEvent::RadioActivity(activity) = event {
            if let Some(handler) = self.with_state(|state| state.activity.handler()) {
                handler(activity);
            }
            return;
        }

        let controller = &self.controller;
        let modulation = self.config.modulation;
        let now = Instant::now();
        let mut notify = |e: CommEvent| self.notify(e);

        self.with_state(|state| match event {
            RadioEvent::Connected { handle } => {
                state.advertiser.on_connected(&mut notify);
                state.link.on_connected(handle, controller, modulation);
                notify(CommEvent::Connected(handle));
            }
            RadioEvent::Disconnected { handle, reason } => {
                state.link.on_disconnected(handle);
                state.advertiser.on_disconnected(&mut notify);
                notify(CommEvent::Disconnected { handle, reason });
            }
            RadioEvent::PhyUpdateRequest { handle } => {
                state.link.propose_phy(handle, controller, modulation);
            }
            RadioEvent::PhyUpdated { handle, phys } => {
                state.link.on_phy_updated(handle, phys, &mut notify);
            }
            RadioEvent::PhyUpdateFailed { handle, status } => {
                warn!("[radio] PHY update on {:?} failed: {:#x}", handle, status);
            }
            RadioEvent::ConnParamsUpdated { handle, params } => {
                state
                    .link
                    .on_params_updated(handle, params, now, controller, &mut notify);
            }
            RadioEvent::ConnParamsUpdateFailed { handle } => {
                state.link.on_params_update_failed(handle, now, controller);
            }
            RadioEvent::SecurityRequest { handle } => {
                state.link.on_security_request(handle, controller);
            }
            RadioEvent::AdvSetTerminated => {
                state.advertiser.on_set_terminated(controller, &mut notify);
            }
            RadioEvent::ScanReport(raw) => {
                if let Some(report) = state.scanner.on_report(&raw) {
                    notify(CommEvent::Received(report));
                }
            }
            RadioEvent::ScanTimeout => {
                if state.scanner.on_timeout() {
                    notify(CommEvent::Timeout);
                }
            }
            RadioEvent::RadioActivity(_) => {}
        });
        // Deadlines may have moved.
        self.wake_timer();
    }

    /// Earliest pending timer, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.with_state(|state| state.link.next_deadline())
    }

    /// Run timers that are due at `now`.
    pub fn process_timers(&self, now: Instant) {
        let controller = &self.controller;
        self.with_state(|state| state.link.process_timers(now, controller));
    }

    /// Drive timers forever.
    pub async fn run(&self) -> ! {
        loop {
            match self.next_deadline() {
                Some(deadline) => {
                    select(Timer::at(deadline), self.timer.wait()).await;
                }
                None => self.timer.wait().await,
            }
            self.process_timers(Instant::now());
        }
    }

    /// Wait for the next outcome.
    pub async fn next_event(&self) -> CommEvent {
        self.events.receive().await
    }

    /// Take the next outcome if one is queued.
    pub fn try_next_event(&self) -> Option<CommEvent> {
        self.events.try_receive().ok()
    }
}
