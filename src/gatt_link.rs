//! GATT link supervision: PHY selection and connection parameter negotiation.
//!
//! Once a central connects, the peripheral asks for the parameters of a [`ConnPreset`]. A request
//! the controller refuses, or the central answers with parameters outside the preset, counts as
//! a failed attempt. Failed attempts are retried after a fixed backoff; after
//! [`CONN_PARAMS_MAX_RETRY`] retries the next failure disconnects the central.
use bt_hci::param::{ConnHandle, DisconnectReason};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant};

use crate::config::{CONN_PARAMS_MAX_RETRY, CONN_PARAMS_RETRY_BACKOFF_MS};
use crate::connection::{ConnParams, ConnPreset, ConnectionState};
use crate::event::CommEvent;
use crate::host::RadioContext;
use crate::phy::{Phy, PhyPair};
use crate::radio::{RadioController, RadioOwnership, RadioRole};
use crate::{Error, RadioError};

const RETRY_BACKOFF: Duration = Duration::from_millis(CONN_PARAMS_RETRY_BACKOFF_MS);

/// Link negotiation state.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    Disconnected,
    /// Connected, no parameters requested yet.
    Connected,
    /// A parameter request is scheduled or outstanding.
    ParamsPending { retry: u8 },
    /// The central granted the requested parameters.
    ParamsStable,
    /// Negotiation gave up and the link is being torn down.
    Disconnecting,
}

pub(crate) struct LinkState {
    initialized: bool,
    brought_up: bool,
    phase: LinkPhase,
    connection: Option<ConnectionState>,
    requested: Option<ConnPreset>,
    deadline: Option<Instant>,
    awaiting_result: bool,
}

impl LinkState {
    pub(crate) const fn new() -> Self {
        Self {
            initialized: false,
            brought_up: false,
            phase: LinkPhase::Disconnected,
            connection: None,
            requested: None,
            deadline: None,
            awaiting_result: false,
        }
    }

    pub(crate) fn init<C: RadioController>(
        &mut self,
        ownership: &mut RadioOwnership,
        controller: &C,
        modulation: Phy,
    ) -> Result<(), RadioError<C::Error>> {
        if self.initialized {
            return Err(Error::InvalidState.into());
        }
        // Ride on whichever role already brought the radio up.
        self.brought_up = if ownership.is_owned() {
            false
        } else {
            ownership.acquire(RadioRole::Gatt, controller, modulation)?;
            true
        };
        self.initialized = true;
        Ok(())
    }

    pub(crate) fn uninit<C: RadioController>(
        &mut self,
        ownership: &mut RadioOwnership,
        controller: &C,
    ) -> Result<(), RadioError<C::Error>> {
        if !self.initialized {
            return Ok(());
        }
        if let Some(conn) = self.connection {
            if self.phase != LinkPhase::Disconnecting
                && controller
                    .disconnect(conn.handle, DisconnectReason::RemoteUserTerminatedConn)
                    .is_err()
            {
                warn!("[link] failed to disconnect {:?}", conn.handle);
            }
        }
        let brought_up = self.brought_up;
        *self = Self::new();
        if brought_up {
            ownership.release(RadioRole::Gatt, controller)?;
        }
        Ok(())
    }

    pub(crate) fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub(crate) fn connection(&self) -> Option<ConnectionState> {
        self.connection
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connection.is_some() && self.phase != LinkPhase::Disconnecting
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn current(&mut self, handle: ConnHandle) -> Option<&mut ConnectionState> {
        match self.connection.as_mut() {
            Some(conn) if conn.handle == handle => Some(conn),
            _ => {
                warn!("[link] event for unknown handle {:?}", handle);
                None
            }
        }
    }

    pub(crate) fn on_connected<C: RadioController>(&mut self, handle: ConnHandle, controller: &C, modulation: Phy) {
        if !self.initialized {
            return;
        }
        if let Some(conn) = self.connection {
            warn!("[link] {:?} replaces {:?}", handle, conn.handle);
        }
        self.connection = Some(ConnectionState::new(handle));
        self.phase = LinkPhase::Connected;
        self.requested = None;
        self.deadline = None;
        self.awaiting_result = false;
        self.propose_phy(handle, controller, modulation);
    }

    pub(crate) fn on_disconnected(&mut self, handle: ConnHandle) {
        if self.current(handle).is_none() {
            return;
        }
        debug!("[link] {:?} down", handle);
        self.connection = None;
        self.phase = LinkPhase::Disconnected;
        self.requested = None;
        self.deadline = None;
        self.awaiting_result = false;
    }

    /// Propose, or answer the central with, the configured modulation on both directions.
    pub(crate) fn propose_phy<C: RadioController>(&mut self, handle: ConnHandle, controller: &C, modulation: Phy) {
        if self.current(handle).is_none() {
            return;
        }
        if controller.update_phy(handle, PhyPair::symmetric(modulation)).is_err() {
            warn!("[link] PHY update to {:?} refused", modulation);
        }
    }

    pub(crate) fn on_phy_updated(&mut self, handle: ConnHandle, phys: PhyPair, notify: &mut impl FnMut(CommEvent)) {
        if let Some(conn) = self.current(handle) {
            conn.phy = phys;
            notify(CommEvent::PhyUpdated(phys));
        }
    }

    pub(crate) fn on_security_request<C: RadioController>(&mut self, handle: ConnHandle, controller: &C) {
        if self.current(handle).is_some() && controller.reject_pairing(handle).is_err() {
            warn!("[link] failed to reject pairing on {:?}", handle);
        }
    }

    /// Ask for `preset`, now or after `delay_ms`. Cancels any pending retry.
    pub(crate) fn request_params<C: RadioController>(
        &mut self,
        preset: ConnPreset,
        delay_ms: u32,
        now: Instant,
        controller: &C,
    ) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::InvalidState);
        }
        if let Some(conn) = self.connection.as_mut() {
            conn.retry_count = 0;
        }
        self.requested = Some(preset);
        self.deadline = None;
        self.awaiting_result = false;
        self.phase = LinkPhase::ParamsPending { retry: 0 };
        if delay_ms == 0 {
            self.attempt(now, controller);
        } else {
            self.deadline = Some(now + Duration::from_millis(delay_ms as u64));
        }
        Ok(())
    }

    fn attempt<C: RadioController>(&mut self, now: Instant, controller: &C) {
        let (Some(conn), Some(preset)) = (self.connection, self.requested) else {
            return;
        };
        debug!("[link] requesting {:?}, retry {}", preset, conn.retry_count);
        match controller.update_conn_params(conn.handle, &preset.params()) {
            Ok(()) => self.awaiting_result = true,
            Err(_) => self.attempt_failed(now, controller),
        }
    }

    fn attempt_failed<C: RadioController>(&mut self, now: Instant, controller: &C) {
        self.awaiting_result = false;
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        conn.retry_count = conn.retry_count.saturating_add(1);
        let retry = conn.retry_count;
        if retry as usize > CONN_PARAMS_MAX_RETRY {
            warn!("[link] parameters rejected {} times, disconnecting", retry);
            let handle = conn.handle;
            self.deadline = None;
            self.phase = LinkPhase::Disconnecting;
            if controller
                .disconnect(handle, DisconnectReason::UnacceptableConnParameters)
                .is_err()
            {
                warn!("[link] failed to disconnect {:?}", handle);
            }
        } else {
            info!("[link] parameter request failed, retry {} in {} ms", retry, RETRY_BACKOFF.as_millis());
            self.deadline = Some(now + RETRY_BACKOFF);
            self.phase = LinkPhase::ParamsPending { retry };
        }
    }

    pub(crate) fn on_params_updated<C: RadioController>(
        &mut self,
        handle: ConnHandle,
        params: ConnParams,
        now: Instant,
        controller: &C,
        notify: &mut impl FnMut(CommEvent),
    ) {
        let Some(conn) = self.current(handle) else {
            return;
        };
        conn.negotiated_params = params;
        let Some(preset) = self.requested else {
            return;
        };
        if self.phase == LinkPhase::Disconnecting {
            return;
        }
        if preset.params().accepts(&params) {
            if let Some(conn) = self.connection.as_mut() {
                conn.retry_count = 0;
            }
            self.awaiting_result = false;
            self.deadline = None;
            self.phase = LinkPhase::ParamsStable;
            notify(CommEvent::ParamsUpdated(params));
        } else if self.deadline.is_none() {
            // Only one retry may be scheduled at a time.
            self.attempt_failed(now, controller);
        }
    }

    pub(crate) fn on_params_update_failed<C: RadioController>(&mut self, handle: ConnHandle, now: Instant, controller: &C) {
        if self.current(handle).is_some() && self.awaiting_result {
            self.attempt_failed(now, controller);
        }
    }

    /// Run the scheduled attempt if its time has come.
    pub(crate) fn process_timers<C: RadioController>(&mut self, now: Instant, controller: &C) {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                self.attempt(now, controller);
            }
            _ => {}
        }
    }
}

/// Handle for the GATT link role.
pub struct GattLinkManager<'d, M: RawMutex, C: RadioController> {
    ctx: &'d RadioContext<M, C>,
}

impl<'d, M: RawMutex, C: RadioController> GattLinkManager<'d, M, C> {
    pub(crate) fn new(ctx: &'d RadioContext<M, C>) -> Self {
        Self { ctx }
    }

    /// Start supervising links. Brings the radio up if no other role has.
    pub fn init(&mut self) -> Result<(), RadioError<C::Error>> {
        let controller = &self.ctx.controller;
        let modulation = self.ctx.config.modulation;
        self.ctx
            .with_state(|state| state.link.init(&mut state.ownership, controller, modulation))
    }

    /// Drop the link if any, cancel retries and give back the radio if this role brought it up.
    pub fn uninit(&mut self) -> Result<(), RadioError<C::Error>> {
        let controller = &self.ctx.controller;
        let result = self
            .ctx
            .with_state(|state| state.link.uninit(&mut state.ownership, controller));
        self.ctx.wake_timer();
        result
    }

    /// Negotiate the parameters of `preset`, immediately when `delay_ms` is 0.
    pub fn request_params(&mut self, preset: ConnPreset, delay_ms: u32) -> Result<(), Error> {
        let controller = &self.ctx.controller;
        let now = Instant::now();
        let result = self
            .ctx
            .with_state(|state| state.link.request_params(preset, delay_ms, now, controller));
        self.ctx.wake_timer();
        result
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.with_state(|state| state.link.is_connected())
    }

    pub fn phase(&self) -> LinkPhase {
        self.ctx.with_state(|state| state.link.phase())
    }

    pub fn connection(&self) -> Option<ConnectionState> {
        self.ctx.with_state(|state| state.link.connection())
    }
}
