//! Advertising role.
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Duration;
use heapless::String;

use crate::adv_queue::AdvertisementQueue;
use crate::advertise::{
    encode, encode_raw, AdvConfig, AdvType, AdvertisementDescriptor, AppPayload, ScanResponseConfig, COMPANY_ID_UNASSIGNED,
    NUS_SERVICE_UUID16, SCAN_RSP_NAME_MAX_LEN,
};
use crate::config::{ADV_QUEUE_SIZE, DEFAULT_ADV_INTERVAL_MS};
use crate::event::CommEvent;
use crate::host::RadioContext;
use crate::phy::{ChannelMask, Phy, TxPower};
use crate::radio::{RadioController, RadioOwnership, RadioRole};
use crate::{Error, RadioError};

/// Advertising interval bounds in milliseconds.
pub const ADV_INTERVAL_MIN_MS: u32 = 100;
pub const ADV_INTERVAL_MAX_MS: u32 = 10_000;

/// Observable state of the advertiser.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiserPhase {
    Uninit,
    Idle,
    Advertising,
}

pub(crate) struct AdvertiserState {
    initialized: bool,
    manufacturer_id: u16,
    adv_type: AdvType,
    extended_requested: bool,
    tx_power: TxPower,
    channel_mask: ChannelMask,
    interval: Duration,
    name: String<SCAN_RSP_NAME_MAX_LEN>,
    scan_uuid: Option<u16>,
    queue: AdvertisementQueue<ADV_QUEUE_SIZE>,
}

impl AdvertiserState {
    pub(crate) const fn new() -> Self {
        Self {
            initialized: false,
            manufacturer_id: COMPANY_ID_UNASSIGNED,
            adv_type: AdvType::NonConnNonScan,
            extended_requested: false,
            tx_power: TxPower::ZerodBm,
            channel_mask: ChannelMask::ALL,
            interval: Duration::from_millis(DEFAULT_ADV_INTERVAL_MS as u64),
            name: String::new(),
            scan_uuid: None,
            queue: AdvertisementQueue::new(),
        }
    }

    fn phase(&self) -> AdvertiserPhase {
        match (self.initialized, self.queue.is_transmitting()) {
            (false, _) => AdvertiserPhase::Uninit,
            (true, false) => AdvertiserPhase::Idle,
            (true, true) => AdvertiserPhase::Advertising,
        }
    }

    pub(crate) fn init<C: RadioController>(
        &mut self,
        ownership: &mut RadioOwnership,
        controller: &C,
        modulation: Phy,
        channels: ChannelMask,
    ) -> Result<(), RadioError<C::Error>> {
        if self.initialized {
            return Err(Error::InvalidState.into());
        }
        if channels.is_empty() {
            return Err(Error::InvalidParam.into());
        }
        ownership.acquire(RadioRole::Advertising, controller, modulation)?;
        self.initialized = true;
        self.channel_mask = channels;
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
        self.stop(controller);
        *self = Self::new();
        ownership.release(RadioRole::Advertising, controller)
    }

    fn set_interval(&mut self, interval_ms: u32) -> Result<(), Error> {
        if !(ADV_INTERVAL_MIN_MS..=ADV_INTERVAL_MAX_MS).contains(&interval_ms) {
            return Err(Error::InvalidParam);
        }
        self.interval = Duration::from_millis(interval_ms as u64);
        Ok(())
    }

    fn set_scan_response(&mut self, name: &str, include_nus_uuid: bool) -> Result<(), Error> {
        let mut stored = String::new();
        stored.push_str(name).map_err(|_| Error::DataTooLarge)?;
        self.name = stored;
        self.scan_uuid = include_nus_uuid.then_some(NUS_SERVICE_UUID16);
        Ok(())
    }

    fn snapshot(&self, modulation: Phy) -> AdvConfig<'_> {
        AdvConfig {
            manufacturer_id: self.manufacturer_id,
            adv_type: self.adv_type,
            phy: modulation,
            extended_requested: self.extended_requested,
            tx_power: self.tx_power,
            channel_mask: self.channel_mask,
            interval: self.interval,
            scan_response: ScanResponseConfig {
                name: self.name.as_str(),
                service_uuid: self.scan_uuid,
            },
        }
    }

    pub(crate) fn send<C: RadioController>(
        &mut self,
        controller: &C,
        modulation: Phy,
        payload: &AppPayload<'_>,
    ) -> Result<(), RadioError<C::Error>> {
        if !self.initialized {
            return Err(Error::InvalidState.into());
        }
        let descriptor = encode(payload, &self.snapshot(modulation))?;
        self.enqueue(controller, descriptor)
    }

    pub(crate) fn send_raw<C: RadioController>(
        &mut self,
        controller: &C,
        modulation: Phy,
        data: &[u8],
    ) -> Result<(), RadioError<C::Error>> {
        if !self.initialized {
            return Err(Error::InvalidState.into());
        }
        let descriptor = encode_raw(data, &self.snapshot(modulation))?;
        self.enqueue(controller, descriptor)
    }

    fn enqueue<C: RadioController>(
        &mut self,
        controller: &C,
        descriptor: AdvertisementDescriptor,
    ) -> Result<(), RadioError<C::Error>> {
        self.queue.push(descriptor)?;

        // A set repeating forever only leaves the air when something replaces it.
        if self.queue.current().is_some_and(AdvertisementDescriptor::repeats_forever) {
            if controller.stop_adv().is_err() {
                warn!("[adv] failed to stop repeating set");
            }
            self.queue.on_terminated();
        }
        self.queue.try_advance(controller);
        Ok(())
    }

    /// Drop queued sets and take the current one off air.
    pub(crate) fn stop<C: RadioController>(&mut self, controller: &C) {
        self.queue.flush();
        if self.queue.is_transmitting() {
            if controller.stop_adv().is_err() {
                warn!("[adv] failed to stop advertising");
            }
            self.queue.on_terminated();
        }
    }

    pub(crate) fn on_connected(&mut self, notify: &mut impl FnMut(CommEvent)) {
        if !self.initialized {
            return;
        }
        // The controller ends a connectable set when a central connects.
        self.adv_type = self.adv_type.non_connectable();
        let dropped = self.queue.flush();
        let was_on_air = self.queue.is_transmitting();
        self.queue.on_terminated();
        if dropped > 0 || was_on_air {
            debug!("[adv] connected, aborted {} queued", dropped);
            notify(CommEvent::Aborted);
        }
    }

    pub(crate) fn on_disconnected(&mut self, notify: &mut impl FnMut(CommEvent)) {
        if self.queue.flush() > 0 {
            notify(CommEvent::Aborted);
        }
    }

    pub(crate) fn on_set_terminated<C: RadioController>(&mut self, controller: &C, notify: &mut impl FnMut(CommEvent)) {
        if !self.queue.is_transmitting() {
            return;
        }
        self.queue.on_terminated();
        notify(CommEvent::Sent);
        self.queue.try_advance(controller);
    }
}

/// Handle for the advertising role.
pub struct Advertiser<'d, M: RawMutex, C: RadioController> {
    ctx: &'d RadioContext<M, C>,
}

impl<'d, M: RawMutex, C: RadioController> Advertiser<'d, M, C> {
    pub(crate) fn new(ctx: &'d RadioContext<M, C>) -> Self {
        Self { ctx }
    }

    /// Take the radio for advertising on `channels`.
    pub fn init(&mut self, channels: ChannelMask) -> Result<(), RadioError<C::Error>> {
        let controller = &self.ctx.controller;
        let modulation = self.ctx.config.modulation;
        self.ctx.with_state(|state| {
            state
                .advertiser
                .init(&mut state.ownership, controller, modulation, channels)
        })
    }

    /// Stop advertising, forget the configuration and release the radio.
    pub fn uninit(&mut self) -> Result<(), RadioError<C::Error>> {
        let controller = &self.ctx.controller;
        self.ctx
            .with_state(|state| state.advertiser.uninit(&mut state.ownership, controller))
    }

    pub fn state(&self) -> AdvertiserPhase {
        self.ctx.with_state(|state| state.advertiser.phase())
    }

    /// Set the advertising interval, 100 to 10000 ms. Applies to later sends.
    pub fn set_tx_interval(&mut self, interval_ms: u32) -> Result<(), Error> {
        self.ctx.with_state(|state| state.advertiser.set_interval(interval_ms))
    }

    pub fn tx_interval(&self) -> Duration {
        self.ctx.with_state(|state| state.advertiser.interval)
    }

    /// Set transmit power, rounded up to the next supported level which is returned.
    ///
    /// Applies to sets formatted after the call. A set already queued or on air keeps the power
    /// it was formatted with, since the radio owns its buffer until the set terminates.
    pub fn set_tx_power(&mut self, dbm: i8) -> Result<TxPower, Error> {
        let power = TxPower::at_least(dbm)?;
        self.ctx.with_state(|state| state.advertiser.tx_power = power);
        Ok(power)
    }

    pub fn tx_power(&self) -> TxPower {
        self.ctx.with_state(|state| state.advertiser.tx_power)
    }

    pub fn set_type(&mut self, adv_type: AdvType) {
        self.ctx.with_state(|state| state.advertiser.adv_type = adv_type);
    }

    pub fn adv_type(&self) -> AdvType {
        self.ctx.with_state(|state| state.advertiser.adv_type)
    }

    /// Set the company identifier. `0` is sent as unassigned.
    pub fn set_manufacturer_id(&mut self, id: u16) {
        self.ctx.with_state(|state| state.advertiser.manufacturer_id = id);
    }

    /// Force extended framing even when the payload fits a legacy frame.
    pub fn request_extended(&mut self, extended: bool) {
        self.ctx
            .with_state(|state| state.advertiser.extended_requested = extended);
    }

    /// Scan response content for scannable types.
    ///
    /// The name must fit next to the UUID list, see [`SCAN_RSP_NAME_MAX_LEN`].
    pub fn configure_scan_response(&mut self, name: &str, include_nus_uuid: bool) -> Result<(), Error> {
        self.ctx
            .with_state(|state| state.advertiser.set_scan_response(name, include_nus_uuid))
    }

    /// Broadcast manufacturer data with the default repeat count.
    pub fn send(&mut self, data: &[u8]) -> Result<(), RadioError<C::Error>> {
        self.send_payload(&AppPayload::new(data))
    }

    /// Broadcast a payload.
    ///
    /// The payload is formatted immediately and queued. It goes on air once the sets queued
    /// before it are done, raising [`CommEvent::Sent`] when its repeats are over.
    pub fn send_payload(&mut self, payload: &AppPayload<'_>) -> Result<(), RadioError<C::Error>> {
        let controller = &self.ctx.controller;
        let modulation = self.ctx.config.modulation;
        self.ctx
            .with_state(|state| state.advertiser.send(controller, modulation, payload))
    }

    /// Broadcast advertising data formatted by the caller.
    ///
    /// The bytes go on air unchanged, once and without a scan response, behind the sets already
    /// queued. Data longer than the frame allows is `DataTooLarge`.
    pub fn send_raw(&mut self, data: &[u8]) -> Result<(), RadioError<C::Error>> {
        let controller = &self.ctx.controller;
        let modulation = self.ctx.config.modulation;
        self.ctx
            .with_state(|state| state.advertiser.send_raw(controller, modulation, data))
    }

    /// Drop queued advertisements and stop the one on air. Safe to call in any state.
    pub fn stop(&mut self) {
        let controller = &self.ctx.controller;
        self.ctx.with_state(|state| state.advertiser.stop(controller));
    }
}
