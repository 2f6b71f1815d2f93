#![cfg_attr(not(test), no_std)]
#![doc = include_str!("../README.md")]
#![allow(clippy::new_without_default)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod codec;
mod cursor;
mod double_buffer;

pub mod ad_structure;
pub mod adv_queue;
pub mod advertise;
pub mod advertiser;
pub mod config;
pub mod connection;
pub mod event;
pub mod gatt_link;
pub mod host;
pub mod phy;
pub mod radio;
pub mod scan;

#[cfg(test)]
pub(crate) mod mock_controller;

pub use advertise::EncodeError;
pub use host::{RadioConfig, RadioContext};
pub use radio::RadioController;

/// Errors returned by the radio engine.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The role or link is not in a state that allows the operation.
    InvalidState,
    /// An argument is outside its accepted range.
    InvalidParam,
    /// Payload does not fit the frame it has to travel in.
    DataTooLarge,
    /// The radio is held by a different role.
    AlreadyOwned,
    /// Only the owning role may release the radio.
    Forbidden,
    /// A bounded queue is full.
    ResourceExhausted,
    /// The controller lacks a required capability.
    NotSupported,
}

impl From<codec::Error> for Error {
    fn from(error: codec::Error) -> Self {
        match error {
            codec::Error::InsufficientSpace => Self::DataTooLarge,
            codec::Error::InvalidValue => Self::InvalidParam,
        }
    }
}

impl From<EncodeError> for Error {
    fn from(error: EncodeError) -> Self {
        match error {
            EncodeError::InvalidValue => Self::InvalidParam,
            _ => Self::DataTooLarge,
        }
    }
}

/// Error from the radio engine or the underlying controller.
///
/// The controller variant is an internal failure that the engine cannot recover from and is
/// always propagated to the caller.
#[derive(Debug)]
pub enum RadioError<E> {
    /// Error from the controller.
    Controller(E),
    /// Error from the radio engine.
    Radio(Error),
}

impl<E> From<Error> for RadioError<E> {
    fn from(value: Error) -> Self {
        Self::Radio(value)
    }
}

impl<E> From<EncodeError> for RadioError<E> {
    fn from(value: EncodeError) -> Self {
        Self::Radio(value.into())
    }
}

impl<E> From<codec::Error> for RadioError<E> {
    fn from(value: codec::Error) -> Self {
        Self::Radio(value.into())
    }
}

impl<E> PartialEq<Error> for RadioError<E> {
    fn eq(&self, other: &Error) -> bool {
        matches!(self, Self::Radio(e) if e == other)
    }
}

#[cfg(feature = "defmt")]
impl<E> defmt::Format for RadioError<E>
where
    E: defmt::Format,
{
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            RadioError::Controller(value) => {
                defmt::write!(fmt, "Controller({})", value)
            }
            RadioError::Radio(value) => {
                defmt::write!(fmt, "Radio({})", value)
            }
        }
    }
}
