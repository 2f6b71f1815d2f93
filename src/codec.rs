//! Opinionated BLE codec
//!
//! Assumes little endian for all types

pub trait FixedSize: Sized {
    const SIZE: usize;
}

pub trait Type: Sized {
    fn size(&self) -> usize;
}

pub trait Encode: Type {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error>;
}

pub trait Decode<'d>: Type {
    fn decode(src: &'d [u8]) -> Result<Self, Error>;
}

impl<T: FixedSize> Type for T {
    fn size(&self) -> usize {
        Self::SIZE
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    InsufficientSpace,
    InvalidValue,
}

impl FixedSize for u8 {
    const SIZE: usize = 1;
}

impl Encode for u8 {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error> {
        let out = dest.first_mut().ok_or(Error::InsufficientSpace)?;
        *out = *self;
        Ok(())
    }
}

impl<'d> Decode<'d> for u8 {
    fn decode(src: &'d [u8]) -> Result<Self, Error> {
        src.first().copied().ok_or(Error::InsufficientSpace)
    }
}

impl FixedSize for u16 {
    const SIZE: usize = 2;
}

impl Encode for u16 {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error> {
        let out = dest.get_mut(..Self::SIZE).ok_or(Error::InsufficientSpace)?;
        out.copy_from_slice(&self.to_le_bytes());
        Ok(())
    }
}

impl<'d> Decode<'d> for u16 {
    fn decode(src: &'d [u8]) -> Result<Self, Error> {
        match src {
            [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
            _ => Err(Error::InsufficientSpace),
        }
    }
}
