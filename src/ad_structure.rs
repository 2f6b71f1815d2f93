//! Advertising data structures.
use crate::codec;
use crate::cursor::{ReadCursor, WriteCursor};

pub const LE_GENERAL_DISCOVERABLE: u8 = 0b00000010;
pub const BR_EDR_NOT_SUPPORTED: u8 = 0b00000100;

const AD_FLAGS: u8 = 0x01;
const AD_INCOMPLETE_UUIDS16: u8 = 0x02;
const AD_COMPLETE_UUIDS16: u8 = 0x03;
const AD_SHORTENED_NAME: u8 = 0x08;
const AD_COMPLETE_NAME: u8 = 0x09;
const AD_SERVICE_DATA16: u8 = 0x16;
const AD_MANUFACTURER_DATA: u8 = 0xff;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdStructure<'a> {
    /// Device flags and baseband capabilities.
    ///
    /// This should be sent if any flags apply to the device. If not (ie. the value sent would be
    /// 0), this may be omitted.
    ///
    /// Must not be used in scan response data.
    Flags(u8),

    /// Complete list of 16-bit service UUIDs, little endian, two bytes per UUID.
    ServiceUuids16(&'a [u8]),

    /// Service data with 16-bit service UUID.
    ServiceData16 {
        /// The 16-bit service UUID.
        uuid: u16,
        /// The associated service data. May be empty.
        data: &'a [u8],
    },

    /// Sets the full (unabbreviated) device name.
    ///
    /// This will be shown to the user when this device is found.
    CompleteLocalName(&'a [u8]),

    /// Sets the shortened device name.
    ShortenedLocalName(&'a [u8]),

    /// Set manufacturer specific data
    ManufacturerSpecificData {
        company_identifier: u16,
        payload: &'a [u8],
    },

    /// An unknown or unimplemented AD structure stored as raw bytes.
    Unknown {
        /// Type byte.
        ty: u8,
        /// Raw data transmitted after the type.
        data: &'a [u8],
    },
}

impl<'d> AdStructure<'d> {
    /// Encode a list of structures into `dest`, returning the number of bytes written.
    pub fn encode_slice(data: &[AdStructure<'_>], dest: &mut [u8]) -> Result<usize, codec::Error> {
        let mut w = WriteCursor::new(dest);
        for item in data.iter() {
            item.encode(&mut w)?;
        }
        Ok(w.len())
    }

    /// Size of this structure on air, header included.
    pub fn encoded_len(&self) -> usize {
        2 + match self {
            AdStructure::Flags(_) => 1,
            AdStructure::ServiceUuids16(uuids) => uuids.len(),
            AdStructure::ServiceData16 { data, .. } => 2 + data.len(),
            AdStructure::CompleteLocalName(name) | AdStructure::ShortenedLocalName(name) => name.len(),
            AdStructure::ManufacturerSpecificData { payload, .. } => 2 + payload.len(),
            AdStructure::Unknown { data, .. } => data.len(),
        }
    }

    pub fn encode(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        // The length byte covers the type byte and the data.
        let len = u8::try_from(self.encoded_len() - 1).map_err(|_| codec::Error::InsufficientSpace)?;
        match self {
            AdStructure::Flags(flags) => {
                w.append(&[len, AD_FLAGS, *flags])?;
            }
            AdStructure::ServiceUuids16(uuids) => {
                if uuids.len() % 2 != 0 {
                    return Err(codec::Error::InvalidValue);
                }
                w.append(&[len, AD_COMPLETE_UUIDS16])?;
                w.append(uuids)?;
            }
            AdStructure::ShortenedLocalName(name) => {
                w.append(&[len, AD_SHORTENED_NAME])?;
                w.append(name)?;
            }
            AdStructure::CompleteLocalName(name) => {
                w.append(&[len, AD_COMPLETE_NAME])?;
                w.append(name)?;
            }
            AdStructure::ServiceData16 { uuid, data } => {
                w.append(&[len, AD_SERVICE_DATA16])?;
                w.write(*uuid)?;
                w.append(data)?;
            }
            AdStructure::ManufacturerSpecificData {
                company_identifier,
                payload,
            } => {
                w.append(&[len, AD_MANUFACTURER_DATA])?;
                w.write(*company_identifier)?;
                w.append(payload)?;
            }
            AdStructure::Unknown { ty, data } => {
                w.append(&[len, *ty])?;
                w.append(data)?;
            }
        }
        Ok(())
    }

    /// Iterate over the structures in an advertising or scan response payload.
    pub fn decode(data: &'d [u8]) -> impl Iterator<Item = Result<AdStructure<'d>, codec::Error>> {
        AdStructureIter {
            cursor: ReadCursor::new(data),
        }
    }
}

pub struct AdStructureIter<'d> {
    cursor: ReadCursor<'d>,
}

impl<'d> AdStructureIter<'d> {
    fn read(&mut self) -> Result<AdStructure<'d>, codec::Error> {
        let len: u8 = self.cursor.read()?;
        if len == 0 {
            return Err(codec::Error::InvalidValue);
        }
        let code: u8 = self.cursor.read()?;
        let data = self.cursor.slice(len as usize - 1)?;
        match code {
            AD_FLAGS => match data {
                [flags] => Ok(AdStructure::Flags(*flags)),
                _ => Err(codec::Error::InvalidValue),
            },
            AD_INCOMPLETE_UUIDS16 | AD_COMPLETE_UUIDS16 if data.len() % 2 == 0 => Ok(AdStructure::ServiceUuids16(data)),
            AD_INCOMPLETE_UUIDS16 | AD_COMPLETE_UUIDS16 => Err(codec::Error::InvalidValue),
            AD_SHORTENED_NAME => Ok(AdStructure::ShortenedLocalName(data)),
            AD_COMPLETE_NAME => Ok(AdStructure::CompleteLocalName(data)),
            AD_SERVICE_DATA16 => {
                let mut r = ReadCursor::new(data);
                let uuid: u16 = r.read()?;
                Ok(AdStructure::ServiceData16 {
                    uuid,
                    data: &data[2..],
                })
            }
            AD_MANUFACTURER_DATA => {
                let mut r = ReadCursor::new(data);
                let company_identifier: u16 = r.read()?;
                Ok(AdStructure::ManufacturerSpecificData {
                    company_identifier,
                    payload: &data[2..],
                })
            }
            ty => Ok(AdStructure::Unknown { ty, data }),
        }
    }
}

impl<'d> Iterator for AdStructureIter<'d> {
    type Item = Result<AdStructure<'d>, codec::Error>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.available() == 0 {
            return None;
        }
        let result = self.read();
        if result.is_err() {
            // A malformed structure poisons the rest of the payload.
            self.cursor = ReadCursor::new(&[]);
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_flags_and_manufacturer_data() {
        let mut buf = [0; 31];
        let len = unwrap!(AdStructure::encode_slice(
            &[
                AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
                AdStructure::ManufacturerSpecificData {
                    company_identifier: 0x0499,
                    payload: &[1, 2, 3],
                },
            ],
            &mut buf[..],
        ));
        assert_eq!(&buf[..len], &[0x02, 0x01, 0x06, 0x06, 0xff, 0x99, 0x04, 1, 2, 3]);
    }

    #[test]
    fn encode_rejects_overflow() {
        let mut buf = [0; 4];
        let name = AdStructure::CompleteLocalName(b"Ruuvi");
        assert_eq!(name.encoded_len(), 7);
        assert_eq!(
            AdStructure::encode_slice(&[name], &mut buf[..]),
            Err(codec::Error::InsufficientSpace)
        );
    }

    #[test]
    fn oversized_structure_is_out_of_space() {
        let data = [0u8; 300];
        let ad = AdStructure::ManufacturerSpecificData {
            company_identifier: 0x0499,
            payload: &data,
        };
        let mut buf = [0; 512];
        assert_eq!(
            AdStructure::encode_slice(&[ad], &mut buf[..]),
            Err(codec::Error::InsufficientSpace)
        );
    }

    #[test]
    fn decode_mixed_payload() {
        let data = [
            0x02, 0x01, 0x06, 0x05, 0x09, b'A', b'B', b'C', b'D', 0x03, 0x03, 0x01, 0x00, 0x02, 0x0a, 0x04,
        ];
        let mut it = AdStructure::decode(&data);
        assert_eq!(unwrap!(unwrap!(it.next())), AdStructure::Flags(0x06));
        assert_eq!(unwrap!(unwrap!(it.next())), AdStructure::CompleteLocalName(b"ABCD"));
        assert_eq!(unwrap!(unwrap!(it.next())), AdStructure::ServiceUuids16(&[0x01, 0x00]));
        assert_eq!(
            unwrap!(unwrap!(it.next())),
            AdStructure::Unknown {
                ty: 0x0a,
                data: &[0x04]
            }
        );
        assert!(it.next().is_none());
    }

    #[test]
    fn decode_truncated_structure() {
        let data = [0x05, 0xff, 0x99, 0x04];
        let mut it = AdStructure::decode(&data);
        assert_eq!(unwrap!(it.next()), Err(codec::Error::InsufficientSpace));
        assert!(it.next().is_none());
    }
}
