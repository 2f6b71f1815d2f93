//! Advertisement formatting.
//!
//! Turns an application payload and a configuration snapshot into the exact bytes that go on
//! air, choosing legacy or extended framing.
use embassy_time::Duration;
use heapless::Vec;

use crate::ad_structure::{AdStructure, BR_EDR_NOT_SUPPORTED, LE_GENERAL_DISCOVERABLE};
use crate::codec;
use crate::phy::{ChannelMask, Phy, TxPower};

/// Largest legacy advertising or scan response payload.
pub const LEGACY_MAX_DATA_LEN: usize = 31;
/// Largest extended payload for non-connectable sets.
pub const EXTENDED_MAX_DATA_LEN: usize = 255;
/// Largest extended payload for connectable sets.
pub const EXTENDED_MAX_CONNECTABLE_DATA_LEN: usize = 238;
/// Largest manufacturer data that still fits a legacy frame next to the flags.
pub const LEGACY_MAX_MANUFACTURER_DATA_LEN: usize = 24;
/// Longest name that fits the scan response next to one 16-bit UUID list.
pub const SCAN_RSP_NAME_MAX_LEN: usize = LEGACY_MAX_DATA_LEN - 2 - 4;
/// Manufacturer ID sent when none is configured.
pub const COMPANY_ID_UNASSIGNED: u16 = 0xffff;
/// 16-bit alias of the Nordic UART service UUID.
pub const NUS_SERVICE_UUID16: u16 = 0x0001;

const FLAGS: u8 = BR_EDR_NOT_SUPPORTED | LE_GENERAL_DISCOVERABLE;

/// Advertising PDU type.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdvType {
    #[default]
    NonConnNonScan,
    NonConnScan,
    ConnNonScan,
    ConnScan,
}

impl AdvType {
    pub fn is_connectable(&self) -> bool {
        matches!(self, AdvType::ConnNonScan | AdvType::ConnScan)
    }

    pub fn is_scannable(&self) -> bool {
        matches!(self, AdvType::NonConnScan | AdvType::ConnScan)
    }

    /// Same type without the connectable bit.
    pub fn non_connectable(self) -> Self {
        match self {
            AdvType::ConnNonScan => AdvType::NonConnNonScan,
            AdvType::ConnScan => AdvType::NonConnScan,
            other => other,
        }
    }
}

/// Frame format chosen for a descriptor.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Legacy PDUs on the primary channels.
    Legacy,
    /// Extended advertising, data on a secondary channel.
    Extended,
}

/// Data the application wants to broadcast.
#[derive(Debug, Clone, Copy)]
pub struct AppPayload<'a> {
    pub manufacturer_data: &'a [u8],
    /// Optional 16-bit service UUID advertised next to the manufacturer data.
    pub service_uuid: Option<u16>,
    /// Number of advertising events, `0` for until stopped.
    pub repeat_count: u16,
}

impl<'a> AppPayload<'a> {
    pub fn new(manufacturer_data: &'a [u8]) -> Self {
        Self {
            manufacturer_data,
            service_uuid: None,
            repeat_count: crate::config::DEFAULT_REPEAT_COUNT,
        }
    }
}

/// Scan response content.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanResponseConfig<'a> {
    pub name: &'a str,
    pub service_uuid: Option<u16>,
}

/// Configuration snapshot used to encode one descriptor.
#[derive(Debug, Clone, Copy)]
pub struct AdvConfig<'a> {
    pub manufacturer_id: u16,
    pub adv_type: AdvType,
    pub phy: Phy,
    pub extended_requested: bool,
    pub tx_power: TxPower,
    pub channel_mask: ChannelMask,
    pub interval: Duration,
    pub scan_response: ScanResponseConfig<'a>,
}

impl Default for AdvConfig<'_> {
    fn default() -> Self {
        Self {
            manufacturer_id: COMPANY_ID_UNASSIGNED,
            adv_type: AdvType::default(),
            phy: Phy::Le1M,
            extended_requested: false,
            tx_power: TxPower::ZerodBm,
            channel_mask: ChannelMask::ALL,
            interval: Duration::from_millis(crate::config::DEFAULT_ADV_INTERVAL_MS as u64),
            scan_response: ScanResponseConfig::default(),
        }
    }
}

/// Fully formatted advertisement, ready for the controller.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub struct AdvertisementDescriptor {
    pub adv_payload: Vec<u8, EXTENDED_MAX_DATA_LEN>,
    /// Scan response for legacy scannable sets. Extended sets carry it in `adv_payload`.
    pub scan_response_payload: Option<Vec<u8, LEGACY_MAX_DATA_LEN>>,
    pub tx_power: TxPower,
    pub repeat_count: u16,
    pub channel_mask: ChannelMask,
    pub phy_primary: Phy,
    pub phy_secondary: Option<Phy>,
    pub adv_type: AdvType,
    pub framing: Framing,
    pub interval: Duration,
}

impl AdvertisementDescriptor {
    /// Whether the set stays on air until stopped.
    pub fn repeats_forever(&self) -> bool {
        self.repeat_count == 0
    }
}

/// Reasons a payload cannot be formatted.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// Advertising data exceeds the extended frame.
    PayloadTooLarge,
    /// Scan response cannot share the single extended frame with the advertising data.
    ScanResponseTooLarge,
    /// Local name does not fit the scan response.
    NameTooLong,
    /// A field has an unencodable value.
    InvalidValue,
}

impl From<codec::Error> for EncodeError {
    fn from(error: codec::Error) -> Self {
        match error {
            codec::Error::InsufficientSpace => EncodeError::PayloadTooLarge,
            codec::Error::InvalidValue => EncodeError::InvalidValue,
        }
    }
}

/// Format `payload` according to `config`.
pub fn encode(payload: &AppPayload<'_>, config: &AdvConfig<'_>) -> Result<AdvertisementDescriptor, EncodeError> {
    let company_identifier = match config.manufacturer_id {
        0 => COMPANY_ID_UNASSIGNED,
        id => id,
    };
    let uuid = payload.service_uuid.map(u16::to_le_bytes);

    let mut ads: Vec<AdStructure<'_>, 3> = Vec::new();
    push_ad(&mut ads, AdStructure::Flags(FLAGS))?;
    push_ad(
        &mut ads,
        AdStructure::ManufacturerSpecificData {
            company_identifier,
            payload: payload.manufacturer_data,
        },
    )?;
    if let Some(uuid) = uuid.as_ref() {
        push_ad(&mut ads, AdStructure::ServiceUuids16(uuid))?;
    }
    let adv_len: usize = ads.iter().map(AdStructure::encoded_len).sum();

    let scan_response = if config.adv_type.is_scannable() {
        Some(encode_scan_response(&config.scan_response)?)
    } else {
        None
    };

    let framing = select_framing(adv_len, config);
    let mut adv_payload: Vec<u8, EXTENDED_MAX_DATA_LEN> = Vec::new();
    adv_payload
        .resize(EXTENDED_MAX_DATA_LEN, 0)
        .map_err(|_| EncodeError::PayloadTooLarge)?;

    let (adv_payload, scan_response_payload, phy_secondary) = match framing {
        Framing::Legacy => {
            let len = AdStructure::encode_slice(&ads, &mut adv_payload[..LEGACY_MAX_DATA_LEN])?;
            adv_payload.truncate(len);
            (adv_payload, scan_response, None)
        }
        Framing::Extended => {
            let limit = extended_limit(config.adv_type);
            let mut len = AdStructure::encode_slice(&ads, &mut adv_payload[..limit])?;
            if let Some(rsp) = scan_response.as_ref() {
                // One secondary PDU carries both.
                let dest = adv_payload[len..limit]
                    .get_mut(..rsp.len())
                    .ok_or(EncodeError::ScanResponseTooLarge)?;
                dest.copy_from_slice(rsp);
                len += rsp.len();
            }
            adv_payload.truncate(len);
            (adv_payload, None, Some(config.phy))
        }
    };

    Ok(AdvertisementDescriptor {
        adv_payload,
        scan_response_payload,
        tx_power: config.tx_power,
        repeat_count: payload.repeat_count,
        channel_mask: config.channel_mask,
        phy_primary: primary_phy(framing, config.phy),
        phy_secondary,
        adv_type: config.adv_type,
        framing,
        interval: config.interval,
    })
}

/// Wrap already formatted advertising data, sent once without a scan response.
///
/// Framing follows the same rules as [`encode`]; data longer than the extended frame of the
/// configured type is rejected.
pub fn encode_raw(data: &[u8], config: &AdvConfig<'_>) -> Result<AdvertisementDescriptor, EncodeError> {
    let framing = select_framing(data.len(), config);
    let limit = match framing {
        Framing::Legacy => LEGACY_MAX_DATA_LEN,
        Framing::Extended => extended_limit(config.adv_type),
    };
    if data.len() > limit {
        return Err(EncodeError::PayloadTooLarge);
    }
    let adv_payload = Vec::from_slice(data).map_err(|_| EncodeError::PayloadTooLarge)?;
    Ok(AdvertisementDescriptor {
        adv_payload,
        scan_response_payload: None,
        tx_power: config.tx_power,
        repeat_count: 1,
        channel_mask: config.channel_mask,
        phy_primary: primary_phy(framing, config.phy),
        phy_secondary: (framing == Framing::Extended).then_some(config.phy),
        adv_type: config.adv_type,
        framing,
        interval: config.interval,
    })
}

fn extended_limit(adv_type: AdvType) -> usize {
    if adv_type.is_connectable() {
        EXTENDED_MAX_CONNECTABLE_DATA_LEN
    } else {
        EXTENDED_MAX_DATA_LEN
    }
}

fn primary_phy(framing: Framing, phy: Phy) -> Phy {
    match (framing, phy) {
        (Framing::Extended, Phy::LeCoded) => Phy::LeCoded,
        _ => Phy::Le1M,
    }
}

fn select_framing(adv_len: usize, config: &AdvConfig<'_>) -> Framing {
    let legacy_phy = matches!(config.phy, Phy::Le1M | Phy::Le2M);
    if adv_len <= LEGACY_MAX_DATA_LEN
        && legacy_phy
        && !config.extended_requested
        && config.adv_type != AdvType::ConnNonScan
    {
        Framing::Legacy
    } else {
        Framing::Extended
    }
}

fn encode_scan_response(config: &ScanResponseConfig<'_>) -> Result<Vec<u8, LEGACY_MAX_DATA_LEN>, EncodeError> {
    if config.name.len() > SCAN_RSP_NAME_MAX_LEN {
        return Err(EncodeError::NameTooLong);
    }
    let uuid = config.service_uuid.map(u16::to_le_bytes);
    let mut ads: Vec<AdStructure<'_>, 2> = Vec::new();
    push_ad(&mut ads, AdStructure::CompleteLocalName(config.name.as_bytes()))?;
    if let Some(uuid) = uuid.as_ref() {
        push_ad(&mut ads, AdStructure::ServiceUuids16(uuid))?;
    }

    let mut buf = [0; LEGACY_MAX_DATA_LEN];
    let len = AdStructure::encode_slice(&ads, &mut buf[..]).map_err(|_| EncodeError::NameTooLong)?;
    Vec::from_slice(&buf[..len]).map_err(|_| EncodeError::NameTooLong)
}

fn push_ad<'a, const N: usize>(ads: &mut Vec<AdStructure<'a>, N>, ad: AdStructure<'a>) -> Result<(), EncodeError> {
    ads.push(ad).map_err(|_| EncodeError::PayloadTooLarge)
}
