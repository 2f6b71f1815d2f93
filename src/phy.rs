//! Physical layer selection, channels and transmit power.
use crate::Error;

/// Radio modulation.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phy {
    /// 1 Mbit/s.
    #[default]
    Le1M,
    /// 2 Mbit/s.
    Le2M,
    /// 125 kbit/s coded.
    LeCoded,
}

/// Transmit and receive PHY of a link.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhyPair {
    pub tx: Phy,
    pub rx: Phy,
}

impl PhyPair {
    pub const fn symmetric(phy: Phy) -> Self {
        Self { tx: phy, rx: phy }
    }
}

impl Default for PhyPair {
    fn default() -> Self {
        Self::symmetric(Phy::Le1M)
    }
}

/// Set of PHYs a scanner listens on.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum PhySet {
    M1 = 1,
    M2 = 2,
    M1M2 = 3,
    Coded = 4,
    M1Coded = 5,
    M2Coded = 6,
    M1M2Coded = 7,
}

impl PhySet {
    pub fn contains(&self, phy: Phy) -> bool {
        let bit = match phy {
            Phy::Le1M => 1,
            Phy::Le2M => 2,
            Phy::LeCoded => 4,
        };
        (*self as u8) & bit != 0
    }

    pub fn has_coded(&self) -> bool {
        self.contains(Phy::LeCoded)
    }
}

/// Primary advertising channels in use.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMask(u8);

impl ChannelMask {
    const CH37: u8 = 0b001;
    const CH38: u8 = 0b010;
    const CH39: u8 = 0b100;

    pub const ALL: ChannelMask = ChannelMask(Self::CH37 | Self::CH38 | Self::CH39);
    pub const NONE: ChannelMask = ChannelMask(0);

    pub const fn new(ch37: bool, ch38: bool, ch39: bool) -> Self {
        let mut bits = 0;
        if ch37 {
            bits |= Self::CH37;
        }
        if ch38 {
            bits |= Self::CH38;
        }
        if ch39 {
            bits |= Self::CH39;
        }
        Self(bits)
    }

    pub fn channel_37(&self) -> bool {
        self.0 & Self::CH37 != 0
    }

    pub fn channel_38(&self) -> bool {
        self.0 & Self::CH38 != 0
    }

    pub fn channel_39(&self) -> bool {
        self.0 & Self::CH39 != 0
    }

    /// Number of enabled channels.
    pub fn active_count(&self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl Default for ChannelMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Transmit power levels supported by the radio.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Eq, PartialEq, Copy, Clone, Debug, Default)]
#[repr(i8)]
pub enum TxPower {
    Minus40dBm = -40,
    Minus20dBm = -20,
    Minus16dBm = -16,
    Minus12dBm = -12,
    Minus8dBm = -8,
    Minus4dBm = -4,
    #[default]
    ZerodBm = 0,
    Plus4dBm = 4,
    Plus8dBm = 8,
}

impl TxPower {
    const LEVELS: [TxPower; 9] = [
        TxPower::Minus40dBm,
        TxPower::Minus20dBm,
        TxPower::Minus16dBm,
        TxPower::Minus12dBm,
        TxPower::Minus8dBm,
        TxPower::Minus4dBm,
        TxPower::ZerodBm,
        TxPower::Plus4dBm,
        TxPower::Plus8dBm,
    ];

    /// Lowest supported level at or above `dbm`. The radio never transmits weaker than asked.
    pub fn at_least(dbm: i8) -> Result<TxPower, Error> {
        Self::LEVELS
            .iter()
            .copied()
            .find(|level| level.dbm() >= dbm)
            .ok_or(Error::InvalidParam)
    }

    pub fn dbm(self) -> i8 {
        self as i8
    }
}
