//! Bit-packed BIOS settings word carried in `MicBiosRequest::value`
//!
//! | field      | bits  |
//! |------------|-------|
//! | cluster    | 0-3   |
//! | ecc        | 4-6   |
//! | apei-supp  | 7-8   |
//! | apei-einj  | 9-10  |
//! | apei-ffm   | 11-12 |
//! | apei-table | 13-14 |
//! | fwlock     | 15-16 |

use crate::protocol::MicBiosProperty;

const CLUSTER_SHIFT: u32 = 0;
const ECC_SHIFT: u32 = 4;
const APEI_SUPP_SHIFT: u32 = 7;
const APEI_EINJ_SHIFT: u32 = 9;
const APEI_FFM_SHIFT: u32 = 11;
const APEI_TABLE_SHIFT: u32 = 13;
const FWLOCK_SHIFT: u32 = 15;

const CLUSTER_MASK: u64 = 0b1111;
const ECC_MASK: u64 = 0b111;
const FLAG_MASK: u64 = 0b11;

/// Decoded view of a settings word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyscfgSettings {
    value: u64,
}

impl SyscfgSettings {
    pub fn new(value: u64) -> Self {
        Self { value }
    }

    /// Raw word as sent on the wire
    pub fn value(&self) -> u64 {
        self.value
    }

    fn field(&self, shift: u32, mask: u64) -> u8 {
        ((self.value >> shift) & mask) as u8
    }

    pub fn cluster(&self) -> u8 {
        self.field(CLUSTER_SHIFT, CLUSTER_MASK)
    }

    pub fn ecc(&self) -> u8 {
        self.field(ECC_SHIFT, ECC_MASK)
    }

    pub fn apei_supp(&self) -> u8 {
        self.field(APEI_SUPP_SHIFT, FLAG_MASK)
    }

    pub fn apei_einj(&self) -> u8 {
        self.field(APEI_EINJ_SHIFT, FLAG_MASK)
    }

    pub fn apei_ffm(&self) -> u8 {
        self.field(APEI_FFM_SHIFT, FLAG_MASK)
    }

    pub fn apei_table(&self) -> u8 {
        self.field(APEI_TABLE_SHIFT, FLAG_MASK)
    }

    pub fn fwlock(&self) -> u8 {
        self.field(FWLOCK_SHIFT, FLAG_MASK)
    }

    /// Mode name of one property, e.g. "quadrant" or "enable"
    pub fn mode_name(&self, prop: MicBiosProperty) -> &'static str {
        match prop {
            MicBiosProperty::Cluster => cluster_mode_name(self.cluster()),
            MicBiosProperty::Ecc => ecc_mode_name(self.ecc()),
            MicBiosProperty::ApeiSupport => flag_name(self.apei_supp()),
            MicBiosProperty::ApeiEinj => flag_name(self.apei_einj()),
            MicBiosProperty::ApeiFfm => flag_name(self.apei_ffm()),
            MicBiosProperty::ApeiEinjTable => flag_name(self.apei_table()),
            MicBiosProperty::Fwlock => flag_name(self.fwlock()),
        }
    }
}

pub fn cluster_mode_name(v: u8) -> &'static str {
    match v {
        0 => "all2all",
        1 => "snc2",
        2 => "snc4",
        3 => "hemisphere",
        4 => "quadrant",
        5 => "auto",
        _ => "unknown",
    }
}

pub fn ecc_mode_name(v: u8) -> &'static str {
    match v {
        0 => "disable",
        1 => "enable",
        2 => "auto",
        _ => "unknown",
    }
}

fn flag_name(v: u8) -> &'static str {
    match v {
        0 => "disable",
        1 => "enable",
        _ => "unknown",
    }
}
