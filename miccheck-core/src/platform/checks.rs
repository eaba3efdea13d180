//! Known checks
//!
//! Names double as configuration keys for `enabled` and `--enable`.

use crate::check::{Scope, TestMeta};

pub const PCI_CARD_COUNT: TestMeta = TestMeta::default_test("pci_card_count", Scope::Host);
pub const DRIVER_LOADED: TestMeta = TestMeta::default_test("driver_loaded", Scope::Host);
pub const DRIVER_CARD_COUNT: TestMeta = TestMeta::default_test("driver_card_count", Scope::Host);
pub const MPSS_DAEMON: TestMeta = TestMeta::default_test("mpss_daemon", Scope::Host);

pub const STATE_POST: TestMeta = TestMeta::default_test("state_post", Scope::Device);
pub const SYSTOOLSD: TestMeta = TestMeta::default_test("systoolsd", Scope::Device);

pub const BIOS_VERSION: TestMeta = TestMeta::optional("bios_version", Scope::Device, 0);
pub const SMC_VERSION: TestMeta = TestMeta::optional("smc_version", Scope::Device, 1);
pub const ME_VERSION: TestMeta = TestMeta::optional("me_version", Scope::Device, 2);
pub const NTB_EEPROM_VERSION: TestMeta =
    TestMeta::optional("ntb_eeprom_version", Scope::Device, 3);
pub const PING: TestMeta = TestMeta::optional("ping", Scope::Device, 4);
pub const SSH: TestMeta = TestMeta::optional("ssh", Scope::Device, 5);
pub const COI: TestMeta = TestMeta::optional("coi", Scope::Device, 6);

/// Default host checks in execution order
pub const DEFAULT_HOST: [TestMeta; 4] =
    [PCI_CARD_COUNT, DRIVER_LOADED, DRIVER_CARD_COUNT, MPSS_DAEMON];

/// Default device checks in execution order
pub const DEFAULT_DEVICE: [TestMeta; 2] = [STATE_POST, SYSTOOLSD];

pub const OPTIONAL_DEVICE: [TestMeta; 7] = [
    BIOS_VERSION,
    SMC_VERSION,
    ME_VERSION,
    NTB_EEPROM_VERSION,
    PING,
    SSH,
    COI,
];

/// Checks turned on by `--firmware`
pub const FIRMWARE: [&str; 4] = [
    BIOS_VERSION.name,
    SMC_VERSION.name,
    ME_VERSION.name,
    NTB_EEPROM_VERSION.name,
];

/// Progress label of a known check
pub fn label(meta: &TestMeta) -> &'static str {
    match meta.name {
        "pci_card_count" => "Check number of devices the OS sees in the system",
        "driver_loaded" => "Check required drivers are loaded",
        "driver_card_count" => "Check number of devices driver sees in the system",
        "mpss_daemon" => "Check mpssd daemon is running",
        "state_post" => "Check device state and POST code",
        "systoolsd" => "Check systoolsd is running in device",
        "bios_version" => "Check BIOS version is correct",
        "smc_version" => "Check SMC firmware version is correct",
        "me_version" => "Check ME firmware version is correct",
        "ntb_eeprom_version" => "Check NTB EEPROM firmware version is correct",
        "ping" => "Check device can be pinged over its network interface",
        "ssh" => "Check device can be accessed through ssh",
        "coi" => "Check COI daemon is available in device",
        _ => "Check",
    }
}
