//! miccheck SCIF support
//!
//! Wire protocol, BIOS settings word and SCIF transport used to talk to the
//! systoolsd management daemon running on each coprocessor.

pub mod client;
pub mod error;
pub mod protocol;
pub mod settings;
pub mod transport;

pub use client::{exchange, probe_systoolsd, query_card, CardReport, SystoolsdClient};
pub use error::ScifError;
pub use protocol::{DaemonErrorCode, MicBiosProperty, SystoolsdInfo, SystoolsdReq, SYSTOOLSD_PORT};
pub use settings::SyscfgSettings;
pub use transport::{ScifTransport, Transport};
