//! systoolsd wire protocol
//!
//! All structures are packed and little endian, matching the layout the
//! card-side daemon reads straight off the SCIF endpoint.

use std::fmt;

use crate::error::ScifError;

/// SCIF port the systoolsd daemon listens on
pub const SYSTOOLSD_PORT: u16 = 130;

/// Maximum payload carried inline in a request header
pub const SYSTOOLSDREQ_MAX_DATA_LENGTH: usize = 16;

/// Request types understood by systoolsd
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RequestType {
    GetSystoolsdInfo = 0x01,
    GetMemoryUtilization = 0x02,
    GetDeviceInfo = 0x03,
    GetPowerUsage = 0x04,
    GetThermalInfo = 0x05,
    GetVoltageInfo = 0x06,
    GetDiagnosticsInfo = 0x07,
    GetFwUpdateInfo = 0x08,
    GetMemoryInfo = 0x09,
    GetProcessorInfo = 0x0a,
    GetCoresInfo = 0x0b,
    GetCoreUsage = 0x0c,
    GetPthreshInfo = 0x0d,
    GetSmbaInfo = 0x0e,
    GetTurboInfo = 0x0f,
    ReadSmcReg = 0x10,
    MicBiosRequest = 0x11,
}

/// Error codes systoolsd reports in `card_errno`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonErrorCode {
    Unknown,
    UnsupportedRequest,
    InvalidStruct,
    InvalidArgument,
    TooBusy,
    InsufficientPrivileges,
    DeviceBusy,
    RestartInProgress,
    SmcError,
    IoError,
    InternalError,
    ScifError,
}

impl DaemonErrorCode {
    /// Map a raw `card_errno`; zero means success and yields `None`
    pub fn from_code(code: u16) -> Option<Self> {
        let err = match code {
            0 => return None,
            2 => DaemonErrorCode::UnsupportedRequest,
            3 => DaemonErrorCode::InvalidStruct,
            4 => DaemonErrorCode::InvalidArgument,
            5 => DaemonErrorCode::TooBusy,
            6 => DaemonErrorCode::InsufficientPrivileges,
            7 => DaemonErrorCode::DeviceBusy,
            8 => DaemonErrorCode::RestartInProgress,
            9 => DaemonErrorCode::SmcError,
            10 => DaemonErrorCode::IoError,
            11 => DaemonErrorCode::InternalError,
            12 => DaemonErrorCode::ScifError,
            _ => DaemonErrorCode::Unknown,
        };
        Some(err)
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            DaemonErrorCode::Unknown => "unknown error",
            DaemonErrorCode::UnsupportedRequest => "unsupported request",
            DaemonErrorCode::InvalidStruct => "invalid structure",
            DaemonErrorCode::InvalidArgument => "invalid argument",
            DaemonErrorCode::TooBusy => "daemon too busy",
            DaemonErrorCode::InsufficientPrivileges => "insufficient privileges",
            DaemonErrorCode::DeviceBusy => "device busy",
            DaemonErrorCode::RestartInProgress => "restart in progress",
            DaemonErrorCode::SmcError => "SMC error",
            DaemonErrorCode::IoError => "I/O error",
            DaemonErrorCode::InternalError => "internal error",
            DaemonErrorCode::ScifError => "SCIF error",
        }
    }
}

impl fmt::Display for DaemonErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Request/response header exchanged with systoolsd
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystoolsdReq {
    pub req_type: u16,
    pub length: u16,
    pub card_errno: u16,
    pub extra: u32,
    pub data: [u8; SYSTOOLSDREQ_MAX_DATA_LENGTH],
}

impl SystoolsdReq {
    /// Encoded size in bytes
    pub const SIZE: usize = 2 + 2 + 2 + 4 + SYSTOOLSDREQ_MAX_DATA_LENGTH;

    /// Create a header for the given request type
    pub fn new(req_type: RequestType) -> Self {
        Self {
            req_type: req_type as u16,
            ..Self::default()
        }
    }

    /// Copy `data` into the inline payload, truncating at 16 bytes
    pub fn with_data(mut self, data: &[u8]) -> Self {
        let n = data.len().min(SYSTOOLSDREQ_MAX_DATA_LENGTH);
        self.data = [0; SYSTOOLSDREQ_MAX_DATA_LENGTH];
        self.data[..n].copy_from_slice(&data[..n]);
        self
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.req_type.to_le_bytes());
        buf[2..4].copy_from_slice(&self.length.to_le_bytes());
        buf[4..6].copy_from_slice(&self.card_errno.to_le_bytes());
        buf[6..10].copy_from_slice(&self.extra.to_le_bytes());
        buf[10..].copy_from_slice(&self.data);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ScifError> {
        if buf.len() < Self::SIZE {
            return Err(ScifError::ShortRead {
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }
        let mut data = [0u8; SYSTOOLSDREQ_MAX_DATA_LENGTH];
        data.copy_from_slice(&buf[10..Self::SIZE]);
        Ok(Self {
            req_type: u16::from_le_bytes([buf[0], buf[1]]),
            length: u16::from_le_bytes([buf[2], buf[3]]),
            card_errno: u16::from_le_bytes([buf[4], buf[5]]),
            extra: u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]),
            data,
        })
    }

    /// Daemon error carried by a response header, if any
    pub fn daemon_error(&self) -> Option<DaemonErrorCode> {
        DaemonErrorCode::from_code(self.card_errno)
    }
}

/// micbios sub-commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MicBiosCommand {
    Read = 0,
    Write = 1,
    ChangePassword = 2,
}

/// BIOS properties addressable through micbios requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MicBiosProperty {
    Cluster = 0x01,
    Ecc = 0x02,
    ApeiSupport = 0x04,
    ApeiFfm = 0x08,
    ApeiEinj = 0x10,
    ApeiEinjTable = 0x20,
    Fwlock = 0x40,
}

impl MicBiosProperty {
    pub const ALL: [MicBiosProperty; 7] = [
        MicBiosProperty::Cluster,
        MicBiosProperty::Ecc,
        MicBiosProperty::ApeiSupport,
        MicBiosProperty::ApeiFfm,
        MicBiosProperty::ApeiEinj,
        MicBiosProperty::ApeiEinjTable,
        MicBiosProperty::Fwlock,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MicBiosProperty::Cluster => "cluster",
            MicBiosProperty::Ecc => "ecc",
            MicBiosProperty::ApeiSupport => "apei_supp",
            MicBiosProperty::ApeiFfm => "apei_ffm",
            MicBiosProperty::ApeiEinj => "apei_einj",
            MicBiosProperty::ApeiEinjTable => "apei_table",
            MicBiosProperty::Fwlock => "fwlock",
        }
    }
}

/// Command record following a `MicBiosRequest` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicBiosRequest {
    pub cmd: u8,
    pub prop: u8,
    pub value: u64,
}

impl MicBiosRequest {
    pub const SIZE: usize = 1 + 1 + 8;

    pub fn new(cmd: MicBiosCommand, prop: u8, value: u64) -> Self {
        Self {
            cmd: cmd as u8,
            prop,
            value,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.cmd;
        buf[1] = self.prop;
        buf[2..].copy_from_slice(&self.value.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ScifError> {
        if buf.len() < Self::SIZE {
            return Err(ScifError::ShortRead {
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }
        let mut value = [0u8; 8];
        value.copy_from_slice(&buf[2..Self::SIZE]);
        Ok(Self {
            cmd: buf[0],
            prop: buf[1],
            value: u64::from_le_bytes(value),
        })
    }
}

/// Payload of a GET_SYSTOOLSD_INFO response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystoolsdInfo {
    pub major_ver: u8,
    pub minor_ver: u8,
}

impl SystoolsdInfo {
    pub const SIZE: usize = 2;

    pub fn decode(buf: &[u8]) -> Result<Self, ScifError> {
        if buf.len() < Self::SIZE {
            return Err(ScifError::ShortRead {
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }
        Ok(Self {
            major_ver: buf[0],
            minor_ver: buf[1],
        })
    }
}

impl fmt::Display for SystoolsdInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major_ver, self.minor_ver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let req = SystoolsdReq {
            req_type: RequestType::MicBiosRequest as u16,
            length: 0x0203,
            card_errno: 0x0405,
            extra: 0x0a0b0c0d,
            data: [0; 16],
        }
        .with_data(b"secret");

        let buf = req.encode();
        assert_eq!(buf.len(), 26);
        assert_eq!(&buf[0..2], &[0x11, 0x00]);
        assert_eq!(&buf[2..4], &[0x03, 0x02]);
        assert_eq!(&buf[4..6], &[0x05, 0x04]);
        assert_eq!(&buf[6..10], &[0x0d, 0x0c, 0x0b, 0x0a]);
        assert_eq!(&buf[10..16], b"secret");
        assert!(buf[16..].iter().all(|b| *b == 0));

        assert_eq!(SystoolsdReq::decode(&buf).unwrap(), req);
    }

    #[test]
    fn test_header_short_read() {
        let err = SystoolsdReq::decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(
            err,
            ScifError::ShortRead {
                expected: 26,
                actual: 10
            }
        ));
    }

    #[test]
    fn test_micbios_request_layout() {
        let req = MicBiosRequest::new(MicBiosCommand::Write, MicBiosProperty::Ecc as u8, 0x20);
        let buf = req.encode();
        assert_eq!(buf.len(), 10);
        assert_eq!(buf[0], 1);
        assert_eq!(buf[1], 0x02);
        assert_eq!(buf[2], 0x20);
        assert!(buf[3..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_daemon_error_codes() {
        assert_eq!(DaemonErrorCode::from_code(0), None);
        assert_eq!(
            DaemonErrorCode::from_code(6),
            Some(DaemonErrorCode::InsufficientPrivileges)
        );
        assert_eq!(DaemonErrorCode::from_code(1), Some(DaemonErrorCode::Unknown));
        assert_eq!(DaemonErrorCode::from_code(99), Some(DaemonErrorCode::Unknown));
    }
}
