//! systoolsd client
//!
//! Request/response exchanges with the card-side management daemon.

use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::ScifError;
use crate::protocol::{
    MicBiosCommand, MicBiosProperty, MicBiosRequest, RequestType, SystoolsdInfo, SystoolsdReq,
    SYSTOOLSD_PORT,
};
use crate::settings::SyscfgSettings;
use crate::transport::{ScifTransport, Transport};

/// Daemon version and BIOS configuration of one card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardReport {
    pub systoolsd: SystoolsdInfo,
    /// Settings word read back for each property, in `MicBiosProperty::ALL` order
    pub bios: Vec<(MicBiosProperty, SyscfgSettings)>,
}

impl CardReport {
    /// `(property, mode)` pairs such as `("cluster", "quadrant")`
    pub fn bios_modes(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.bios
            .iter()
            .map(|(prop, settings)| (prop.name(), settings.mode_name(*prop)))
    }
}

/// Client for one card's systoolsd instance
pub struct SystoolsdClient<T: Transport> {
    transport: T,
}

impl SystoolsdClient<ScifTransport> {
    /// Connect to systoolsd on card `device`
    pub fn connect(device: u32) -> Result<Self, ScifError> {
        let transport = ScifTransport::connect(device, SYSTOOLSD_PORT)?;
        Ok(Self::new(transport))
    }
}

impl<T: Transport> SystoolsdClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Consume the client and return the transport
    pub fn into_inner(self) -> T {
        self.transport
    }

    fn send_header(&mut self, req: &SystoolsdReq) -> Result<(), ScifError> {
        self.transport.send(&req.encode())
    }

    fn recv_header(&mut self) -> Result<SystoolsdReq, ScifError> {
        let buf = self.transport.recv(SystoolsdReq::SIZE)?;
        let resp = SystoolsdReq::decode(&buf)?;
        if let Some(err) = resp.daemon_error() {
            warn!(req_type = resp.req_type, error = %err, "systoolsd reported an error");
            return Err(ScifError::Daemon(err));
        }
        Ok(resp)
    }

    /// Send GET_SYSTOOLSD_INFO and return the response header
    ///
    /// A header with zero length means the daemon accepted the connection
    /// but did not answer.
    pub fn ping(&mut self) -> Result<SystoolsdReq, ScifError> {
        self.send_header(&SystoolsdReq::new(RequestType::GetSystoolsdInfo))?;
        let resp = self.recv_header()?;
        if resp.length == 0 {
            return Err(ScifError::NoResponse);
        }
        Ok(resp)
    }

    /// Query the daemon version
    pub fn systoolsd_info(&mut self) -> Result<SystoolsdInfo, ScifError> {
        let resp = self.ping()?;
        let payload = self.transport.recv(resp.length as usize)?;
        let info = SystoolsdInfo::decode(&payload)?;
        debug!(version = %info, "systoolsd info");
        Ok(info)
    }

    /// Read the current BIOS settings word
    pub fn read_settings(&mut self, prop: MicBiosProperty) -> Result<SyscfgSettings, ScifError> {
        self.send_header(&SystoolsdReq::new(RequestType::MicBiosRequest))?;
        self.recv_header()?;
        self.transport
            .send(&MicBiosRequest::new(MicBiosCommand::Read, prop as u8, 0).encode())?;
        self.recv_header()?;
        let buf = self.transport.recv(MicBiosRequest::SIZE)?;
        let resp = MicBiosRequest::decode(&buf)?;
        Ok(SyscfgSettings::new(resp.value))
    }

    /// Daemon version plus every readable BIOS property
    pub fn card_report(&mut self) -> Result<CardReport, ScifError> {
        let systoolsd = self.systoolsd_info()?;
        let bios = MicBiosProperty::ALL
            .iter()
            .map(|prop| Ok((*prop, self.read_settings(*prop)?)))
            .collect::<Result<Vec<_>, ScifError>>()?;
        Ok(CardReport { systoolsd, bios })
    }
}

/// Run a blocking exchange with systoolsd, bounded by `timeout`
///
/// The exchange runs on its own detached thread. A daemon that accepts the
/// connection and never answers leaves that thread parked in `recv`, but
/// neither the caller nor runtime shutdown wait for it.
pub async fn exchange<T, C, F, R>(connect: C, timeout: Duration, f: F) -> Result<R, ScifError>
where
    T: Transport + 'static,
    C: FnOnce() -> Result<SystoolsdClient<T>, ScifError> + Send + 'static,
    F: FnOnce(&mut SystoolsdClient<T>) -> Result<R, ScifError> + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("systoolsd".to_string())
        .spawn(move || {
            let result = connect().and_then(|mut client| f(&mut client));
            let _ = tx.send(result);
        })
        .map_err(|e| ScifError::Other(format!("could not start SCIF thread: {}", e)))?;

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(ScifError::Other("SCIF exchange ended without a result".to_string())),
        Err(_) => Err(ScifError::Timeout(timeout)),
    }
}

/// Check that systoolsd answers on card `device` within `timeout`
pub async fn probe_systoolsd(device: u32, timeout: Duration) -> Result<SystoolsdReq, ScifError> {
    exchange(move || SystoolsdClient::connect(device), timeout, |c| c.ping()).await
}

/// Read the daemon version and BIOS settings of card `device` within `timeout`
pub async fn query_card(device: u32, timeout: Duration) -> Result<CardReport, ScifError> {
    exchange(
        move || SystoolsdClient::connect(device),
        timeout,
        |c| c.card_report(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::protocol::DaemonErrorCode;

    /// Transport replaying canned responses and recording what was sent
    #[derive(Default)]
    struct ScriptedTransport {
        sent: Vec<Vec<u8>>,
        replies: VecDeque<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn reply(mut self, buf: &[u8]) -> Self {
            self.replies.push_back(buf.to_vec());
            self
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&mut self, buf: &[u8]) -> Result<(), ScifError> {
            self.sent.push(buf.to_vec());
            Ok(())
        }

        fn recv(&mut self, _len: usize) -> Result<Vec<u8>, ScifError> {
            self.replies
                .pop_front()
                .ok_or_else(|| ScifError::Other("no more replies".to_string()))
        }
    }

    fn header(length: u16, card_errno: u16) -> Vec<u8> {
        let mut req = SystoolsdReq::new(RequestType::GetSystoolsdInfo);
        req.length = length;
        req.card_errno = card_errno;
        req.encode().to_vec()
    }

    #[test]
    fn test_systoolsd_info() {
        let transport = ScriptedTransport::default().reply(&header(2, 0)).reply(&[2, 7]);
        let mut client = SystoolsdClient::new(transport);

        let info = client.systoolsd_info().unwrap();
        assert_eq!(info.major_ver, 2);
        assert_eq!(info.minor_ver, 7);
        assert_eq!(info.to_string(), "2.7");

        let transport = client.into_inner();
        assert_eq!(transport.sent.len(), 1);
        assert_eq!(&transport.sent[0][0..2], &[1, 0]);
    }

    #[test]
    fn test_ping_without_response() {
        let transport = ScriptedTransport::default().reply(&header(0, 0));
        let mut client = SystoolsdClient::new(transport);
        assert!(matches!(client.ping(), Err(ScifError::NoResponse)));
    }

    #[test]
    fn test_daemon_error_is_reported() {
        let transport = ScriptedTransport::default().reply(&header(0, 6));
        let mut client = SystoolsdClient::new(transport);
        assert!(matches!(
            client.ping(),
            Err(ScifError::Daemon(DaemonErrorCode::InsufficientPrivileges))
        ));
    }

    #[test]
    fn test_read_settings() {
        let record = MicBiosRequest::new(MicBiosCommand::Read, 0x01, 4 | (1 << 4));
        let transport = ScriptedTransport::default()
            .reply(&header(0, 0))
            .reply(&header(10, 0))
            .reply(&record.encode());
        let mut client = SystoolsdClient::new(transport);

        let read = client.read_settings(MicBiosProperty::Cluster).unwrap();
        assert_eq!(read.mode_name(MicBiosProperty::Cluster), "quadrant");
        assert_eq!(read.mode_name(MicBiosProperty::Ecc), "enable");

        let transport = client.into_inner();
        assert_eq!(transport.sent.len(), 2);
        assert_eq!(transport.sent[0][0], 17);
        assert_eq!(&transport.sent[1][0..2], &[0, 0x01]);
    }

    #[test]
    fn test_read_rejected_by_daemon() {
        let transport = ScriptedTransport::default().reply(&header(0, 6));
        let mut client = SystoolsdClient::new(transport);

        let err = client.read_settings(MicBiosProperty::Fwlock).unwrap_err();
        assert_eq!(err.to_string(), "daemon error: insufficient privileges");
    }

    #[test]
    fn test_card_report() {
        let word = 2 | (2 << 4);
        let mut transport = ScriptedTransport::default()
            .reply(&header(2, 0))
            .reply(&[1, 3]);
        for prop in MicBiosProperty::ALL {
            let record = MicBiosRequest::new(MicBiosCommand::Read, prop as u8, word);
            transport = transport
                .reply(&header(0, 0))
                .reply(&header(10, 0))
                .reply(&record.encode());
        }
        let mut client = SystoolsdClient::new(transport);

        let report = client.card_report().unwrap();
        assert_eq!(report.systoolsd.to_string(), "1.3");
        let modes: Vec<_> = report.bios_modes().collect();
        assert_eq!(modes.len(), 7);
        assert_eq!(modes[0], ("cluster", "snc4"));
        assert_eq!(modes[1], ("ecc", "auto"));
        assert_eq!(modes[6], ("fwlock", "disable"));
    }

    /// Transport whose daemon accepted the connection but never answers
    struct SilentTransport;

    impl Transport for SilentTransport {
        fn send(&mut self, _buf: &[u8]) -> Result<(), ScifError> {
            Ok(())
        }

        fn recv(&mut self, _len: usize) -> Result<Vec<u8>, ScifError> {
            std::thread::sleep(Duration::from_secs(30));
            Err(ScifError::NoResponse)
        }
    }

    #[tokio::test]
    async fn test_exchange_times_out_on_silent_daemon() {
        let start = std::time::Instant::now();
        let err = exchange(
            || Ok(SystoolsdClient::new(SilentTransport)),
            Duration::from_millis(50),
            |c| c.ping(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ScifError::Timeout(_)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_silent_daemon_does_not_block_runtime_shutdown() {
        let start = std::time::Instant::now();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let result = runtime.block_on(exchange(
            || Ok(SystoolsdClient::new(SilentTransport)),
            Duration::from_millis(50),
            |c| c.ping(),
        ));
        drop(runtime);

        assert!(matches!(result, Err(ScifError::Timeout(_))));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_exchange_reports_connect_error() {
        let err = exchange(
            || -> Result<SystoolsdClient<SilentTransport>, ScifError> {
                Err(ScifError::LibraryUnavailable("libscif.so.0".to_string()))
            },
            Duration::from_secs(1),
            |c| c.ping(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "SCIF library unavailable: libscif.so.0");
    }
}
