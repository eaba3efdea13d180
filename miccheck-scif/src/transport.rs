//! SCIF transport
//!
//! libscif is loaded at run time so hosts without the MPSS stack can still
//! run every check that does not need the card daemon.

use crate::error::ScifError;

/// Blocking, message-oriented byte transport to one card endpoint
pub trait Transport: Send {
    /// Send the whole buffer
    fn send(&mut self, buf: &[u8]) -> Result<(), ScifError>;

    /// Receive up to `len` bytes
    fn recv(&mut self, len: usize) -> Result<Vec<u8>, ScifError>;
}

#[cfg(unix)]
pub use self::unix::ScifTransport;

#[cfg(unix)]
mod unix {
    use std::ffi::CStr;
    use std::os::raw::{c_char, c_int, c_void};

    use tracing::{debug, trace};

    use super::Transport;
    use crate::error::ScifError;

    const LIBSCIF: &[u8] = b"libscif.so.0\0";
    const SCIF_SEND_BLOCK: c_int = 1;
    const SCIF_RECV_BLOCK: c_int = 1;

    #[repr(C)]
    struct ScifPortId {
        node: u16,
        port: u16,
    }

    type ScifOpenFn = unsafe extern "C" fn() -> c_int;
    type ScifCloseFn = unsafe extern "C" fn(c_int) -> c_int;
    type ScifConnectFn = unsafe extern "C" fn(c_int, *mut ScifPortId) -> c_int;
    type ScifIoFn = unsafe extern "C" fn(c_int, *mut c_void, c_int, c_int) -> c_int;

    struct ScifLibrary {
        handle: *mut c_void,
        open: ScifOpenFn,
        close: ScifCloseFn,
        connect: ScifConnectFn,
        send: ScifIoFn,
        recv: ScifIoFn,
    }

    // The handle is only used from the thread owning the transport.
    unsafe impl Send for ScifLibrary {}

    fn dl_error() -> String {
        // SAFETY: dlerror returns null or a valid C string owned by libc.
        unsafe {
            let msg = libc::dlerror();
            if msg.is_null() {
                "unknown dlopen error".to_string()
            } else {
                CStr::from_ptr(msg).to_string_lossy().into_owned()
            }
        }
    }

    /// # Safety
    /// `T` must be the function pointer type matching the C symbol `name`.
    unsafe fn symbol<T: Copy>(handle: *mut c_void, name: &'static [u8]) -> Result<T, ScifError> {
        let ptr = libc::dlsym(handle, name.as_ptr() as *const c_char);
        if ptr.is_null() {
            return Err(ScifError::LibraryUnavailable(dl_error()));
        }
        Ok(std::mem::transmute_copy(&ptr))
    }

    impl ScifLibrary {
        fn load() -> Result<Self, ScifError> {
            // SAFETY: LIBSCIF is NUL terminated; symbol types mirror scif.h.
            unsafe {
                let handle = libc::dlopen(LIBSCIF.as_ptr() as *const c_char, libc::RTLD_NOW);
                if handle.is_null() {
                    return Err(ScifError::LibraryUnavailable(dl_error()));
                }
                let lib = Self::resolve(handle);
                if lib.is_err() {
                    libc::dlclose(handle);
                }
                lib
            }
        }

        unsafe fn resolve(handle: *mut c_void) -> Result<Self, ScifError> {
            Ok(Self {
                handle,
                open: symbol(handle, b"scif_open\0")?,
                close: symbol(handle, b"scif_close\0")?,
                connect: symbol(handle, b"scif_connect\0")?,
                send: symbol(handle, b"scif_send\0")?,
                recv: symbol(handle, b"scif_recv\0")?,
            })
        }
    }

    impl Drop for ScifLibrary {
        fn drop(&mut self) {
            // SAFETY: handle came from a successful dlopen.
            unsafe {
                libc::dlclose(self.handle);
            }
        }
    }

    /// Connected SCIF endpoint
    pub struct ScifTransport {
        lib: ScifLibrary,
        epd: c_int,
    }

    impl ScifTransport {
        /// Open an endpoint and connect to `port` on card `device` (SCIF node `device + 1`)
        pub fn connect(device: u32, port: u16) -> Result<Self, ScifError> {
            let lib = ScifLibrary::load()?;
            let node = device
                .checked_add(1)
                .and_then(|n| u16::try_from(n).ok())
                .ok_or_else(|| ScifError::Other(format!("invalid device index {}", device)))?;

            // SAFETY: function pointers were resolved from libscif.
            let epd = unsafe { (lib.open)() };
            if epd < 0 {
                return Err(last_error("scif_open"));
            }
            let transport = Self { lib, epd };

            let mut port_id = ScifPortId { node, port };
            // SAFETY: port_id outlives the call.
            let ret = unsafe { (transport.lib.connect)(transport.epd, &mut port_id) };
            if ret < 0 {
                return Err(last_error("scif_connect"));
            }

            debug!(device, node, port, "SCIF endpoint connected");
            Ok(transport)
        }
    }

    fn last_error(call: &'static str) -> ScifError {
        ScifError::Call {
            call,
            source: std::io::Error::last_os_error(),
        }
    }

    fn io_len(len: usize) -> Result<c_int, ScifError> {
        c_int::try_from(len).map_err(|_| ScifError::Other(format!("buffer too large: {}", len)))
    }

    impl Transport for ScifTransport {
        fn send(&mut self, buf: &[u8]) -> Result<(), ScifError> {
            let len = io_len(buf.len())?;
            // SAFETY: scif_send only reads `len` bytes from the buffer.
            let sent = unsafe {
                (self.lib.send)(self.epd, buf.as_ptr() as *mut c_void, len, SCIF_SEND_BLOCK)
            };
            if sent < 0 {
                return Err(last_error("scif_send"));
            }
            trace!(bytes = sent, "SCIF send");
            Ok(())
        }

        fn recv(&mut self, len: usize) -> Result<Vec<u8>, ScifError> {
            let mut buf = vec![0u8; len];
            let want = io_len(len)?;
            // SAFETY: buf has room for `want` bytes.
            let got = unsafe {
                (self.lib.recv)(self.epd, buf.as_mut_ptr() as *mut c_void, want, SCIF_RECV_BLOCK)
            };
            if got < 0 {
                return Err(last_error("scif_recv"));
            }
            buf.truncate(got as usize);
            trace!(bytes = got, "SCIF recv");
            Ok(buf)
        }
    }

    impl Drop for ScifTransport {
        fn drop(&mut self) {
            // SAFETY: epd is an open endpoint owned by this transport.
            unsafe {
                (self.lib.close)(self.epd);
            }
        }
    }
}

#[cfg(not(unix))]
pub struct ScifTransport {
    _private: (),
}

#[cfg(not(unix))]
impl ScifTransport {
    pub fn connect(_device: u32, _port: u16) -> Result<Self, ScifError> {
        Err(ScifError::LibraryUnavailable(
            "SCIF is only supported on Linux hosts".to_string(),
        ))
    }
}

#[cfg(not(unix))]
impl Transport for ScifTransport {
    fn send(&mut self, _buf: &[u8]) -> Result<(), ScifError> {
        unreachable!("ScifTransport cannot be constructed on this platform")
    }

    fn recv(&mut self, _len: usize) -> Result<Vec<u8>, ScifError> {
        unreachable!("ScifTransport cannot be constructed on this platform")
    }
}
