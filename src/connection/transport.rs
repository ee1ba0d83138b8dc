use std::env;
use std::io;
use std::mem::size_of;
use std::net::Shutdown;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::error::{Error, ErrorKind, Result};

const ENV_STARTER_ADDRESS: &str = "DBUS_STARTER_ADDRESS";
const ENV_SESSION_BUS: &str = "DBUS_SESSION_BUS_ADDRESS";
const ENV_SYSTEM_BUS: &str = "DBUS_SYSTEM_BUS_ADDRESS";
const DEFAULT_SYSTEM_BUS: &str = "unix:path=/var/run/dbus/system_bus_socket";

/// An opaque byte-oriented duplex channel to a peer, which can also pass
/// file descriptors out-of-band.
///
/// The message layer consumes this interface and assumes nothing about the
/// underlying address family. The stock implementation is
/// [`UnixTransport`].
pub trait Transport: Send {
    /// Read up to `buf.len()` bytes. Descriptors received out-of-band with
    /// this chunk are appended to `fds`.
    ///
    /// Returns zero when the peer has closed the channel.
    fn recv(&mut self, buf: &mut [u8], fds: &mut Vec<OwnedFd>) -> io::Result<usize>;

    /// Write all of `buf`, passing `fds` out-of-band with the first bytes.
    fn send_all(&mut self, buf: &[u8], fds: &[RawFd]) -> io::Result<()>;

    /// Set the timeout for subsequent [`recv`] calls.
    ///
    /// [`recv`]: Self::recv
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Shut the channel down in both directions, waking blocked peers.
    fn shutdown(&self) -> io::Result<()>;

    /// Split into independently usable read and write halves.
    fn split(self: Box<Self>) -> io::Result<(Box<dyn Transport>, Box<dyn Transport>)>;
}

/// A [`Transport`] over a unix stream socket, with `SCM_RIGHTS` descriptor
/// passing.
pub struct UnixTransport {
    stream: UnixStream,
}

impl UnixTransport {
    /// Connect to the given D-Bus address.
    ///
    /// Supports the `unix:path=` and, on Linux, `unix:abstract=` address
    /// formats.
    pub fn connect(address: &str) -> Result<Self> {
        let stream = match parse_address(address)? {
            Address::Path(path) => UnixStream::connect(path)?,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Address::Abstract(name) => {
                use std::os::linux::net::SocketAddrExt;

                let addr = std::os::unix::net::SocketAddr::from_abstract_name(name)?;
                UnixStream::connect_addr(&addr)?
            }
        };

        Ok(Self { stream })
    }

    /// Connect to the session bus.
    ///
    /// The address is taken from the `DBUS_STARTER_ADDRESS` or
    /// `DBUS_SESSION_BUS_ADDRESS` environment variables.
    pub fn session_bus() -> Result<Self> {
        Self::from_env([ENV_STARTER_ADDRESS, ENV_SESSION_BUS], None)
    }

    /// Connect to the system bus.
    ///
    /// The address is taken from the `DBUS_STARTER_ADDRESS` or
    /// `DBUS_SYSTEM_BUS_ADDRESS` environment variables, falling back to the
    /// well-known system bus socket path.
    pub fn system_bus() -> Result<Self> {
        Self::from_env([ENV_STARTER_ADDRESS, ENV_SYSTEM_BUS], Some(DEFAULT_SYSTEM_BUS))
    }

    fn from_env<const N: usize>(envs: [&str; N], default: Option<&str>) -> Result<Self> {
        for env in envs {
            if let Ok(address) = env::var(env) {
                return Self::connect(&address);
            }
        }

        match default {
            Some(address) => Self::connect(address),
            None => Err(Error::new(ErrorKind::MissingBus)),
        }
    }

    /// Wrap an already connected unix stream.
    pub fn from_std(stream: UnixStream) -> Self {
        Self { stream }
    }

    fn send_chunk(&mut self, buf: &[u8], fds: &[RawFd]) -> io::Result<usize> {
        let mut iov = libc::iovec {
            iov_base: buf.as_ptr() as *mut libc::c_void,
            iov_len: buf.len(),
        };

        let mut control = Vec::new();

        // SAFETY: The msghdr is zero-initialized and every pointer stored in
        // it outlives the sendmsg call.
        unsafe {
            let mut msg: libc::msghdr = std::mem::zeroed();
            msg.msg_iov = &mut iov;
            msg.msg_iovlen = 1;

            if !fds.is_empty() {
                let payload = size_of::<RawFd>() * fds.len();
                control.resize(libc::CMSG_SPACE(payload as u32) as usize, 0u8);

                msg.msg_control = control.as_mut_ptr() as *mut libc::c_void;
                msg.msg_controllen = control.len() as _;

                let cmsg = libc::CMSG_FIRSTHDR(&msg);
                (*cmsg).cmsg_level = libc::SOL_SOCKET;
                (*cmsg).cmsg_type = libc::SCM_RIGHTS;
                (*cmsg).cmsg_len = libc::CMSG_LEN(payload as u32) as _;

                let data = libc::CMSG_DATA(cmsg) as *mut RawFd;

                for (n, fd) in fds.iter().enumerate() {
                    data.add(n).write_unaligned(*fd);
                }
            }

            loop {
                let n = libc::sendmsg(self.stream.as_raw_fd(), &msg, 0);

                if n < 0 {
                    let error = io::Error::last_os_error();

                    if error.kind() == io::ErrorKind::Interrupted {
                        continue;
                    }

                    return Err(error);
                }

                return Ok(n as usize);
            }
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
const RECV_FLAGS: libc::c_int = libc::MSG_CMSG_CLOEXEC;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
const RECV_FLAGS: libc::c_int = 0;

impl Transport for UnixTransport {
    fn recv(&mut self, buf: &mut [u8], fds: &mut Vec<OwnedFd>) -> io::Result<usize> {
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr() as *mut libc::c_void,
            iov_len: buf.len(),
        };

        // Room for a healthy batch of descriptors in one chunk.
        let mut control = [0u8; 256];

        // SAFETY: The msghdr is zero-initialized and every pointer stored in
        // it outlives the recvmsg call; received descriptors are immediately
        // taken into ownership.
        unsafe {
            let mut msg: libc::msghdr = std::mem::zeroed();
            msg.msg_iov = &mut iov;
            msg.msg_iovlen = 1;
            msg.msg_control = control.as_mut_ptr() as *mut libc::c_void;
            msg.msg_controllen = control.len() as _;

            let n = loop {
                let n = libc::recvmsg(self.stream.as_raw_fd(), &mut msg, RECV_FLAGS);

                if n < 0 {
                    let error = io::Error::last_os_error();

                    if error.kind() == io::ErrorKind::Interrupted {
                        continue;
                    }

                    return Err(error);
                }

                break n as usize;
            };

            let mut cmsg = libc::CMSG_FIRSTHDR(&msg);

            while !cmsg.is_null() {
                if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS
                {
                    let payload = (*cmsg).cmsg_len as usize - libc::CMSG_LEN(0) as usize;
                    let count = payload / size_of::<RawFd>();
                    let data = libc::CMSG_DATA(cmsg) as *const RawFd;

                    for i in 0..count {
                        fds.push(OwnedFd::from_raw_fd(data.add(i).read_unaligned()));
                    }
                }

                cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
            }

            Ok(n)
        }
    }

    fn send_all(&mut self, mut buf: &[u8], fds: &[RawFd]) -> io::Result<()> {
        let mut fds = Some(fds).filter(|fds| !fds.is_empty());

        while !buf.is_empty() {
            let n = self.send_chunk(buf, fds.take().unwrap_or(&[]))?;

            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero));
            }

            buf = &buf[n..];
        }

        Ok(())
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }

    fn split(self: Box<Self>) -> io::Result<(Box<dyn Transport>, Box<dyn Transport>)> {
        let reader = self.stream.try_clone()?;

        Ok((
            Box::new(UnixTransport { stream: reader }),
            Box::new(UnixTransport {
                stream: self.stream,
            }),
        ))
    }
}

enum Address<'a> {
    Path(&'a str),
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Abstract(&'a [u8]),
}

fn parse_address(address: &str) -> Result<Address<'_>> {
    let Some(rest) = address.strip_prefix("unix:") else {
        return Err(Error::new(ErrorKind::InvalidAddress));
    };

    // Only the first key of the address is interpreted; the remaining
    // comma-separated keys are guid hints and the like.
    let first = rest.split(',').next().unwrap_or(rest);

    let Some((key, value)) = first.split_once('=') else {
        return Err(Error::new(ErrorKind::InvalidAddress));
    };

    match key {
        "path" => Ok(Address::Path(value)),
        #[cfg(any(target_os = "linux", target_os = "android"))]
        "abstract" => Ok(Address::Abstract(value.as_bytes())),
        _ => Err(Error::new(ErrorKind::InvalidAddress)),
    }
}
