//! Socket calls issued by batch writers.
//!
//! Writers only need three sends: plain, GSO-segmented, and sendmmsg. They are
//! abstracted by [`BatchSocket`] so the send path can plug in its own socket
//! (or a mock). [`UdpBatchSocket`] is the production implementation:
//!
//! - Linux: `sendmsg` with a `UDP_SEGMENT` control message, `sendmmsg` with
//!   pre-allocated headers (1 syscall per batch)
//! - Other platforms: one `send_to` per message, GSO reported unsupported

use std::io::{self, IoSlice};
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};

/// Socket send buffer (8MB, batches can be large)
const SOCKET_BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// Per-call send options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WriteOptions {
    /// GSO segment size in bytes; 0 disables segmentation
    pub gso: u16,
}

impl WriteOptions {
    pub fn gso(segment_size: u16) -> Self {
        Self { gso: segment_size }
    }
}

/// One sendmmsg entry.
#[derive(Debug)]
pub struct Message<'a> {
    pub addr: SocketAddr,
    pub bufs: &'a [IoSlice<'a>],
    pub options: WriteOptions,
}

impl Message<'_> {
    pub fn len(&self) -> usize {
        self.bufs.iter().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sends a batch writer needs from its socket.
///
/// All calls are synchronous and return what the kernel accepted. Errors are
/// returned as-is; retry policy belongs to the caller.
pub trait BatchSocket {
    /// Send `bufs` (gathered) as one datagram. Returns bytes sent.
    fn write(&mut self, addr: &SocketAddr, bufs: &[IoSlice<'_>]) -> io::Result<usize>;

    /// Send `bufs` as one buffer split by the kernel into `options.gso`-sized
    /// segments. Returns bytes sent.
    fn write_gso(
        &mut self,
        addr: &SocketAddr,
        bufs: &[IoSlice<'_>],
        options: WriteOptions,
    ) -> io::Result<usize>;

    /// Send every message in one call. Returns the number of messages sent.
    fn write_many(&mut self, msgs: &[Message<'_>]) -> io::Result<usize>;
}

impl<S: BatchSocket + ?Sized> BatchSocket for &mut S {
    fn write(&mut self, addr: &SocketAddr, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        (**self).write(addr, bufs)
    }

    fn write_gso(
        &mut self,
        addr: &SocketAddr,
        bufs: &[IoSlice<'_>],
        options: WriteOptions,
    ) -> io::Result<usize> {
        (**self).write_gso(addr, bufs, options)
    }

    fn write_many(&mut self, msgs: &[Message<'_>]) -> io::Result<usize> {
        (**self).write_many(msgs)
    }
}

/// UDP socket with batched send support.
pub struct UdpBatchSocket {
    socket: Socket,
    #[cfg(target_os = "linux")]
    sender: linux::MmsgSender,
}

impl UdpBatchSocket {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        // Best effort: the kernel may clamp it
        let _ = socket.set_send_buffer_size(SOCKET_BUFFER_SIZE);
        socket.bind(&addr.into())?;
        Ok(Self::from_socket(socket))
    }

    pub fn from_socket(socket: Socket) -> Self {
        Self {
            socket,
            #[cfg(target_os = "linux")]
            sender: linux::MmsgSender::new(),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket
            .local_addr()?
            .as_socket()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "not an inet socket"))
    }

    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    /// Is UDP GSO usable on this socket? Probe once at setup.
    #[cfg(target_os = "linux")]
    pub fn probe_gso(&self) -> bool {
        use std::os::unix::io::AsRawFd;
        linux::probe_gso(self.socket.as_raw_fd())
    }

    #[cfg(not(target_os = "linux"))]
    pub fn probe_gso(&self) -> bool {
        false
    }
}

#[cfg(target_os = "linux")]
impl BatchSocket for UdpBatchSocket {
    fn write(&mut self, addr: &SocketAddr, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        use std::os::unix::io::AsRawFd;
        linux::send_msg(self.socket.as_raw_fd(), addr, bufs, 0)
    }

    fn write_gso(
        &mut self,
        addr: &SocketAddr,
        bufs: &[IoSlice<'_>],
        options: WriteOptions,
    ) -> io::Result<usize> {
        use std::os::unix::io::AsRawFd;
        linux::send_msg(self.socket.as_raw_fd(), addr, bufs, options.gso)
    }

    fn write_many(&mut self, msgs: &[Message<'_>]) -> io::Result<usize> {
        use std::os::unix::io::AsRawFd;
        self.sender.send(self.socket.as_raw_fd(), msgs)
    }
}

// Non-Linux: one syscall per message, no GSO
#[cfg(not(target_os = "linux"))]
impl BatchSocket for UdpBatchSocket {
    fn write(&mut self, addr: &SocketAddr, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        self.socket.send_to_vectored(bufs, &(*addr).into())
    }

    fn write_gso(
        &mut self,
        _: &SocketAddr,
        _: &[IoSlice<'_>],
        _: WriteOptions,
    ) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "UDP GSO: Linux only",
        ))
    }

    fn write_many(&mut self, msgs: &[Message<'_>]) -> io::Result<usize> {
        for (i, msg) in msgs.iter().enumerate() {
            let res = if msg.options.gso > 0 {
                self.write_gso(&msg.addr, msg.bufs, msg.options)
            } else {
                self.write(&msg.addr, msg.bufs)
            };
            if let Err(e) = res {
                return if i == 0 { Err(e) } else { Ok(i) };
            }
        }
        Ok(msgs.len())
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::Message;
    use socket2::SockAddr;
    use std::io::{self, IoSlice};
    use std::mem;
    use std::net::SocketAddr;
    use std::os::unix::io::RawFd;

    /// Room for one u16 control message (CMSG_SPACE(2) is 24 on 64-bit)
    const CMSG_BUF_LEN: usize = 32;

    #[repr(C, align(8))]
    #[derive(Clone, Copy)]
    pub(super) struct CmsgBuf([u8; CMSG_BUF_LEN]);

    impl CmsgBuf {
        const fn zeroed() -> Self {
            Self([0u8; CMSG_BUF_LEN])
        }
    }

    /// Attach a UDP_SEGMENT control message to `hdr`.
    ///
    /// # Safety
    /// `control` must outlive every use of `hdr`.
    unsafe fn set_gso_cmsg(hdr: &mut libc::msghdr, control: &mut CmsgBuf, gso: u16) {
        let space = libc::CMSG_SPACE(mem::size_of::<u16>() as u32) as usize;
        debug_assert!(space <= CMSG_BUF_LEN);
        hdr.msg_control = control.0.as_mut_ptr() as *mut libc::c_void;
        hdr.msg_controllen = space as _;
        let cmsg = libc::CMSG_FIRSTHDR(hdr);
        (*cmsg).cmsg_level = libc::SOL_UDP;
        (*cmsg).cmsg_type = libc::UDP_SEGMENT;
        (*cmsg).cmsg_len = libc::CMSG_LEN(mem::size_of::<u16>() as u32) as _;
        std::ptr::write_unaligned(libc::CMSG_DATA(cmsg) as *mut u16, gso);
    }

    pub(super) fn send_msg(
        fd: RawFd,
        addr: &SocketAddr,
        bufs: &[IoSlice<'_>],
        gso: u16,
    ) -> io::Result<usize> {
        let addr = SockAddr::from(*addr);
        let mut control = CmsgBuf::zeroed();
        // Safety: msghdr is valid when zeroed; IoSlice is ABI-compatible with iovec
        let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
        hdr.msg_name = addr.as_ptr() as *mut libc::c_void;
        hdr.msg_namelen = addr.len() as libc::socklen_t;
        hdr.msg_iov = bufs.as_ptr() as *mut libc::iovec;
        hdr.msg_iovlen = bufs.len() as _;
        if gso > 0 {
            unsafe { set_gso_cmsg(&mut hdr, &mut control, gso) };
        }

        let r = unsafe { libc::sendmsg(fd, &hdr, 0) };
        if r < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(r as usize)
        }
    }

    pub(super) fn probe_gso(fd: RawFd) -> bool {
        let mut val: libc::c_int = 0;
        let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
        let r = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_UDP,
                libc::UDP_SEGMENT,
                &mut val as *mut libc::c_int as *mut libc::c_void,
                &mut len,
            )
        };
        r == 0
    }

    /// sendmmsg with headers, addresses and control buffers reused across calls.
    pub(super) struct MmsgSender {
        msgvec: Vec<libc::mmsghdr>,
        addrs: Vec<SockAddr>,
        controls: Vec<CmsgBuf>,
    }

    impl MmsgSender {
        pub(super) fn new() -> Self {
            Self {
                msgvec: Vec::new(),
                addrs: Vec::new(),
                controls: Vec::new(),
            }
        }

        pub(super) fn send(&mut self, fd: RawFd, msgs: &[Message<'_>]) -> io::Result<usize> {
            if msgs.is_empty() {
                return Ok(0);
            }

            self.msgvec.clear();
            self.addrs.clear();
            self.controls.clear();
            // Fill the backing arrays first: pointers into them must not move
            self.addrs.extend(msgs.iter().map(|m| SockAddr::from(m.addr)));
            self.controls.resize(msgs.len(), CmsgBuf::zeroed());

            for (i, msg) in msgs.iter().enumerate() {
                // Safety: libc mmsghdr is valid when zeroed
                let mut hdr: libc::mmsghdr = unsafe { mem::zeroed() };
                hdr.msg_hdr.msg_name = self.addrs[i].as_ptr() as *mut libc::c_void;
                hdr.msg_hdr.msg_namelen = self.addrs[i].len() as libc::socklen_t;
                hdr.msg_hdr.msg_iov = msg.bufs.as_ptr() as *mut libc::iovec;
                hdr.msg_hdr.msg_iovlen = msg.bufs.len() as _;
                if msg.options.gso > 0 {
                    unsafe { set_gso_cmsg(&mut hdr.msg_hdr, &mut self.controls[i], msg.options.gso) };
                }
                self.msgvec.push(hdr);
            }

            let r = unsafe { libc::sendmmsg(fd, self.msgvec.as_mut_ptr(), msgs.len() as _, 0) };
            if r < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(r as usize)
            }
        }
    }

    // Safety: MmsgSender owns all its data; the raw pointers only live for one send()
    unsafe impl Send for MmsgSender {}
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::time::Duration;

    fn pair() -> (UdpBatchSocket, UdpSocket, SocketAddr) {
        let sender = UdpBatchSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let addr = receiver.local_addr().unwrap();
        (sender, receiver, addr)
    }

    fn recv_all(receiver: &UdpSocket, expected: usize) -> Vec<Vec<u8>> {
        let mut buf = [0u8; 2048];
        let mut out = Vec::new();
        while out.len() < expected {
            match receiver.recv_from(&mut buf) {
                Ok((len, _)) => out.push(buf[..len].to_vec()),
                Err(_) => break,
            }
        }
        out
    }

    #[test]
    fn test_write_gathered() {
        let (mut sender, receiver, addr) = pair();
        let sent = sender
            .write(&addr, &[IoSlice::new(b"hello "), IoSlice::new(b"world")])
            .unwrap();
        assert_eq!(sent, 11);
        let got = recv_all(&receiver, 1);
        assert_eq!(got, vec![b"hello world".to_vec()]);
    }

    #[test]
    fn test_write_many() {
        let (mut sender, receiver, addr) = pair();
        let packets: Vec<Vec<u8>> = (0..10).map(|i| format!("msg-{}", i).into_bytes()).collect();
        let slices: Vec<[IoSlice<'_>; 1]> = packets.iter().map(|p| [IoSlice::new(p)]).collect();
        let msgs: Vec<Message<'_>> = slices
            .iter()
            .map(|s| Message {
                addr,
                bufs: s,
                options: WriteOptions::default(),
            })
            .collect();

        let sent = sender.write_many(&msgs).unwrap();
        assert_eq!(sent, 10, "Should send all 10 messages");

        let got = recv_all(&receiver, 10);
        assert_eq!(got.len(), 10);
        assert_eq!(got[0], b"msg-0");
    }

    #[test]
    fn test_write_gso() {
        let (mut sender, receiver, addr) = pair();
        if !sender.probe_gso() {
            return;
        }
        let data = [b'A'; 25];
        let sent = sender
            .write_gso(&addr, &[IoSlice::new(&data)], WriteOptions::gso(10))
            .unwrap();
        assert_eq!(sent, 25);

        let got = recv_all(&receiver, 3);
        let lens: Vec<usize> = got.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![10, 10, 5]);
    }

    #[test]
    fn test_write_many_with_gso() {
        let (mut sender, receiver, addr) = pair();
        if !sender.probe_gso() {
            return;
        }
        let big = [b'B'; 40];
        let small = [b'C'; 7];
        let big_slices = [IoSlice::new(&big)];
        let small_slices = [IoSlice::new(&small)];
        let msgs = [
            Message {
                addr,
                bufs: &big_slices,
                options: WriteOptions::gso(20),
            },
            Message {
                addr,
                bufs: &small_slices,
                options: WriteOptions::default(),
            },
        ];
        assert_eq!(sender.write_many(&msgs).unwrap(), 2);
        let got = recv_all(&receiver, 3);
        let mut lens: Vec<usize> = got.iter().map(Vec::len).collect();
        lens.sort_unstable();
        assert_eq!(lens, vec![7, 20, 20]);
    }

    #[test]
    fn test_write_many_empty() {
        let (mut sender, _receiver, _) = pair();
        assert_eq!(sender.write_many(&[]).unwrap(), 0);
    }
}
