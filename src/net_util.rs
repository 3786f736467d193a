use std::ffi::{CStr, CString};
use std::fmt;
use std::io::{self, Read, Result as IoResult, Write};
use std::mem;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::ptr;

use bitflags::bitflags;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

/// Size of the blocks [`sendfs`] reads from its source before sending them.
pub const SEND_CHUNK_SIZE: usize = 1024;

const HOST_NAME_MAX: usize = 1024;

/// Returns `true` if `ip` is an IPv4 address in dotted-quad notation.
pub fn valid4(ip: &str) -> bool {
    ip.parse::<Ipv4Addr>().is_ok()
}

/// Returns `true` if `ip` is an IPv6 address in presentation format.
pub fn valid6(ip: &str) -> bool {
    ip.parse::<Ipv6Addr>().is_ok()
}

/// Numeric host and port strings of a socket address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddrStr {
    /// The numeric host, e.g. `192.0.2.7` or `2001:db8::1`.
    pub ip: String,
    /// The decimal port.
    pub port: String,
}

impl From<SocketAddr> for AddrStr {
    fn from(addr: SocketAddr) -> Self {
        AddrStr {
            ip: addr.ip().to_string(),
            port: addr.port().to_string(),
        }
    }
}

impl fmt::Display for AddrStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ip.contains(':') {
            write!(f, "[{}]:{}", self.ip, self.port)
        } else {
            write!(f, "{}:{}", self.ip, self.port)
        }
    }
}

/// Converts `addr` into its numeric host and port strings.
///
/// Only IPv4 and IPv6 addresses can be converted; any other family yields an
/// `InvalidInput` error.
pub fn getaddrstr(addr: &SockAddr) -> IoResult<AddrStr> {
    addr.as_socket().map(AddrStr::from).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "address family is neither IPv4 nor IPv6")
    })
}

/// Writes the whole of `buf` to `sock`, retrying short and interrupted writes.
///
/// Returns the number of bytes sent, which is always `buf.len()`. The first
/// failing write aborts the transfer with its error; how much of `buf` made it
/// out before that is unspecified.
pub fn sendall<W: Write + ?Sized>(sock: &mut W, buf: &[u8]) -> IoResult<usize> {
    let mut curr = 0;
    while curr < buf.len() {
        match sock.write(&buf[curr..]) {
            Ok(0) => {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "failed to send the whole buffer"));
            }
            Ok(n) => curr += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    log::trace!("Sent {curr} bytes");
    Ok(curr)
}

/// Streams everything readable from `file` to `sock` in blocks of
/// [`SEND_CHUNK_SIZE`] bytes. Returns the total number of bytes sent.
pub fn sendfs<W, R>(sock: &mut W, file: &mut R) -> IoResult<u64>
where
    W: Write + ?Sized,
    R: Read + ?Sized,
{
    let mut block = [0u8; SEND_CHUNK_SIZE];
    let mut sent = 0u64;
    loop {
        let n = match file.read(&mut block) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        sent += sendall(sock, &block[..n])? as u64;
    }
    log::debug!("Streamed {sent} bytes");
    Ok(sent)
}

/// Sends `n` as NUL-terminated decimal text. Returns the number of bytes sent,
/// terminator included.
pub fn sendlong<W: Write + ?Sized>(sock: &mut W, n: i64) -> IoResult<usize> {
    send_cstr(sock, n.to_string())
}

/// Sends `n` as NUL-terminated decimal text with six fractional digits.
/// Returns the number of bytes sent, terminator included.
pub fn senddouble<W: Write + ?Sized>(sock: &mut W, n: f64) -> IoResult<usize> {
    send_cstr(sock, format_double(n))
}

fn send_cstr<W: Write + ?Sized>(sock: &mut W, text: String) -> IoResult<usize> {
    let mut bytes = text.into_bytes();
    bytes.push(0);
    sendall(sock, &bytes)
}

/// `%lf` rendering: six decimals, lowercase names for the non-finite values.
fn format_double(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else {
        format!("{n:.6}")
    }
}

bitflags! {
    /// Flags steering [`getaddrinfo`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AddrFlags: i32 {
        /// Without a node, resolve to the wildcard address for binding.
        const PASSIVE = libc::AI_PASSIVE;
        /// Request the canonical name of the host.
        const CANONNAME = libc::AI_CANONNAME;
        /// The node must be a numeric address; no name lookup is done.
        const NUMERICHOST = libc::AI_NUMERICHOST;
        /// The service must be a numeric port.
        const NUMERICSERV = libc::AI_NUMERICSERV;
        /// Only return families configured on the local system.
        const ADDRCONFIG = libc::AI_ADDRCONFIG;
    }
}

/// Criteria for selecting the candidates returned by [`getaddrinfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrHints {
    /// Address family, `None` for both IPv4 and IPv6.
    pub family: Option<Domain>,
    /// Socket type of the candidates.
    pub socktype: Type,
    /// Protocol, `None` to let the resolver pick the one for `socktype`.
    pub protocol: Option<Protocol>,
    /// Extra flags.
    pub flags: AddrFlags,
}

/// Builds hints for the given family, socket type and flags.
pub fn gethints(family: Option<Domain>, socktype: Type, flags: AddrFlags) -> AddrHints {
    AddrHints {
        family,
        socktype,
        protocol: None,
        flags,
    }
}

/// Hints for stream sockets; equivalent to `gethints(family, Type::STREAM, flags)`.
pub fn tcphints(family: Option<Domain>, flags: AddrFlags) -> AddrHints {
    gethints(family, Type::STREAM, flags)
}

/// Hints for datagram sockets; equivalent to `gethints(family, Type::DGRAM, flags)`.
pub fn udphints(family: Option<Domain>, flags: AddrFlags) -> AddrHints {
    gethints(family, Type::DGRAM, flags)
}

/// One resolved candidate address, with everything needed to open a socket
/// for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrInfo {
    /// Address family of `addr`.
    pub family: Domain,
    /// Socket type.
    pub socktype: Type,
    /// Protocol, `None` when the resolver left it unspecified.
    pub protocol: Option<Protocol>,
    /// The address itself.
    pub addr: SocketAddr,
    /// Canonical name of the node. Only set on the first candidate, and only
    /// when [`AddrFlags::CANONNAME`] was requested.
    pub canonname: Option<String>,
}

impl AddrInfo {
    /// The candidate address as a [`SockAddr`].
    pub fn sockaddr(&self) -> SockAddr {
        SockAddr::from(self.addr)
    }
}

/// Owns a list returned by `libc::getaddrinfo` and frees it on drop.
struct AddrInfoList(*mut libc::addrinfo);

impl Drop for AddrInfoList {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { libc::freeaddrinfo(self.0) };
        }
    }
}

fn to_cstring(what: &str, s: Option<&str>) -> IoResult<Option<CString>> {
    s.map(CString::new)
        .transpose()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("{what} contains a NUL byte")))
}

/// Maps an `EAI_*` code to an [`io::Error`].
fn gai_error(code: libc::c_int) -> io::Error {
    if code == libc::EAI_SYSTEM {
        return io::Error::last_os_error();
    }
    let msg = unsafe { CStr::from_ptr(libc::gai_strerror(code)) }.to_string_lossy().into_owned();
    let kind = match code {
        libc::EAI_NONAME | libc::EAI_SERVICE => io::ErrorKind::NotFound,
        libc::EAI_BADFLAGS | libc::EAI_FAMILY | libc::EAI_SOCKTYPE => io::ErrorKind::InvalidInput,
        libc::EAI_MEMORY => io::ErrorKind::OutOfMemory,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, format!("getaddrinfo: {msg}"))
}

/// Resolves `node` and `service` into the candidate addresses matching
/// `hints`, using the platform resolver.
///
/// `service` may be a port number or a service name. Without a `node` the
/// candidates are the wildcard addresses when [`AddrFlags::PASSIVE`] is set and
/// the loopback addresses otherwise. At least one of `node` and `service` must
/// be given. Candidates of families other than IPv4 and IPv6 are skipped.
pub fn getaddrinfo(node: Option<&str>, service: Option<&str>, hints: &AddrHints) -> IoResult<Vec<AddrInfo>> {
    let node_c = to_cstring("node", node)?;
    let service_c = to_cstring("service", service)?;

    let mut raw_hints: libc::addrinfo = unsafe { mem::zeroed() };
    raw_hints.ai_family = hints.family.map_or(libc::AF_UNSPEC, libc::c_int::from);
    raw_hints.ai_socktype = hints.socktype.into();
    raw_hints.ai_protocol = hints.protocol.map_or(0, libc::c_int::from);
    raw_hints.ai_flags = hints.flags.bits();

    let mut res: *mut libc::addrinfo = ptr::null_mut();
    let err = unsafe {
        libc::getaddrinfo(
            node_c.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            service_c.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            &raw_hints,
            &mut res,
        )
    };
    let list = AddrInfoList(res);
    if err != 0 {
        log::debug!("Resolving {node:?}:{service:?} failed with code {err}");
        return Err(gai_error(err));
    }

    let mut infos = Vec::new();
    let mut cur = list.0;
    while !cur.is_null() {
        let ai = unsafe { &*cur };
        cur = ai.ai_next;
        if ai.ai_addr.is_null() || ai.ai_addrlen as usize > mem::size_of::<libc::sockaddr_storage>() {
            continue;
        }
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let sockaddr = unsafe {
            ptr::copy_nonoverlapping(
                ai.ai_addr as *const u8,
                &mut storage as *mut libc::sockaddr_storage as *mut u8,
                ai.ai_addrlen as usize,
            );
            SockAddr::new(storage, ai.ai_addrlen)
        };
        let Some(addr) = sockaddr.as_socket() else {
            continue;
        };
        let canonname = if ai.ai_canonname.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(ai.ai_canonname) }.to_string_lossy().into_owned())
        };
        infos.push(AddrInfo {
            family: Domain::from(ai.ai_family),
            socktype: Type::from(ai.ai_socktype),
            protocol: (ai.ai_protocol != 0).then(|| Protocol::from(ai.ai_protocol)),
            addr,
            canonname,
        });
    }
    log::debug!("Resolved {node:?}:{service:?} to {} candidate(s)", infos.len());

    if infos.is_empty() {
        Err(io::Error::new(io::ErrorKind::NotFound, "no address matches the given hints"))
    } else {
        Ok(infos)
    }
}

/// Creates a socket matching the family, type and protocol of `ai`.
pub fn addrsock(ai: &AddrInfo) -> IoResult<Socket> {
    Socket::new(ai.family, ai.socktype, ai.protocol)
}

/// Binds `sock` to the address of `ai`.
pub fn addrbind(sock: &Socket, ai: &AddrInfo) -> IoResult<()> {
    sock.bind(&ai.sockaddr())
}

/// Connects `sock` to the address of `ai`.
pub fn addrconn(sock: &Socket, ai: &AddrInfo) -> IoResult<()> {
    sock.connect(&ai.sockaddr())
}

/// Allows `sock` to reuse local addresses (`SO_REUSEADDR`).
pub fn addrreuse(sock: &Socket) -> IoResult<()> {
    sock.set_reuse_address(true)
}

/// Resolves `node`/`service` and binds a new socket to the first candidate
/// that accepts it, enabling address reuse first when `reuse` is set.
///
/// When every candidate fails the error of the last attempt is returned.
pub fn bind_first(node: Option<&str>, service: Option<&str>, hints: &AddrHints, reuse: bool) -> IoResult<(Socket, AddrInfo)> {
    first_candidate(node, service, hints, |ai| {
        let sock = addrsock(ai)?;
        if reuse {
            addrreuse(&sock)?;
        }
        addrbind(&sock, ai)?;
        Ok(sock)
    })
}

/// Resolves `node`/`service` and connects a new socket to the first candidate
/// that answers. When every candidate fails the error of the last attempt is
/// returned.
pub fn connect_first(node: Option<&str>, service: Option<&str>, hints: &AddrHints) -> IoResult<(Socket, AddrInfo)> {
    first_candidate(node, service, hints, |ai| {
        let sock = addrsock(ai)?;
        addrconn(&sock, ai)?;
        Ok(sock)
    })
}

fn first_candidate<F>(node: Option<&str>, service: Option<&str>, hints: &AddrHints, mut open: F) -> IoResult<(Socket, AddrInfo)>
where
    F: FnMut(&AddrInfo) -> IoResult<Socket>,
{
    let mut last_err = None;
    for ai in getaddrinfo(node, service, hints)? {
        match open(&ai) {
            Ok(sock) => {
                log::debug!("Opened socket for {}", ai.addr);
                return Ok((sock, ai));
            }
            Err(e) => {
                log::debug!("Candidate {} failed: {e}", ai.addr);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no candidate address")))
}

/// Name and addresses of a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    /// The canonical name of the host, or the name reported by the system when
    /// the resolver knows no canonical one.
    pub name: String,
    /// The addresses the name resolves to, without duplicates.
    pub addrs: Vec<IpAddr>,
}

/// Returns the name of the local host.
pub fn gethostname() -> IoResult<String> {
    let mut buf = vec![0u8; HOST_NAME_MAX];
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    if let Some(pos) = buf.iter().position(|b| *b == 0) {
        buf.truncate(pos);
    }
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Resolves the local host name into a [`HostEntry`].
pub fn gethostentry() -> IoResult<HostEntry> {
    let hostname = gethostname()?;
    let hints = tcphints(None, AddrFlags::CANONNAME);
    let infos = getaddrinfo(Some(hostname.as_str()), None, &hints)?;
    let name = infos
        .iter()
        .find_map(|ai| ai.canonname.clone())
        .unwrap_or(hostname);
    let mut addrs: Vec<IpAddr> = Vec::new();
    for ai in &infos {
        if !addrs.contains(&ai.addr.ip()) {
            addrs.push(ai.addr.ip());
        }
    }
    log::debug!("Host {name} has {} address(es)", addrs.len());
    Ok(HostEntry { name, addrs })
}
