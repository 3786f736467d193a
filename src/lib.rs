//! # netutil - Small Helpers for Files, Prompts and Sockets
//!
//! netutil collects the handful of helpers that come up again and again when
//! writing small network programs: checking and wiping files, asking the user
//! for a number in a range, pushing a whole buffer (or a whole file) through a
//! socket, resolving and binding addresses, and waiting on several descriptors
//! at once.
//!
//! ## Key Features
//!
//! - **File helpers**: [`file_exist`], [`file_size`] and [`file_wipe`]
//! - **Bounded prompts**: [`prompt_int`] and [`prompt_double`] keep asking
//!   until the answer is in range, [`clear_stdin`] drops a malformed line
//! - **Reliable sends**: [`sendall`] retries short writes, [`sendfs`] streams a
//!   reader in 1 KiB blocks, [`sendlong`]/[`senddouble`] send numbers as
//!   NUL-terminated text
//! - **Address plumbing**: [`tcphints`]/[`udphints`], [`getaddrinfo`],
//!   [`addrsock`], [`addrbind`], [`addrconn`], [`addrreuse`] and the
//!   [`bind_first`]/[`connect_first`] scan loops
//! - **Multiplexing**: [`FdSet`], [`newfds`], [`clrfds`] and [`select`]
//!
//! ## Basic Usage
//!
//! ### Server Side
//!
//! ```rust,no_run
//! use netutil::{bind_first, getaddrstr, sendlong, tcphints, AddrFlags};
//!
//! let hints = tcphints(None, AddrFlags::PASSIVE);
//! let (listener, _) = bind_first(None, Some("8080"), &hints, true)?;
//! listener.listen(16)?;
//!
//! loop {
//!     let (mut peer, addr) = listener.accept()?;
//!     println!("Accepted connection from {}", getaddrstr(&addr)?);
//!     sendlong(&mut peer, 42)?;
//! }
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! ### Client Side
//!
//! ```rust,no_run
//! use netutil::{connect_first, sendfs, tcphints, AddrFlags};
//! use std::fs::File;
//!
//! let hints = tcphints(None, AddrFlags::empty());
//! let (mut sock, _) = connect_first(Some("127.0.0.1"), Some("8080"), &hints)?;
//! let sent = sendfs(&mut sock, &mut File::open("payload.bin")?)?;
//! println!("Sent {sent} bytes");
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! ## Errors
//!
//! Every fallible helper returns [`std::io::Result`]. Failures the platform
//! reports come back as the OS error, and resolver failures map onto the closest
//! [`std::io::ErrorKind`] (an unknown host or service is `NotFound`). Failures
//! detected here (an address family that has no numeric form, a prompt whose
//! input ran out) do the same.
//!
//! ## Logging
//!
//! The library logs through the `log` facade at `debug` and `trace` level and
//! never prints on its own, apart from the prompts.

#![warn(missing_docs)]

mod fd_set;
mod io_util;
mod net_util;

pub use fd_set::*;
pub use io_util::*;
pub use net_util::*;

pub use socket2::{Domain, Protocol, SockAddr, Socket, Type};
