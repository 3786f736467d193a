use std::collections::BTreeMap;
use std::io::{self, Result as IoResult};
use std::num::NonZeroUsize;
use std::os::fd::{BorrowedFd, RawFd};
use std::time::{Duration, Instant};

use bit_set::BitSet;
use polling::{Event, Events, Poller};

/// A set of file descriptors for readiness multiplexing with [`select`].
///
/// Negative descriptors are never members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FdSet {
    bits: BitSet,
}

impl FdSet {
    /// Creates an empty set.
    pub fn new() -> FdSet {
        FdSet { bits: BitSet::new() }
    }

    /// Adds `fd`, returning `true` if it was not already present.
    pub fn insert(&mut self, fd: RawFd) -> bool {
        fd >= 0 && self.bits.insert(fd as usize)
    }

    /// Removes `fd`, returning `true` if it was present.
    pub fn remove(&mut self, fd: RawFd) -> bool {
        fd >= 0 && self.bits.remove(fd as usize)
    }

    /// Returns `true` if `fd` is in the set.
    pub fn contains(&self, fd: RawFd) -> bool {
        fd >= 0 && self.bits.contains(fd as usize)
    }

    /// Removes every descriptor.
    pub fn clear(&mut self) {
        self.bits.clear();
    }

    /// Number of descriptors in the set.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Returns `true` if the set holds no descriptor.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// The descriptors in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.bits.iter().map(|fd| fd as RawFd)
    }

    /// The highest descriptor plus one, or zero for an empty set.
    pub fn nfds(&self) -> RawFd {
        self.iter().last().map_or(0, |fd| fd + 1)
    }
}

impl FromIterator<RawFd> for FdSet {
    fn from_iter<I: IntoIterator<Item = RawFd>>(iter: I) -> Self {
        let mut set = FdSet::new();
        set.extend(iter);
        set
    }
}

impl Extend<RawFd> for FdSet {
    fn extend<I: IntoIterator<Item = RawFd>>(&mut self, iter: I) {
        for fd in iter {
            self.insert(fd);
        }
    }
}

/// Returns a new set holding exactly `fds`.
pub fn newfds(fds: &[RawFd]) -> FdSet {
    fds.iter().copied().collect()
}

/// Resets `fdset` so it holds exactly `fds`, re-arming it after [`select`]
/// narrowed it down to the ready descriptors.
pub fn clrfds(fdset: &mut FdSet, fds: &[RawFd]) {
    fdset.clear();
    fdset.extend(fds.iter().copied());
}

/// Deletes the registered descriptors from the poller when dropped.
struct Registration<'a> {
    poller: &'a Poller,
    fds: Vec<RawFd>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        for &fd in &self.fds {
            // The caller keeps every registered descriptor open for the whole call.
            let _ = self.poller.delete(unsafe { BorrowedFd::borrow_raw(fd) });
        }
    }
}

/// Waits until a descriptor of `read` is readable or one of `write` is
/// writable, or until `timeout` elapses (`None` waits forever).
///
/// On return each set holds only its ready descriptors, and the total number
/// of descriptors kept is returned; zero means the wait timed out. Regular
/// files are always ready and make the call return without waiting. Every
/// descriptor in either set must stay open for the duration of the call.
pub fn select(mut read: Option<&mut FdSet>, mut write: Option<&mut FdSet>, timeout: Option<Duration>) -> IoResult<usize> {
    let mut interest: BTreeMap<RawFd, (bool, bool)> = BTreeMap::new();
    for fd in read.as_deref().into_iter().flat_map(FdSet::iter) {
        interest.entry(fd).or_default().0 = true;
    }
    for fd in write.as_deref().into_iter().flat_map(FdSet::iter) {
        interest.entry(fd).or_default().1 = true;
    }

    let poller = Poller::new()?;
    let mut registration = Registration { poller: &poller, fds: Vec::with_capacity(interest.len()) };
    let mut ready: BTreeMap<RawFd, (bool, bool)> = BTreeMap::new();
    for (&fd, &(r, w)) in &interest {
        let key = fd as usize;
        let ev = match (r, w) {
            (true, true) => Event::all(key),
            (true, false) => Event::readable(key),
            _ => Event::writable(key),
        };
        match unsafe { poller.add(fd, ev) } {
            Ok(()) => registration.fds.push(fd),
            // Regular files cannot be polled; they are always ready.
            Err(e) if e.raw_os_error() == Some(libc::EPERM) => {
                log::trace!("Descriptor {fd} is not pollable, reporting it ready");
                ready.insert(fd, (r, w));
            }
            Err(e) => return Err(e),
        }
    }
    let timeout = if ready.is_empty() { timeout } else { Some(Duration::ZERO) };
    log::trace!("Waiting on {} descriptor(s), timeout {timeout:?}", registration.fds.len());

    let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
    let mut events = Events::with_capacity(events_capacity(registration.fds.len()));
    loop {
        let remaining = match (timeout, deadline) {
            (Some(_), Some(d)) => Some(d.saturating_duration_since(Instant::now())),
            _ => None,
        };
        match poller.wait(&mut events, remaining) {
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => events.clear(),
            Err(e) => return Err(e),
        }
    }
    drop(registration);

    for ev in events.iter() {
        let entry = ready.entry(ev.key as RawFd).or_default();
        entry.0 |= ev.readable;
        entry.1 |= ev.writable;
    }

    let mut count = 0;
    if let Some(set) = read.as_deref_mut() {
        let kept: FdSet = set.iter().filter(|fd| ready.get(fd).is_some_and(|r| r.0)).collect();
        count += kept.len();
        *set = kept;
    }
    if let Some(set) = write.as_deref_mut() {
        let kept: FdSet = set.iter().filter(|fd| ready.get(fd).is_some_and(|r| r.1)).collect();
        count += kept.len();
        *set = kept;
    }
    log::trace!("{count} descriptor(s) ready");
    Ok(count)
}

/// Room for one event per registered descriptor, so none is dropped.
fn events_capacity(registered: usize) -> NonZeroUsize {
    NonZeroUsize::new(registered).unwrap_or(NonZeroUsize::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn newfds_sets_given_descriptors() {
        let set = newfds(&[5, 1, 9, 1, -3]);
        assert_eq!(set.len(), 3);
        assert!(set.contains(1) && set.contains(5) && set.contains(9));
        assert!(!set.contains(-3));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 5, 9]);
        assert_eq!(set.nfds(), 10);
        assert_eq!(newfds(&[]).nfds(), 0);
    }

    #[test]
    fn clrfds_resets_to_given_descriptors() {
        let mut set = newfds(&[3, 4]);
        set.remove(3);
        set.insert(8);
        clrfds(&mut set, &[3, 7]);
        assert_eq!(set, newfds(&[7, 3]));
        clrfds(&mut set, &[]);
        assert!(set.is_empty());
    }

    #[test]
    fn select_times_out_when_nothing_is_readable() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut read = newfds(&[a.as_raw_fd()]);
        let start = Instant::now();
        let n = select(Some(&mut read), None, Some(Duration::from_millis(50))).unwrap();
        let waited = start.elapsed();
        assert_eq!(n, 0);
        assert!(read.is_empty());
        assert!(waited >= Duration::from_millis(40), "returned after {waited:?}");
        assert!(waited < Duration::from_secs(5), "returned after {waited:?}");
    }

    #[test]
    fn select_treats_regular_files_as_ready() {
        let file = tempfile::tempfile().unwrap();
        let (a, _b) = UnixStream::pair().unwrap();
        let mut read = newfds(&[file.as_raw_fd(), a.as_raw_fd()]);
        let mut write = newfds(&[file.as_raw_fd()]);
        let start = Instant::now();
        let n = select(Some(&mut read), Some(&mut write), Some(Duration::from_secs(5))).unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(n, 2);
        assert_eq!(read, newfds(&[file.as_raw_fd()]));
        assert_eq!(write, newfds(&[file.as_raw_fd()]));
    }

    #[test]
    fn event_buffer_fits_every_descriptor() {
        assert_eq!(events_capacity(0).get(), 1);
        assert_eq!(events_capacity(1).get(), 1);
        assert_eq!(events_capacity(4096).get(), 4096);
    }

    #[test]
    fn select_reports_many_ready_descriptors() {
        let pairs: Vec<(UnixStream, UnixStream)> = (0..200).map(|_| UnixStream::pair().unwrap()).collect();
        let fds: Vec<RawFd> = pairs.iter().map(|(a, _)| a.as_raw_fd()).collect();
        let mut write = newfds(&fds);
        let n = select(None, Some(&mut write), Some(Duration::from_secs(5))).unwrap();
        assert_eq!(n, fds.len());
        assert_eq!(write, newfds(&fds));
    }

    #[test]
    fn select_reports_ready_descriptors() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let (c, _d) = UnixStream::pair().unwrap();
        b.write_all(b"ping").unwrap();

        let fds = [a.as_raw_fd(), c.as_raw_fd()];
        let mut read = newfds(&fds);
        let mut write = newfds(&[c.as_raw_fd()]);
        let n = select(Some(&mut read), Some(&mut write), Some(Duration::from_secs(5))).unwrap();
        assert_eq!(n, 2);
        assert_eq!(read, newfds(&[a.as_raw_fd()]));
        assert_eq!(write, newfds(&[c.as_raw_fd()]));

        clrfds(&mut read, &fds);
        assert_eq!(read.len(), 2);
    }
}
