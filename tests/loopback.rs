use std::io::Read;
use std::os::fd::AsRawFd;
use std::thread;
use std::time::Duration;

use netutil::{AddrFlags, Domain, Socket};

fn tcp_listener() -> (Socket, String) {
    let hints = netutil::tcphints(Some(Domain::IPV4), AddrFlags::PASSIVE | AddrFlags::NUMERICHOST);
    let (listener, _) = netutil::bind_first(Some("127.0.0.1"), Some("0"), &hints, true).unwrap();
    listener.listen(4).unwrap();
    let port = netutil::getaddrstr(&listener.local_addr().unwrap()).unwrap().port;
    (listener, port)
}

#[test]
fn file_and_numbers_cross_a_tcp_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("payload.bin");
    let payload: Vec<u8> = (0..5000u32).map(|i| (i * 7 % 256) as u8).collect();
    std::fs::write(&path, &payload).unwrap();
    assert_eq!(netutil::file_size(&path).unwrap(), 5000);

    let (listener, port) = tcp_listener();
    let client = thread::spawn(move || {
        let hints = netutil::tcphints(None, AddrFlags::empty());
        let (mut sock, ai) = netutil::connect_first(Some("127.0.0.1"), Some(port.as_str()), &hints).unwrap();
        assert_eq!(ai.family, Domain::IPV4);
        let mut file = std::fs::File::open(&path).unwrap();
        let sent = netutil::sendfs(&mut sock, &mut file).unwrap();
        let sent_long = netutil::sendlong(&mut sock, 1234567).unwrap();
        let sent_double = netutil::senddouble(&mut sock, -2.5).unwrap();
        (sent, sent_long, sent_double)
    });

    let (mut peer, addr) = listener.accept().unwrap();
    assert_eq!(netutil::getaddrstr(&addr).unwrap().ip, "127.0.0.1");
    let mut received = Vec::new();
    peer.read_to_end(&mut received).unwrap();

    let (sent, sent_long, sent_double) = client.join().unwrap();
    assert_eq!(sent, 5000);
    assert_eq!(sent_long, 8);
    assert_eq!(sent_double, 10);
    assert_eq!(&received[..5000], &payload[..]);
    assert_eq!(&received[5000..], b"1234567\0-2.500000\0");
}

#[test]
fn select_sees_pending_connection_and_data() {
    let (listener, port) = tcp_listener();
    let lfd = listener.as_raw_fd();

    let mut ready = netutil::newfds(&[lfd]);
    assert_eq!(netutil::select(Some(&mut ready), None, Some(Duration::from_millis(10))).unwrap(), 0);

    let hints = netutil::tcphints(Some(Domain::IPV4), AddrFlags::empty());
    let (mut client, _) = netutil::connect_first(None, Some(port.as_str()), &hints).unwrap();

    netutil::clrfds(&mut ready, &[lfd]);
    assert_eq!(netutil::select(Some(&mut ready), None, Some(Duration::from_secs(5))).unwrap(), 1);
    assert!(ready.contains(lfd));

    let (mut peer, _) = listener.accept().unwrap();
    netutil::sendall(&mut client, b"hi").unwrap();

    let mut ready = netutil::newfds(&[peer.as_raw_fd()]);
    assert_eq!(netutil::select(Some(&mut ready), None, Some(Duration::from_secs(5))).unwrap(), 1);
    let mut buf = [0u8; 2];
    peer.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"hi");
}

#[test]
fn datagram_round_trip() {
    let hints = netutil::udphints(Some(Domain::IPV4), AddrFlags::NUMERICHOST);
    let (server, _) = netutil::bind_first(Some("127.0.0.1"), Some("0"), &hints, false).unwrap();
    let port = netutil::getaddrstr(&server.local_addr().unwrap()).unwrap().port;

    let ai = netutil::getaddrinfo(Some("127.0.0.1"), Some(port.as_str()), &hints).unwrap().remove(0);
    let mut client = netutil::addrsock(&ai).unwrap();
    netutil::addrconn(&client, &ai).unwrap();
    assert_eq!(netutil::sendall(&mut client, b"datagram").unwrap(), 8);

    let mut buf = [0u8; 64];
    let n = (&server).read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"datagram");
}

#[test]
fn connect_first_reports_refusal() {
    let (listener, port) = tcp_listener();
    drop(listener);
    let hints = netutil::tcphints(Some(Domain::IPV4), AddrFlags::empty());
    assert!(netutil::connect_first(Some("127.0.0.1"), Some(port.as_str()), &hints).is_err());
}
