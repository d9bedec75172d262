use std::net::UdpSocket;
use std::thread;
use std::time::{Duration, Instant};

use pixelwall_control::tpm2net::{build_data_packet, build_frame_packets};
use pixelwall_control::Tpm2NetServer;
use pixelwall_core::{Dimensions, FrameQueue, Rgb, StreamStatus, Tpm2NetConfig};

fn config() -> Tpm2NetConfig {
    Tpm2NetConfig {
        enabled: true,
        bind: "127.0.0.1:0".parse().unwrap(),
        timeout_ms: 300,
        check_interval_ms: 50,
    }
}

fn start() -> (Tpm2NetServer, FrameQueue, StreamStatus, UdpSocket) {
    let queue = FrameQueue::new();
    let status = StreamStatus::new();
    let server =
        Tpm2NetServer::spawn(&config(), Dimensions::new(2, 2), queue.clone(), status.clone())
            .unwrap();
    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.connect(server.local_addr()).unwrap();
    (server, queue, status, client)
}

fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(10));
    }
}

fn frame_bytes() -> Vec<u8> {
    (1..=12).collect()
}

#[test]
fn test_loopback_frame_reassembly() {
    let (_server, queue, status, client) = start();
    for packet in build_frame_packets(&frame_bytes(), 6, 1) {
        client.send(&packet).unwrap();
    }

    let frame = queue.get_timeout(Duration::from_secs(2)).expect("no frame");
    assert_eq!(frame.as_bytes(), frame_bytes().as_slice());
    assert_eq!(frame.pixel(0, 0), Some(Rgb::new(1, 2, 3)));
    assert!(status.is_receiving());
}

#[test]
fn test_malformed_datagrams_are_dropped() {
    let (server, queue, _status, client) = start();

    let mut bad = build_data_packet(1, 1, &frame_bytes());
    bad[0] = 0x00;
    client.send(&bad).unwrap();
    client.send(&[0x9C, 0xDA, 0x00]).unwrap();
    client.send(&build_data_packet(1, 1, &frame_bytes())).unwrap();

    let frame = queue.get_timeout(Duration::from_secs(2)).expect("no frame");
    assert_eq!(frame.as_bytes(), frame_bytes().as_slice());
    wait_for(|| server.stats().packets_dropped == 2);
    assert_eq!(server.stats().frames_completed, 1);
}

#[test]
fn test_inactivity_timeout_releases_display() {
    let (server, queue, status, client) = start();
    // Sender numbering from 0 marks the session as misbehaving
    for packet in build_frame_packets(&frame_bytes(), 4, 0) {
        client.send(&packet).unwrap();
    }
    let frame = queue.get_timeout(Duration::from_secs(2)).expect("no frame");
    assert_eq!(frame.as_bytes(), frame_bytes().as_slice());
    assert!(status.is_receiving());

    let last_packet = Instant::now();
    wait_for(|| !status.is_receiving());
    assert!(last_packet.elapsed() >= Duration::from_millis(300));
    assert_eq!(server.stats().timeouts, 1);

    // A fresh 1-based sequence starts cleanly on the reset session
    let next: Vec<u8> = (101..=112).collect();
    for packet in build_frame_packets(&next, 4, 1) {
        client.send(&packet).unwrap();
    }
    let frame = queue.get_timeout(Duration::from_secs(2)).expect("no frame");
    assert_eq!(frame.as_bytes(), next.as_slice());
    assert!(status.is_receiving());
    wait_for(|| server.stats().frames_completed == 2);
}

#[test]
fn test_frames_wait_for_producer_to_release_display() {
    let (_server, queue, status, client) = start();
    status.set_display_owned(true);

    client.send(&build_data_packet(1, 1, &frame_bytes())).unwrap();
    wait_for(|| status.is_receiving());
    assert!(queue.get_timeout(Duration::from_millis(200)).is_none());

    status.set_display_owned(false);
    client.send(&build_data_packet(1, 1, &frame_bytes())).unwrap();
    assert!(queue.get_timeout(Duration::from_secs(2)).is_some());
}

#[test]
fn test_shutdown_stops_listener() {
    let (mut server, _queue, status, client) = start();
    client.send(&build_data_packet(1, 1, &frame_bytes())).unwrap();
    wait_for(|| status.is_receiving());

    let started = Instant::now();
    server.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!server.is_running());
    assert!(!status.is_receiving());
}
