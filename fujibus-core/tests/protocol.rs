//! End-to-end integration tests driving whole subdevice orchestration
//! functions through an [`InMemoryPipe`], playing the device side of the
//! conversation on a background thread. These exercise the seed
//! scenarios named in spec.md §8 rather than any single module's unit
//! tests.

use std::io::Cursor;
use std::thread;
use std::time::Duration;

use fujibus_core::device_id;
use fujibus_core::devices::{clock, dfs, disk, file, net};
use fujibus_core::transport::test_util::{DeviceSide, InMemoryPipe};
use fujibus_core::{packet, slip, BusSession};

fn ok_response(device: u8, command: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0u8];
    body.extend_from_slice(payload);
    packet::build(device, command, &body)
}

/// Waits for one request addressed to `(device, command)` and hands its
/// raw payload (request bytes minus the 6-byte header and descriptor
/// byte) to `respond`, which builds the full response frame.
fn respond_once(dev: &DeviceSide, device: u8, command: u8, respond: impl FnOnce(&[u8]) -> Vec<u8>) {
    loop {
        let raw = dev.read_request();
        if raw.is_empty() {
            thread::sleep(Duration::from_millis(1));
            continue;
        }
        let frame = slip::decode(&raw);
        let pkt = packet::parse(&frame).expect("well-formed request frame");
        assert_eq!(pkt.device, device);
        assert_eq!(pkt.command, command);
        dev.send_response(&respond(&pkt.payload));
        return;
    }
}

fn file_payload_after_common_prefix(payload: &[u8]) -> (String, String, &[u8]) {
    use fujibus_core::bytes::Reader;
    let mut r = Reader::new(payload);
    let _ver = r.u8().unwrap();
    let fs = r.lp_u8_str().unwrap();
    let path = r.lp_u16_str().unwrap();
    (fs, path, &payload[r.offset()..])
}

#[test]
fn http_get_streams_body_and_reports_status() {
    let pipe = InMemoryPipe::new();
    let dev = pipe.device_side();
    let mut session = BusSession::new(pipe);

    let responder = thread::spawn(move || {
        respond_once(&dev, device_id::NETWORK, net::CMD_OPEN, |_payload| {
            // accepted, no body write needed, handle=1
            let mut resp = Vec::new();
            resp.push(1); // version
            resp.push(0x01); // accepted
            resp.extend_from_slice(&0u16.to_le_bytes()); // reserved
            resp.extend_from_slice(&1u16.to_le_bytes()); // handle
            ok_response(device_id::NETWORK, net::CMD_OPEN, &resp)
        });

        respond_once(&dev, device_id::NETWORK, net::CMD_INFO, |_payload| {
            let mut resp = vec![1u8];
            resp.push(0x06); // has_content_length | has_http_status
            resp.extend_from_slice(&0u16.to_le_bytes());
            resp.extend_from_slice(&1u16.to_le_bytes()); // handle
            resp.extend_from_slice(&200u16.to_le_bytes()); // http_status
            resp.extend_from_slice(&11u64.to_le_bytes()); // content_length
            let headers = b"Content-Type: text/plain\r\n";
            resp.extend_from_slice(&(headers.len() as u16).to_le_bytes());
            resp.extend_from_slice(headers);
            ok_response(device_id::NETWORK, net::CMD_INFO, &resp)
        });

        respond_once(&dev, device_id::NETWORK, net::CMD_READ, |_payload| {
            let mut resp = vec![1u8];
            resp.push(0x01); // eof
            resp.extend_from_slice(&0u16.to_le_bytes());
            resp.extend_from_slice(&1u16.to_le_bytes()); // handle
            resp.extend_from_slice(&0u32.to_le_bytes()); // offset
            let body = b"hello world";
            resp.extend_from_slice(&(body.len() as u16).to_le_bytes());
            resp.extend_from_slice(body);
            ok_response(device_id::NETWORK, net::CMD_READ, &resp)
        });

        respond_once(&dev, device_id::NETWORK, net::CMD_CLOSE, |_payload| {
            let mut resp = vec![1u8];
            resp.extend_from_slice(&0u8.to_le_bytes());
            resp.extend_from_slice(&0u16.to_le_bytes());
            resp.extend_from_slice(&1u16.to_le_bytes());
            ok_response(device_id::NETWORK, net::CMD_CLOSE, &resp)
        });
    });

    let mut sink = Vec::new();
    let (opened, info, total) = net::get(
        &mut session,
        "http://example.com/",
        &[],
        &[],
        256,
        Duration::from_secs(2),
        &mut sink,
    )
    .unwrap();

    assert!(opened.accepted);
    assert_eq!(info.unwrap().http_status, Some(200));
    assert_eq!(total, 11);
    assert_eq!(sink, b"hello world");
    responder.join().unwrap();
}

#[test]
fn http_head_returns_no_body() {
    let pipe = InMemoryPipe::new();
    let dev = pipe.device_side();
    let mut session = BusSession::new(pipe);

    let responder = thread::spawn(move || {
        respond_once(&dev, device_id::NETWORK, net::CMD_OPEN, |_| {
            let mut resp = vec![1u8, 0x01];
            resp.extend_from_slice(&0u16.to_le_bytes());
            resp.extend_from_slice(&9u16.to_le_bytes());
            ok_response(device_id::NETWORK, net::CMD_OPEN, &resp)
        });
        respond_once(&dev, device_id::NETWORK, net::CMD_INFO, |_| {
            let mut resp = vec![1u8, 0x04]; // has_http_status
            resp.extend_from_slice(&0u16.to_le_bytes());
            resp.extend_from_slice(&9u16.to_le_bytes());
            resp.extend_from_slice(&404u16.to_le_bytes());
            resp.extend_from_slice(&0u64.to_le_bytes());
            resp.extend_from_slice(&0u16.to_le_bytes());
            ok_response(device_id::NETWORK, net::CMD_INFO, &resp)
        });
        respond_once(&dev, device_id::NETWORK, net::CMD_CLOSE, |_| {
            let mut resp = vec![1u8, 0];
            resp.extend_from_slice(&0u16.to_le_bytes());
            resp.extend_from_slice(&9u16.to_le_bytes());
            ok_response(device_id::NETWORK, net::CMD_CLOSE, &resp)
        });
    });

    let (opened, info) = net::head(&mut session, "http://example.com/missing", &[], &[], Duration::from_secs(2)).unwrap();
    assert!(opened.accepted);
    assert_eq!(info.http_status, Some(404));
    responder.join().unwrap();
}

#[test]
fn file_write_all_resends_unwritten_tail_on_partial_write() {
    let pipe = InMemoryPipe::new();
    let dev = pipe.device_side();
    let mut session = BusSession::new(pipe);

    let responder = thread::spawn(move || {
        // First write: device only accepts half of what's sent.
        respond_once(&dev, device_id::FILE, file::CMD_WRITE, |payload| {
            let (_fs, _path, rest) = file_payload_after_common_prefix(payload);
            let offset = u32::from_le_bytes(rest[0..4].try_into().unwrap());
            let mut resp = vec![1u8, 0];
            resp.extend_from_slice(&0u16.to_le_bytes());
            resp.extend_from_slice(&offset.to_le_bytes());
            resp.extend_from_slice(&2u16.to_le_bytes()); // only 2 bytes written
            ok_response(device_id::FILE, file::CMD_WRITE, &resp)
        });
        // Second write: the unwritten tail, device accepts fully.
        respond_once(&dev, device_id::FILE, file::CMD_WRITE, |payload| {
            let (_fs, _path, rest) = file_payload_after_common_prefix(payload);
            let offset = u32::from_le_bytes(rest[0..4].try_into().unwrap());
            let data_len = u16::from_le_bytes(rest[4..6].try_into().unwrap());
            let mut resp = vec![1u8, 0];
            resp.extend_from_slice(&0u16.to_le_bytes());
            resp.extend_from_slice(&offset.to_le_bytes());
            resp.extend_from_slice(&data_len.to_le_bytes());
            ok_response(device_id::FILE, file::CMD_WRITE, &resp)
        });
    });

    let mut source = Cursor::new(b"abcd".to_vec());
    let total = file::write_all(&mut session, "sd", "/out.bin", 4, Duration::from_secs(2), &mut source).unwrap();

    assert_eq!(total, 4);
    responder.join().unwrap();
}

#[test]
fn clock_get_returns_unix_seconds() {
    let pipe = InMemoryPipe::new();
    let dev = pipe.device_side();
    let mut session = BusSession::new(pipe);

    let responder = thread::spawn(move || {
        respond_once(&dev, device_id::CLOCK, clock::CMD_GET, |_| {
            let mut resp = vec![1u8, 0];
            resp.extend_from_slice(&0u16.to_le_bytes());
            resp.extend_from_slice(&1_700_000_000u64.to_le_bytes());
            ok_response(device_id::CLOCK, clock::CMD_GET, &resp)
        });
    });

    let t = clock::get(&mut session, Duration::from_secs(1)).unwrap();
    assert_eq!(t, 1_700_000_000);
    assert_eq!(clock::fmt_utc(t), "2023-11-14 22:13:20 UTC");
    responder.join().unwrap();
}

#[test]
fn disk_mount_then_dfs_catalogue_round_trip() {
    let pipe = InMemoryPipe::new();
    let dev = pipe.device_side();
    let mut session = BusSession::new(pipe);

    // Build a one-file $.HELLO catalogue identical to dfs::tests'
    // sample, but constructed locally to keep this test self-contained.
    let mut sector0 = [0u8; dfs::SECTOR_SIZE];
    let mut sector1 = [0u8; dfs::SECTOR_SIZE];
    sector0[0..8].copy_from_slice(b"MYDISC  ");
    sector1[5] = 8;
    sector0[8..15].copy_from_slice(b"HELLO  ");
    sector0[15] = b'$';
    sector1[8] = 0x67;
    sector1[9] = 0x34;
    sector1[14] = 0b0000_0000;
    sector1[15] = 0x01;

    let sectors = [sector0, sector1];

    let responder = thread::spawn(move || {
        respond_once(&dev, device_id::DISK, disk::CMD_MOUNT, |_| {
            let mut resp = vec![1u8, 0x01]; // mounted
            resp.extend_from_slice(&0u16.to_le_bytes());
            resp.push(1); // slot
            resp.push(disk::ImageType::Ssd.as_u8());
            resp.extend_from_slice(&256u16.to_le_bytes());
            resp.extend_from_slice(&800u32.to_le_bytes());
            ok_response(device_id::DISK, disk::CMD_MOUNT, &resp)
        });

        for lba in 0..2u32 {
            let sectors = sectors;
            respond_once(&dev, device_id::DISK, disk::CMD_READ_SECTOR, move |_| {
                let mut resp = vec![1u8, 0];
                resp.extend_from_slice(&0u16.to_le_bytes());
                resp.push(1); // slot
                resp.extend_from_slice(&lba.to_le_bytes());
                resp.extend_from_slice(&(dfs::SECTOR_SIZE as u16).to_le_bytes());
                resp.extend_from_slice(&sectors[lba as usize]);
                ok_response(device_id::DISK, disk::CMD_READ_SECTOR, &resp)
            });
        }
    });

    let mount = disk::mount(
        &mut session,
        1,
        "sd",
        "/disks/mydisc.ssd",
        true,
        disk::ImageType::Ssd,
        256,
        Duration::from_secs(2),
    )
    .unwrap();
    assert!(mount.mounted);

    let s0 = disk::read_sector(&mut session, 1, 0, 256, Duration::from_secs(2)).unwrap();
    let s1 = disk::read_sector(&mut session, 1, 1, 256, Duration::from_secs(2)).unwrap();

    let (descriptor, entries) = dfs::parse_catalogue(&s0.data, &s1.data).unwrap();
    assert_eq!(descriptor.file_count, 1);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].full_name(), "$.HELLO");

    responder.join().unwrap();
}
