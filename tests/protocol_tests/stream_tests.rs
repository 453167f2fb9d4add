//! Stream Tests
//!
//! These tests verify:
//! - Several frames on one stream read back in order
//! - Backup replies stream their body outside the payload cap
//! - Short or refused backups surface as errors

use std::io::Cursor;

use burrowkv::protocol::{
    read_backup_stream, read_command, read_response, write_backup_header, write_command,
    write_response, Command, Response, Status,
};
use burrowkv::BurrowError;

#[test]
fn test_multiple_commands_on_one_stream() {
    let commands = vec![
        Command::Ping,
        Command::Put {
            key: b"k1".to_vec(),
            value: b"v1".to_vec(),
        },
        Command::Get { key: b"k1".to_vec() },
        Command::List { prefix: b"k".to_vec() },
        Command::Delete { key: b"k1".to_vec() },
        Command::Stats,
    ];

    let mut buffer = Vec::new();
    for cmd in &commands {
        write_command(&mut buffer, cmd).unwrap();
    }

    let mut cursor = Cursor::new(buffer);
    for expected in &commands {
        assert_eq!(&read_command(&mut cursor).unwrap(), expected);
    }
    assert!(matches!(read_command(&mut cursor), Err(BurrowError::Io(_))));
}

#[test]
fn test_multiple_responses_on_one_stream() {
    let responses = vec![
        Response::ok(Some(b"data".to_vec())),
        Response::not_found(),
        Response::error("oops"),
        Response::ok(None),
    ];

    let mut buffer = Vec::new();
    for resp in &responses {
        write_response(&mut buffer, resp).unwrap();
    }

    let mut cursor = Cursor::new(buffer);
    for expected in &responses {
        assert_eq!(&read_response(&mut cursor).unwrap(), expected);
    }
}

#[test]
fn test_backup_stream() {
    let body: Vec<u8> = (0..20_000u32).map(|i| (i % 256) as u8).collect();

    let mut wire = Vec::new();
    write_backup_header(&mut wire, body.len() as u64).unwrap();
    wire.extend_from_slice(&body);
    // a following reply must stay unread
    write_response(&mut wire, &Response::ok(None)).unwrap();

    let mut cursor = Cursor::new(wire);
    let mut sink = Vec::new();
    assert_eq!(read_backup_stream(&mut cursor, &mut sink).unwrap(), body.len() as u64);
    assert_eq!(sink, body);
    assert_eq!(read_response(&mut cursor).unwrap().status, Status::Ok);
}

#[test]
fn test_truncated_backup_stream() {
    let mut wire = Vec::new();
    write_backup_header(&mut wire, 1000).unwrap();
    wire.extend_from_slice(&[0u8; 600]);

    let mut sink = Vec::new();
    let err = read_backup_stream(&mut Cursor::new(wire), &mut sink).unwrap_err();
    assert!(err.to_string().contains("600 of 1000"));
}

#[test]
fn test_refused_backup() {
    let mut wire = Vec::new();
    write_response(&mut wire, &Response::error("no space")).unwrap();

    let mut sink = Vec::new();
    let err = read_backup_stream(&mut Cursor::new(wire), &mut sink).unwrap_err();
    assert!(matches!(err, BurrowError::Protocol(ref m) if m.contains("no space")));
    assert!(sink.is_empty());
}

#[test]
fn test_backup_header_rejects_huge_length() {
    let mut wire = Vec::new();
    assert!(write_backup_header(&mut wire, u32::MAX as u64 + 1).is_err());
    assert!(wire.is_empty());
}
