use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::tempdir;
use usmbd_protocol::notify::{
    FILE_ACTION_ADDED, FILE_ACTION_MODIFIED, FILE_ACTION_REMOVED, NotifyRequest, NotifyResponse,
    filter,
};
use usmbd_protocol::EventType;

use super::{
    CodepageEncoder, FilenameEncoder, NotifySubsystem, action_for_mask, completion_filter_to_mask,
};
use crate::link::testing::{decode_sent, scripted_link};

fn utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

#[test]
fn name_changes_select_exactly_the_rename_family_of_events() {
    let mask = completion_filter_to_mask(filter::FILE_NOTIFY_CHANGE_FILE_NAME);
    let expected = libc::IN_MASK_ADD
        | libc::IN_ONLYDIR
        | libc::IN_CREATE
        | libc::IN_DELETE
        | libc::IN_MOVED_FROM
        | libc::IN_MOVED_TO;
    assert_eq!(mask, expected);

    // DIR_NAME selects the same events as FILE_NAME.
    assert_eq!(
        completion_filter_to_mask(filter::FILE_NOTIFY_CHANGE_DIR_NAME),
        expected
    );
}

#[test]
fn attribute_changes_also_watch_moves_and_modifications() {
    let mask = completion_filter_to_mask(filter::FILE_NOTIFY_CHANGE_ATTRIBUTES);
    assert_eq!(
        mask,
        libc::IN_MASK_ADD
            | libc::IN_ONLYDIR
            | libc::IN_ATTRIB
            | libc::IN_MOVED_TO
            | libc::IN_MOVED_FROM
            | libc::IN_MODIFY
    );
}

#[test]
fn timestamp_ea_and_security_changes_collapse_to_attrib() {
    for bit in [
        filter::FILE_NOTIFY_CHANGE_LAST_WRITE,
        filter::FILE_NOTIFY_CHANGE_LAST_ACCESS,
        filter::FILE_NOTIFY_CHANGE_EA,
        filter::FILE_NOTIFY_CHANGE_SECURITY,
    ] {
        assert_eq!(
            completion_filter_to_mask(bit),
            libc::IN_MASK_ADD | libc::IN_ONLYDIR | libc::IN_ATTRIB,
            "filter bit {bit:#x}"
        );
    }
}

#[test]
fn unrequested_filter_bits_add_no_events() {
    assert_eq!(
        completion_filter_to_mask(0),
        libc::IN_MASK_ADD | libc::IN_ONLYDIR
    );
}

#[test]
fn moves_are_reported_as_remove_add_pairs() {
    assert_eq!(action_for_mask(libc::IN_CREATE), FILE_ACTION_ADDED);
    assert_eq!(action_for_mask(libc::IN_DELETE), FILE_ACTION_REMOVED);
    assert_eq!(action_for_mask(libc::IN_MOVED_FROM), FILE_ACTION_REMOVED);
    assert_eq!(action_for_mask(libc::IN_MOVED_TO), FILE_ACTION_ADDED);
    assert_eq!(action_for_mask(libc::IN_ATTRIB), FILE_ACTION_MODIFIED);
    assert_eq!(action_for_mask(libc::IN_MODIFY), FILE_ACTION_MODIFIED);
}

#[test]
fn stock_encoder_produces_utf16le() {
    let encoder = CodepageEncoder;
    let encoded = encoder
        .encode_utf16le(b"a.txt", "utf8")
        .expect("encoding succeeds");
    assert_eq!(encoded, utf16le("a.txt"));
    assert_eq!(encoded.len(), 10);
}

#[test]
fn unknown_codepage_labels_fall_back_to_utf8() {
    let encoder = CodepageEncoder;
    let encoded = encoder
        .encode_utf16le("ü.dat".as_bytes(), "no-such-codepage")
        .expect("encoding succeeds");
    assert_eq!(encoded, utf16le("ü.dat"));
}

#[test]
fn a_created_file_is_delivered_once_and_tears_the_subscription_down() {
    let dir = tempdir().expect("tempdir");
    let (link, sent) = scripted_link(&[]);
    let subsystem = NotifySubsystem::new();
    let encoder: Arc<dyn FilenameEncoder> = CodepageEncoder::shared();

    let request = NotifyRequest {
        completion_filter: filter::FILE_NOTIFY_CHANGE_FILE_NAME,
        dir_path: dir.path().as_os_str().as_encoded_bytes().to_vec(),
    };
    subsystem
        .handle_request(&link, &encoder, 0x3, "utf8", &request.encode())
        .expect("request succeeds");
    assert_eq!(subsystem.subscriber_count(), 1);
    assert!(subsystem.reader_alive());

    std::fs::File::create(dir.path().join("a.txt")).expect("create file");

    let deadline = Instant::now() + Duration::from_secs(10);
    let frame = loop {
        if let Some(frame) = sent.lock().expect("sent frames").first().cloned() {
            break frame;
        }
        assert!(Instant::now() < deadline, "no notification within deadline");
        std::thread::sleep(Duration::from_millis(20));
    };

    let (header, payload) = decode_sent(&frame);
    assert_eq!(header.event, EventType::InotifyResponse);
    assert_eq!(header.server_handle, 0x3);
    assert_eq!(header.buflen as usize, payload.len());

    let name = utf16le("a.txt");
    let response = NotifyResponse::decode(&payload).expect("payload decodes");
    assert_eq!(response.records.len(), 1);
    assert_eq!(response.records[0].action, FILE_ACTION_ADDED);
    assert_eq!(response.records[0].file_name, name);
    // output_buffer_length covers the fixed record part plus the name.
    assert_eq!(payload[..4], ((12 + name.len()) as u32).to_ne_bytes());

    // Single-shot: the subscriber is gone and the reader winds down.
    let deadline = Instant::now() + Duration::from_secs(10);
    while subsystem.reader_alive() {
        assert!(Instant::now() < deadline, "reader did not exit");
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(subsystem.subscriber_count(), 0);
}

#[test]
fn a_second_request_after_delivery_starts_a_fresh_reader() {
    let dir = tempdir().expect("tempdir");
    let (link, sent) = scripted_link(&[]);
    let subsystem = NotifySubsystem::new();
    let encoder: Arc<dyn FilenameEncoder> = CodepageEncoder::shared();

    let request = NotifyRequest {
        completion_filter: filter::FILE_NOTIFY_CHANGE_FILE_NAME,
        dir_path: dir.path().as_os_str().as_encoded_bytes().to_vec(),
    };

    for (round, name) in ["one.txt", "two.txt"].iter().enumerate() {
        subsystem
            .handle_request(&link, &encoder, 0x9, "utf8", &request.encode())
            .expect("request succeeds");
        std::fs::File::create(dir.path().join(name)).expect("create file");

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if sent.lock().expect("sent frames").len() > round {
                break;
            }
            assert!(Instant::now() < deadline, "no notification within deadline");
            std::thread::sleep(Duration::from_millis(20));
        }
        let deadline = Instant::now() + Duration::from_secs(10);
        while subsystem.reader_alive() {
            assert!(Instant::now() < deadline, "reader did not exit");
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    assert_eq!(sent.lock().expect("sent frames").len(), 2);
}

#[test]
fn a_missing_directory_is_reported_without_registering_a_subscriber() {
    let (link, _sent) = scripted_link(&[]);
    let subsystem = NotifySubsystem::new();
    let encoder: Arc<dyn FilenameEncoder> = CodepageEncoder::shared();

    let request = NotifyRequest {
        completion_filter: filter::FILE_NOTIFY_CHANGE_FILE_NAME,
        dir_path: b"/no/such/directory".to_vec(),
    };
    let error = subsystem
        .handle_request(&link, &encoder, 0x5, "utf8", &request.encode())
        .unwrap_err();
    assert!(matches!(error, super::NotifyError::AddWatch { .. }));
    assert_eq!(subsystem.subscriber_count(), 0);
    assert!(!subsystem.reader_alive());
}
