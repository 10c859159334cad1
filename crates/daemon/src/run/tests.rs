use std::fs;
use std::sync::Arc;

use tempfile::tempdir;
use usmbd_protocol::{Aux, ControlHeader, EventType, PipeKind};

use super::{Options, USAGE_EXIT_CODE, run, serve};
use crate::importer::{Account, AccountResolver};
use crate::link::testing::{MemoryChannel, ack, decode_sent};
use crate::notify::CodepageEncoder;
use crate::registry::Pipe;
use crate::rpc::{LanmanReply, RpcBackend, RpcError};

fn run_with_args(args: &[&str]) -> (i32, String, String) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = run(args.iter().copied(), &mut stdout, &mut stderr);
    (
        code,
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
    )
}

#[test]
fn help_is_printed_to_stdout_and_exits_cleanly() {
    let (code, stdout, stderr) = run_with_args(&["usmbd", "--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Usage"), "got: {stdout}");
    assert!(stderr.is_empty());
}

#[test]
fn version_is_reachable_through_the_short_flag() {
    let (code, stdout, _) = run_with_args(&["usmbd", "-v"]);
    assert_eq!(code, 0);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")), "got: {stdout}");
}

#[test]
fn unknown_flags_render_a_usage_error() {
    let (code, stdout, stderr) = run_with_args(&["usmbd", "--frobnicate"]);
    assert_eq!(code, USAGE_EXIT_CODE);
    assert!(stdout.is_empty());
    assert!(stderr.contains("Usage"), "got: {stderr}");
}

struct OneAccount;

impl AccountResolver for OneAccount {
    fn resolve(&self, name: &str) -> Option<Account> {
        (name == "alice").then_some(Account {
            uid: 1000,
            gid: 1000,
        })
    }
}

struct TwelveByteRpc;

impl RpcBackend for TwelveByteRpc {
    fn submit(&self, _pipe: &Pipe, _request: &[u8]) -> Result<(), RpcError> {
        Ok(())
    }

    fn poll(&self, _pipe: &Pipe, _max_out: usize) -> Result<Vec<u8>, RpcError> {
        Ok(b"rpc-response".to_vec())
    }

    fn lanman(
        &self,
        _pipe: &Pipe,
        _request: &[u8],
        _max_out: usize,
    ) -> Result<LanmanReply, RpcError> {
        Err(RpcError::Unsupported)
    }
}

#[test]
fn a_full_boot_announces_imports_dispatches_and_tears_down() {
    let dir = tempdir().expect("tempdir");
    let share_dir = dir.path().join("export");
    fs::create_dir(&share_dir).expect("create share dir");
    let users_db = dir.path().join("users.db");
    fs::write(&users_db, "alice::x\n").expect("write users db");
    let share_conf = dir.path().join("smb.conf");
    fs::write(
        &share_conf,
        format!("[data]\npath = {0}\ncomment = t\n", share_dir.display()),
    )
    .expect("write share conf");

    let channel = MemoryChannel::new();
    let sent = channel.sent();
    // Importer acknowledgements.
    let (user_ack_header, _) = ack(EventType::ConfigUserRsp, 0);
    channel.push_message(&user_ack_header, &[]);
    let (share_ack_header, _) = ack(EventType::ConfigShareRsp, 0);
    channel.push_message(&share_ack_header, &[]);
    // Loop traffic: open a pipe, read it back.
    let mut create = ControlHeader::new(EventType::CreatePipe);
    create.server_handle = 0x1;
    create.pipe_kind = PipeKind::Srvsvc;
    create.aux = Aux::Codepage(String::from("utf8"));
    channel.push_message(&create, &[]);
    let mut read = ControlHeader::new(EventType::ReadPipe);
    read.server_handle = 0x1;
    read.pipe_kind = PipeKind::Srvsvc;
    read.aux = Aux::OutBuflen(4096);
    channel.push_message(&read, &[]);

    let options = Options {
        debug: false,
        share_conf,
        users_db,
    };
    serve(
        Box::new(channel),
        &options,
        &OneAccount,
        Box::new(TwelveByteRpc),
        Arc::new(CodepageEncoder),
    )
    .expect("serve finishes");

    let frames = sent.lock().expect("sent frames");
    let events: Vec<EventType> = frames
        .iter()
        .map(|frame| decode_sent(frame).0.event)
        .collect();
    assert_eq!(
        events,
        vec![
            EventType::DaemonUp,
            EventType::ConfigUser,
            EventType::ConfigShare,
            EventType::ReadPipeRsp,
            EventType::DaemonDown,
        ]
    );

    let (read_rsp, payload) = decode_sent(&frames[3]);
    assert_eq!(read_rsp.server_handle, 0x1);
    assert_eq!(read_rsp.pipe_kind, PipeKind::Srvsvc);
    assert_eq!(read_rsp.error, 0);
    assert_eq!(read_rsp.buflen, 12);
    assert_eq!(read_rsp.aux, Aux::ReadCount(12));
    assert_eq!(payload, b"rpc-response");
}
