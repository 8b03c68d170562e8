use super::scripted::{ReadStep, ScriptedTransport};
use super::*;
use crate::scraper::MarkerRegistry;
use std::ffi::CStr;
use std::io::ErrorKind;
use std::mem;
use std::os::unix::io::RawFd;
use std::ptr;

fn session() -> (TransportSession<ScriptedTransport>, scripted::ScriptHandle) {
    let (transport, handle) = ScriptedTransport::new();
    (TransportSession::new(transport, Duration::ZERO), handle)
}

fn run_startup(
    session: &mut TransportSession<ScriptedTransport>,
    deadline: Option<Duration>,
) -> (Result<Handshake>, Vec<String>) {
    let mut seen = Vec::new();
    let mut sink = |text: &str| seen.push(text.to_string());
    let result = session.startup(
        &MarkerRegistry::standard(),
        &SessionState::default(),
        &mut sink,
        deadline,
    );
    (result, seen)
}

#[test]
fn startup_toggles_reset_and_waits_for_prompt() {
    let (mut session, handle) = session();
    handle.push_text("stale boot noise\nuLisp 4.4 ");
    handle.push(ReadStep::Quiet);
    handle.push_text("ESP32\n\n9044> tail");

    let (result, seen) = run_startup(&mut session, Some(Duration::from_secs(5)));
    let handshake = result.expect("handshake");

    assert_eq!(handle.reset_line(), vec![false, true]);
    assert_eq!(handle.clears(), 1);
    assert_eq!(
        seen,
        vec![RESET_BANNER, "stale boot noise\n", "uLisp 4.4 ESP32\n", "\n"]
    );
    assert_eq!(handshake.free_cells, Some(9044));
    assert_eq!(handshake.prompt, "9044> ");
    assert_eq!(handshake.trailing, "tail");
}

#[test]
fn startup_forwards_text_before_prompt_on_same_line() {
    let (mut session, handle) = session();
    handle.push_text("boot ok 512> ");
    let (result, seen) = run_startup(&mut session, None);
    let handshake = result.expect("handshake");
    assert_eq!(seen, vec![RESET_BANNER, "boot ok "]);
    assert_eq!(handshake.free_cells, Some(512));
    assert_eq!(handshake.trailing, "");
}

#[test]
fn startup_aborts_on_bootloader_line() {
    let (mut session, handle) = session();
    handle.push_text("rst:0x1 (POWERON_RESET)\nwaiting for download\n");
    let (result, seen) = run_startup(&mut session, Some(Duration::from_secs(5)));
    let err = result.expect_err("bootloader should abort");
    let fatal = err.downcast_ref::<FatalMarker>().expect("fatal marker");
    assert_eq!(fatal.watcher, "bootloader");
    assert_eq!(seen, vec![RESET_BANNER, "rst:0x1 (POWERON_RESET)\n"]);
}

#[test]
fn startup_times_out_without_prompt() {
    let (mut session, handle) = session();
    handle.push_text("no prompt here");
    let (result, _) = run_startup(&mut session, Some(Duration::ZERO));
    let err = result.expect_err("timeout");
    assert!(err.downcast_ref::<HandshakeTimeout>().is_some());
    assert_eq!(err.to_string(), "no prompt from device after 0 ms");
}

#[test]
fn startup_forwards_each_line_before_the_next_read() {
    let (mut session, handle) = session();
    handle.push_text("ets Jun  8 2016\n");
    handle.push_text("load:0x3fff0018\n");
    handle.push(ReadStep::Fail(ErrorKind::BrokenPipe));

    let (result, seen) = run_startup(&mut session, None);
    assert!(result.is_err());
    assert_eq!(
        seen,
        vec![RESET_BANNER, "ets Jun  8 2016\n", "load:0x3fff0018\n"]
    );
}

#[test]
fn startup_propagates_read_errors() {
    let (mut session, handle) = session();
    handle.push(ReadStep::Fail(ErrorKind::BrokenPipe));
    let (result, _) = run_startup(&mut session, None);
    assert!(result.is_err());
}

#[test]
fn poll_returns_none_when_quiet() {
    let (mut session, _handle) = session();
    assert_eq!(session.poll().expect("poll"), None);
}

#[test]
fn poll_drains_available_reads_and_carries_split_utf8() {
    let (mut session, handle) = session();
    let bytes = "(print \"λ\")".as_bytes();
    let split = bytes.iter().position(|b| *b >= 0x80).expect("multibyte") + 1;
    handle.push(ReadStep::Data(bytes[..split].to_vec()));
    handle.push(ReadStep::Quiet);
    handle.push(ReadStep::Data(bytes[split..].to_vec()));

    let first = session.poll().expect("poll").expect("text");
    assert_eq!(first, "(print \"");
    let second = session.poll().expect("poll").expect("text");
    assert_eq!(format!("{first}{second}"), "(print \"λ\")");
}

#[test]
fn send_command_appends_newline_and_flushes() {
    let (mut session, handle) = session();
    session.send_command("(+ 1 2)").expect("send");
    assert_eq!(handle.written(), "(+ 1 2)\n");
    assert_eq!(handle.flushes(), 1);
}

#[test]
fn send_command_reports_write_failure() {
    let (mut session, handle) = session();
    handle.fail_writes();
    assert!(session.send_command("(+ 1 2)").is_err());
}

#[test]
fn supported_baud_rates_include_common_speeds() {
    assert!(is_supported_baud(115200));
    assert!(is_supported_baud(9600));
    assert!(!is_supported_baud(12345));
}

fn open_pty_pair() -> (RawFd, RawFd) {
    let mut master = -1;
    let mut slave = -1;
    let mut ws: libc::winsize = unsafe { mem::zeroed() };
    let result = unsafe {
        libc::openpty(
            &mut master,
            &mut slave,
            ptr::null_mut(),
            ptr::null_mut(),
            &mut ws,
        )
    };
    assert_eq!(
        result,
        0,
        "openpty() failed with errno {}",
        io::Error::last_os_error()
    );
    (master, slave)
}

fn slave_path(master: RawFd) -> String {
    let name = unsafe { libc::ptsname(master) };
    assert!(!name.is_null(), "ptsname() failed");
    unsafe { CStr::from_ptr(name) }
        .to_string_lossy()
        .into_owned()
}

fn read_master(master: RawFd, want: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 64];
    let deadline = Instant::now() + Duration::from_secs(2);
    while out.len() < want && Instant::now() < deadline {
        let mut pfd = libc::pollfd {
            fd: master,
            events: libc::POLLIN,
            revents: 0,
        };
        if unsafe { libc::poll(&mut pfd, 1, 100) } <= 0 {
            continue;
        }
        let n = unsafe { libc::read(master, buf.as_mut_ptr() as *mut _, buf.len()) };
        if n <= 0 {
            break;
        }
        out.extend_from_slice(&buf[..n as usize]);
    }
    out
}

#[test]
fn serial_port_moves_bytes_over_pty() {
    let (master, slave) = open_pty_pair();
    let path = slave_path(master);
    let mut port = SerialPort::open(&path, 115200).expect("open pty slave");
    assert_eq!(port.label(), path);
    assert_eq!(port.path(), path);
    assert_eq!(port.baud(), 115200);

    let greeting = b"uLisp 4.4\n123> ";
    let written = unsafe { libc::write(master, greeting.as_ptr() as *const _, greeting.len()) };
    assert_eq!(written, greeting.len() as isize);

    let mut received = Vec::new();
    let mut buf = [0u8; 64];
    let deadline = Instant::now() + Duration::from_secs(2);
    while received.len() < greeting.len() && Instant::now() < deadline {
        let n = port
            .read_timeout(&mut buf, Duration::from_millis(100))
            .expect("read");
        received.extend_from_slice(&buf[..n]);
    }
    assert_eq!(received, greeting);

    port.write_all(b"(+ 1 2)\n").expect("write");
    port.flush().expect("flush");
    assert_eq!(read_master(master, 8), b"(+ 1 2)\n");

    assert_eq!(
        port.read_timeout(&mut buf, Duration::from_millis(10))
            .expect("quiet read"),
        0
    );

    drop(port);
    unsafe {
        libc::close(slave);
        libc::close(master);
    }
}

#[test]
fn serial_port_refuses_second_open() {
    let (master, slave) = open_pty_pair();
    let path = slave_path(master);
    let _first = SerialPort::open(&path, 115200).expect("first open");
    assert!(SerialPort::open(&path, 115200).is_err());
    unsafe {
        libc::close(slave);
        libc::close(master);
    }
}

#[test]
fn serial_port_reports_missing_device() {
    let err = SerialPort::open("/dev/ulterm-does-not-exist", 115200).expect_err("missing");
    assert!(err.to_string().contains("/dev/ulterm-does-not-exist"));
}

#[test]
fn serial_port_rejects_unsupported_baud() {
    let err = SerialPort::open("/dev/null", 12345).expect_err("baud");
    assert!(err.to_string().contains("12345"));
}
