//! End-to-end engine runs against an in-process fixture server speaking a
//! line-terminated toy protocol: every request is a fixed-size blob, every
//! reply a CRLF-terminated line.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use kvbench_lib::{
    Config, Error, Feed, ReplyParser, RequestTemplate, Target, run_benchmark,
};

const REQUEST: &[u8] = b"PING\r\n";
const REPLY_OK: &[u8] = b"+OK\r\n";
const REPLY_ERR: &[u8] = b"-ERR boom\r\n";
const REPLY_BAD: &[u8] = b"!garbage\r\n";

/// Reply parser for the toy protocol: a line starting with `-` is an error
/// reply, one starting with `!` is malformed, anything else is a success.
#[derive(Default)]
struct LineParser {
    buf: Vec<u8>,
}

impl ReplyParser for LineParser {
    fn feed(&mut self, bytes: &[u8]) -> Feed {
        self.buf.extend_from_slice(bytes);
        let Some(end) = self.buf.windows(2).position(|w| w == b"\r\n") else {
            return Feed::Incomplete;
        };
        let verdict = match self.buf.first() {
            Some(b'!') => Feed::Malformed,
            Some(b'-') => Feed::Complete { is_error: true },
            _ => Feed::Complete { is_error: false },
        };
        self.buf.drain(..end + 2);
        verdict
    }
}

fn parser_factory() -> kvbench_lib::ParserFactory {
    Box::new(|| Box::new(LineParser::default()))
}

/// Serve one connection: read fixed-size requests, answer each with the
/// reply chosen by `reply_for` (indexed per request on this connection).
fn serve_conn<S, F>(mut stream: S, req_len: usize, reply_for: F)
where
    S: Read + Write,
    F: Fn(usize) -> &'static [u8],
{
    let mut buf = vec![0u8; 4096];
    let mut have = 0;
    let mut served = 0;
    loop {
        match stream.read(&mut buf[have..]) {
            Ok(0) | Err(_) => return,
            Ok(n) => have += n,
        }
        while have >= req_len {
            if stream.write_all(reply_for(served)).is_err() {
                return;
            }
            served += 1;
            buf.copy_within(req_len..have, 0);
            have -= req_len;
        }
    }
}

struct TcpFixture {
    target: Target,
    connections: Arc<AtomicUsize>,
}

fn spawn_tcp_server<F>(reply_for: F) -> TcpFixture
where
    F: Fn(usize) -> &'static [u8] + Copy + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fixture");
    let addr = listener.local_addr().expect("local addr");
    let connections = Arc::new(AtomicUsize::new(0));

    let counter = connections.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { return };
            counter.fetch_add(1, Ordering::SeqCst);
            thread::spawn(move || serve_conn(stream, REQUEST.len(), reply_for));
        }
    });

    TcpFixture {
        target: Target::Tcp {
            host: addr.ip().to_string(),
            port: addr.port(),
        },
        connections,
    }
}

fn quiet_config(target: Target, concurrency: usize, requests: usize, keep_alive: bool) -> Config {
    Config {
        concurrency,
        requests,
        keep_alive,
        quiet: true,
        target,
        ..Config::default()
    }
}

#[test]
fn single_request_single_client() {
    let fixture = spawn_tcp_server(|_| REPLY_OK);
    let cfg = quiet_config(fixture.target, 1, 1, true);

    let report = run_benchmark("PING", &cfg, RequestTemplate::new(REQUEST), parser_factory())
        .expect("run");

    assert_eq!(report.finished, 1);
    assert_eq!(report.table.len(), 1);
    assert_eq!(report.table[0].percent, 100.0);
    assert!(report.requests_per_second > 0.0);
    assert_eq!(fixture.connections.load(Ordering::SeqCst), 1);
}

#[test]
fn non_keep_alive_opens_one_connection_per_request() {
    let fixture = spawn_tcp_server(|_| REPLY_OK);
    let cfg = quiet_config(fixture.target, 10, 200, false);

    let report = run_benchmark("PING", &cfg, RequestTemplate::new(REQUEST), parser_factory())
        .expect("run");

    assert_eq!(report.finished, 200);
    assert_eq!(fixture.connections.load(Ordering::SeqCst), 200);
}

#[test]
fn keep_alive_reuses_connections() {
    let fixture = spawn_tcp_server(|_| REPLY_OK);
    let cfg = quiet_config(fixture.target, 4, 100, true);

    let report = run_benchmark("PING", &cfg, RequestTemplate::new(REQUEST), parser_factory())
        .expect("run");

    assert_eq!(report.finished, 100);
    assert_eq!(fixture.connections.load(Ordering::SeqCst), 4);
}

#[test]
fn latency_table_is_cumulative_and_complete() {
    let fixture = spawn_tcp_server(|_| REPLY_OK);
    let cfg = quiet_config(fixture.target, 8, 500, true);

    let report = run_benchmark("PING", &cfg, RequestTemplate::new(REQUEST), parser_factory())
        .expect("run");

    assert_eq!(report.finished, 500);
    let mut last = 0.0;
    for row in &report.table {
        assert!(row.percent >= last);
        last = row.percent;
    }
    assert_eq!(report.table.last().expect("rows").percent, 100.0);
}

#[test]
fn error_reply_aborts_the_run() {
    let fixture = spawn_tcp_server(|_| REPLY_ERR);
    let cfg = quiet_config(fixture.target, 2, 50, true);

    let err = run_benchmark("PING", &cfg, RequestTemplate::new(REQUEST), parser_factory())
        .expect_err("error reply must abort");
    assert!(matches!(err, Error::Protocol(_)));
}

#[test]
fn malformed_reply_mid_run_aborts_the_run() {
    // The fixture answers three requests per connection correctly, then
    // turns malformed.
    let fixture = spawn_tcp_server(|served| if served < 3 { REPLY_OK } else { REPLY_BAD });
    let cfg = quiet_config(fixture.target, 1, 50, true);

    let err = run_benchmark("PING", &cfg, RequestTemplate::new(REQUEST), parser_factory())
        .expect_err("malformed reply must abort");
    assert!(matches!(err, Error::Protocol(_)));
}

#[test]
fn connection_refused_aborts_before_the_run() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let cfg = quiet_config(
        Target::Tcp {
            host: addr.ip().to_string(),
            port: addr.port(),
        },
        2,
        10,
        true,
    );

    let err = run_benchmark("PING", &cfg, RequestTemplate::new(REQUEST), parser_factory())
        .expect_err("refused connection must abort");
    assert!(matches!(err, Error::Connect { .. }));
}

#[test]
fn measured_latency_includes_the_server_delay() {
    fn slow_reply(_: usize) -> &'static [u8] {
        thread::sleep(Duration::from_millis(20));
        REPLY_OK
    }
    let fixture = spawn_tcp_server(slow_reply);
    let cfg = quiet_config(fixture.target, 1, 3, true);

    let report = run_benchmark("PING", &cfg, RequestTemplate::new(REQUEST), parser_factory())
        .expect("run");

    let max_millis = report.table.last().expect("rows").millis;
    assert!(
        max_millis >= 10,
        "expected round trips of at least ~20ms, saw {max_millis}ms"
    );
}

#[test]
fn unix_socket_target_works() {
    let path: PathBuf =
        std::env::temp_dir().join(format!("kvbench-test-{}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path).expect("bind unix fixture");

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { return };
            thread::spawn(move || {
                serve_conn::<UnixStream, _>(stream, REQUEST.len(), |_| REPLY_OK)
            });
        }
    });

    let cfg = quiet_config(Target::Unix { path: path.clone() }, 2, 20, true);
    let report = run_benchmark("PING", &cfg, RequestTemplate::new(REQUEST), parser_factory())
        .expect("run");

    assert_eq!(report.finished, 20);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn randomized_requests_stay_in_keyspace() {
    // Every request carries its key bytes to the server, which checks them.
    const KEYED_REQUEST: &[u8] = b"GET key:000000000000\r\n";
    const KEY_OFFSET: usize = 8;

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fixture");
    let addr = listener.local_addr().expect("local addr");
    let bad_keys = Arc::new(AtomicUsize::new(0));

    let counter = bad_keys.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { return };
            let counter = counter.clone();
            thread::spawn(move || {
                let mut buf = vec![0u8; 4096];
                let mut have = 0;
                loop {
                    match stream.read(&mut buf[have..]) {
                        Ok(0) | Err(_) => return,
                        Ok(n) => have += n,
                    }
                    while have >= KEYED_REQUEST.len() {
                        let key = &buf[KEY_OFFSET..KEY_OFFSET + 12];
                        let in_range = key.iter().all(u8::is_ascii_digit)
                            && std::str::from_utf8(key)
                                .ok()
                                .and_then(|s| s.parse::<u64>().ok())
                                .is_some_and(|v| v < 10);
                        if !in_range {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }
                        if stream.write_all(REPLY_OK).is_err() {
                            return;
                        }
                        buf.copy_within(KEYED_REQUEST.len()..have, 0);
                        have -= KEYED_REQUEST.len();
                    }
                }
            });
        }
    });

    let cfg = Config {
        concurrency: 2,
        requests: 100,
        keep_alive: true,
        random_keyspace: 10,
        quiet: true,
        target: Target::Tcp {
            host: addr.ip().to_string(),
            port: addr.port(),
        },
        ..Config::default()
    };

    let template =
        RequestTemplate::with_rand_offsets(KEYED_REQUEST, vec![KEY_OFFSET]).expect("template");
    let report = run_benchmark("GET", &cfg, template, parser_factory()).expect("run");

    assert_eq!(report.finished, 100);
    assert_eq!(bad_keys.load(Ordering::SeqCst), 0);
}
