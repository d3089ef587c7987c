//! In-process mock broker speaking just enough RESP2 for client tests.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use disque_client::{ClientConfig, DisqueClient};

type Handler = dyn Fn(&[Vec<u8>]) -> Vec<u8> + Send + Sync;

/// Handle to a running mock broker.
pub struct MockBroker {
    pub addr: String,
    commands: Arc<Mutex<Vec<Vec<String>>>>,
    connections: Arc<AtomicUsize>,
}

impl MockBroker {
    /// Starts a broker that answers `PING` itself and hands every other
    /// command to `handler`.
    pub fn start(handler: impl Fn(&[Vec<u8>]) -> Vec<u8> + Send + Sync + 'static) -> Self {
        Self::start_with_limit(None, handler)
    }

    /// Like `start`, but each connection is dropped after `limit` commands
    /// (PINGs included).
    pub fn start_with_limit(
        limit: Option<usize>,
        handler: impl Fn(&[Vec<u8>]) -> Vec<u8> + Send + Sync + 'static,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let handler: Arc<Handler> = Arc::new(handler);
        let commands = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let accept_commands = commands.clone();
        let accept_connections = connections.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(_) => return,
                };
                accept_connections.fetch_add(1, Ordering::SeqCst);
                let handler = handler.clone();
                let commands = accept_commands.clone();
                thread::spawn(move || serve(stream, limit, handler, commands));
            }
        });

        MockBroker {
            addr,
            commands,
            connections,
        }
    }

    /// Non-PING commands received so far, as lossy strings.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().expect("commands").clone()
    }

    /// Number of TCP connections accepted.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

fn serve(
    stream: TcpStream,
    limit: Option<usize>,
    handler: Arc<Handler>,
    commands: Arc<Mutex<Vec<Vec<String>>>>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut writer = stream.try_clone().expect("clone");
    let mut reader = BufReader::new(stream);
    let mut served = 0;
    while limit.map_or(true, |limit| served < limit) {
        let args = match read_command(&mut reader) {
            Ok(args) => args,
            Err(_) => return,
        };
        served += 1;
        let reply = if args[0].eq_ignore_ascii_case(b"PING") {
            status("PONG")
        } else {
            commands.lock().expect("commands").push(
                args.iter()
                    .map(|arg| String::from_utf8_lossy(arg).into_owned())
                    .collect(),
            );
            handler(&args)
        };
        if writer.write_all(&reply).and_then(|_| writer.flush()).is_err() {
            return;
        }
    }
}

/// Address that refuses connections.
pub fn dead_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr").to_string()
}

pub fn client_for(endpoints: Vec<String>) -> DisqueClient {
    DisqueClient::with_config(ClientConfig {
        endpoints,
        read_timeout: Some(Duration::from_secs(2)),
        write_timeout: Some(Duration::from_secs(2)),
        connect_timeout: Some(Duration::from_secs(1)),
        ..ClientConfig::default()
    })
}

pub fn status(text: &str) -> Vec<u8> {
    format!("+{}\r\n", text).into_bytes()
}

pub fn error(text: &str) -> Vec<u8> {
    format!("-{}\r\n", text).into_bytes()
}

pub fn integer(value: i64) -> Vec<u8> {
    format!(":{}\r\n", value).into_bytes()
}

pub fn bulk(data: &[u8]) -> Vec<u8> {
    let mut out = format!("${}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

pub fn nil_bulk() -> Vec<u8> {
    b"$-1\r\n".to_vec()
}

pub fn nil_array() -> Vec<u8> {
    b"*-1\r\n".to_vec()
}

pub fn array(items: Vec<Vec<u8>>) -> Vec<u8> {
    let mut out = format!("*{}\r\n", items.len()).into_bytes();
    for item in items {
        out.extend_from_slice(&item);
    }
    out
}

pub fn job_tuple(queue: &str, id: &str, body: &[u8]) -> Vec<u8> {
    array(vec![bulk(queue.as_bytes()), bulk(id.as_bytes()), bulk(body)])
}

fn read_command(reader: &mut BufReader<TcpStream>) -> std::io::Result<Vec<Vec<u8>>> {
    let mut line = Vec::new();
    read_line(reader, &mut line)?;
    if line.first() != Some(&b'*') {
        return Err(invalid("expected array"));
    }
    let count = parse_usize(&line[1..])?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        read_line(reader, &mut line)?;
        if line.first() != Some(&b'$') {
            return Err(invalid("expected bulk"));
        }
        let len = parse_usize(&line[1..])?;
        let mut data = vec![0u8; len + 2];
        reader.read_exact(&mut data)?;
        if !data.ends_with(b"\r\n") {
            return Err(invalid("missing crlf"));
        }
        data.truncate(len);
        args.push(data);
    }
    if args.is_empty() {
        return Err(invalid("empty command"));
    }
    Ok(args)
}

fn read_line(reader: &mut BufReader<TcpStream>, buf: &mut Vec<u8>) -> std::io::Result<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"));
    }
    if !buf.ends_with(b"\r\n") {
        return Err(invalid("invalid line"));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_usize(data: &[u8]) -> std::io::Result<usize> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| invalid("digit"))
}

fn invalid(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string())
}
