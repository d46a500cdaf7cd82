#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

#[derive(Debug)]
pub struct Recorded {
    pub request_line: String,
    /// Raw header block, lowercased.
    pub headers: String,
    pub body: String,
}

impl Recorded {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

pub struct Reply {
    status: u16,
    error_type: Option<&'static str>,
    body: &'static str,
}

pub fn ok(body: &'static str) -> Reply {
    status(200, body)
}

pub fn status(status: u16, body: &'static str) -> Reply {
    Reply {
        status,
        error_type: None,
        body,
    }
}

pub fn err(status: u16, error_type: &'static str, body: &'static str) -> Reply {
    Reply {
        status,
        error_type: Some(error_type),
        body,
    }
}

/// Answers one connection per reply, in order, and records what was asked.
pub fn serve(replies: Vec<Reply>) -> (String, mpsc::Receiver<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for reply in replies {
            let (mut stream, _) = listener.accept().unwrap();

            let mut buf = Vec::new();
            let mut header_end = None;
            while header_end.is_none() {
                let mut tmp = [0u8; 1024];
                let n = stream.read(&mut tmp).unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&tmp[..n]);
                if let Some(i) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    header_end = Some(i + 4);
                }
            }

            let header_end = header_end.expect("did not receive full headers");
            let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let lower = headers.to_lowercase();

            let content_length = lower
                .lines()
                .find_map(|l| l.strip_prefix("content-length: "))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);

            let mut body_buf = buf[header_end..].to_vec();
            while body_buf.len() < content_length {
                let mut tmp = vec![0u8; content_length - body_buf.len()];
                let n = stream.read(&mut tmp).unwrap();
                if n == 0 {
                    break;
                }
                body_buf.extend_from_slice(&tmp[..n]);
            }
            let body = String::from_utf8_lossy(&body_buf[..content_length]).to_string();

            tx.send(Recorded {
                request_line: headers.lines().next().unwrap_or("").to_string(),
                headers: lower,
                body,
            })
            .unwrap();

            let error_header = reply
                .error_type
                .map(|t| format!("x-amzn-ErrorType: {t}\r\n"))
                .unwrap_or_default();
            let resp = format!(
                "HTTP/1.1 {} OK\r\nContent-Type: application/json\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                reply.status,
                error_header,
                reply.body.len(),
                reply.body
            );
            stream.write_all(resp.as_bytes()).unwrap();
        }
    });

    (format!("http://{}", addr), rx)
}

/// Accepts a single connection and never answers it. The receiver fires once the
/// connection is open.
pub fn serve_without_reply() -> (String, mpsc::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        tx.send(()).unwrap();
        thread::sleep(Duration::from_secs(60));
        drop(stream);
    });

    (format!("http://{}", addr), rx)
}
