use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    Respond(u16, String),
    DelayRespond(Duration, u16, String),
    /// Declares `declared` bytes in Content-Length but closes after `body`.
    Truncated { declared: usize, body: String },
}

impl Behavior {
    pub(crate) fn respond(status: u16, body: impl Into<String>) -> Self {
        Self::Respond(status, body.into())
    }
}

/// Single-purpose HTTP/1.1 server that replays queued behaviors in order.
#[derive(Debug)]
pub(crate) struct TestServer {
    pub(crate) base_url: String,
    requests: Arc<AtomicUsize>,
    heads: Arc<Mutex<Vec<String>>>,
    shutdown_tx: mpsc::Sender<()>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl TestServer {
    pub(crate) fn spawn(behaviors: Vec<Behavior>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind test server");
        listener.set_nonblocking(true).expect("set nonblocking");
        let addr = listener.local_addr().expect("local addr");

        let requests = Arc::new(AtomicUsize::new(0));
        let requests_clone = Arc::clone(&requests);
        let heads = Arc::new(Mutex::new(Vec::new()));
        let heads_clone = Arc::clone(&heads);
        let shared_behaviors = Arc::new(Mutex::new(VecDeque::from(behaviors)));
        let behaviors_clone = Arc::clone(&shared_behaviors);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                match listener.accept() {
                    Ok((mut stream, _)) => {
                        requests_clone.fetch_add(1, Ordering::SeqCst);
                        let behavior = {
                            let mut queue = behaviors_clone.lock().expect("lock behaviors");
                            queue
                                .pop_front()
                                .unwrap_or_else(|| Behavior::respond(200, "default-ok"))
                        };
                        let heads = Arc::clone(&heads_clone);
                        std::thread::spawn(move || {
                            if let Ok(head) = consume_request(&mut stream) {
                                heads.lock().expect("lock heads").push(head);
                            }
                            serve_behavior(&mut stream, behavior);
                        });
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
            heads,
            shutdown_tx,
            join_handle: Some(join_handle),
        }
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub(crate) fn request_heads(&self) -> Vec<String> {
        self.heads.lock().expect("lock heads").clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

fn consume_request(stream: &mut TcpStream) -> std::io::Result<String> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_millis(200)))?;
    let mut buf = [0_u8; 1024];
    let mut data = Vec::new();
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => {
                data.extend_from_slice(&buf[..read]);
                if data.windows(4).any(|window| window == b"\r\n\r\n") {
                    break;
                }
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                break;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(String::from_utf8_lossy(&data).into_owned())
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        408 => "Request Timeout",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

fn serve_behavior(stream: &mut TcpStream, behavior: Behavior) {
    match behavior {
        Behavior::Respond(status, body) => {
            let _ = write_response(stream, status, body.len(), &body);
        }
        Behavior::DelayRespond(delay, status, body) => {
            std::thread::sleep(delay);
            let _ = write_response(stream, status, body.len(), &body);
        }
        Behavior::Truncated { declared, body } => {
            let _ = write_response(stream, 200, declared, &body);
        }
    }
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_length: usize,
    body: &str,
) -> std::io::Result<()> {
    let reason = reason_phrase(status);
    write!(
        stream,
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Length: {content_length}\r\n\
         Connection: close\r\n\r\n"
    )?;
    stream.write_all(body.as_bytes())?;
    stream.flush()
}
