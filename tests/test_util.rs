use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

pub const EOF_CHAR: u8 = 0x04;

pub struct Server {
    pub child: Child,
    pub port: u16,
}

impl Server {
    /// Wait for the server process to exit on its own.
    pub fn wait_for_exit(&mut self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if self.child.try_wait().unwrap().is_some() {
                return true;
            }
            thread::sleep(Duration::from_millis(50));
        }
        false
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn spawn_server(threaded: bool) -> Server {
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_rdsh"));
    cmd.arg("-s").arg("-i").arg("127.0.0.1").arg("-p").arg(port.to_string());
    if threaded {
        cmd.arg("-x");
    }
    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::inherit());
    let child = cmd.spawn().expect("spawn rdsh server");
    Server { child, port }
}

pub fn connect(server: &Server) -> TcpStream {
    for _ in 0..200 {
        if let Ok(s) = TcpStream::connect(("127.0.0.1", server.port)) {
            return s;
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("could not connect to test server on port {}", server.port);
}

pub fn send_cmd(stream: &mut TcpStream, cmd: &str) {
    stream.write_all(cmd.as_bytes()).unwrap();
    stream.write_all(&[0]).unwrap();
}

/// Read one full response. Asserts the sentinel terminates the stream and
/// never appears earlier; returns the bytes before it.
pub fn read_response(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "server closed connection before end of response");
        out.extend_from_slice(&chunk[..n]);
        if let Some(pos) = out.iter().position(|b| *b == EOF_CHAR) {
            assert_eq!(pos, out.len() - 1, "bytes after the end-of-response sentinel");
            out.truncate(pos);
            return out;
        }
    }
}

pub fn roundtrip(stream: &mut TcpStream, cmd: &str) -> String {
    send_cmd(stream, cmd);
    String::from_utf8_lossy(&read_response(stream)).into_owned()
}
