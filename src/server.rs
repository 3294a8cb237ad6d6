use std::io::ErrorKind;
use std::net::{Shutdown, TcpListener, TcpStream};
use std::os::fd::AsFd;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use log::{error, info, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::exec::{run_pipeline, ExitOutcome};
use crate::parse::parse_pipeline;
use crate::protocol::{read_request, send_eof, send_message, ProtocolError};

/// Accept-loop poll interval; an external shutdown request is acted on
/// within one interval.
const ACCEPT_POLL_MS: u16 = 1000;

pub struct ServerConfig {
    pub iface: String,
    pub port: u16,
    pub threaded: bool,
}

enum SessionEnd {
    Client,
    StopServer,
}

// A connection worker plus a handle on its socket, so shutdown can unblock
// a worker that is waiting on an idle client before joining it.
struct Worker {
    handle: JoinHandle<()>,
    stream: TcpStream,
}

// The run-state flag is owned by start_server and injected everywhere; this
// hook only exists so the signal handler can reach the same flag.
static SHUTDOWN_HOOK: OnceLock<Arc<AtomicBool>> = OnceLock::new();

extern "C" fn handle_signal(_sig: libc::c_int) {
    if let Some(running) = SHUTDOWN_HOOK.get() {
        running.store(false, Ordering::SeqCst);
    }
}

fn install_signal_handlers(running: &Arc<AtomicBool>) -> Result<()> {
    let _ = SHUTDOWN_HOOK.set(Arc::clone(running));
    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        sigaction(Signal::SIGINT, &action)?;
        sigaction(Signal::SIGTERM, &action)?;
    }
    Ok(())
}

/// Bind, listen, and serve until a termination signal or a client's
/// `stop-server`. Sequential mode handles connections inline; threaded mode
/// spawns one worker per connection and joins them all during shutdown.
pub fn start_server(cfg: &ServerConfig) -> Result<()> {
    let listener = TcpListener::bind((cfg.iface.as_str(), cfg.port))
        .with_context(|| format!("cannot listen on {}:{}", cfg.iface, cfg.port))?;
    listener.set_nonblocking(true)?;
    info!(
        "listening on {}:{} ({})",
        cfg.iface,
        cfg.port,
        if cfg.threaded { "threaded" } else { "sequential" }
    );

    let running = Arc::new(AtomicBool::new(true));
    install_signal_handlers(&running)?;

    let mut workers: Vec<Worker> = Vec::new();
    while running.load(Ordering::SeqCst) {
        let mut fds = [PollFd::new(listener.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(ACCEPT_POLL_MS)) {
            Ok(0) => {
                workers.retain(|w| !w.handle.is_finished());
                continue;
            }
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e).context("poll on listening socket"),
        }
        let (stream, peer) = match listener.accept() {
            Ok(conn) => conn,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                continue;
            }
            Err(e) => {
                error!("accept: {e}");
                continue;
            }
        };
        info!("client connected from {peer}");
        stream.set_nonblocking(false)?;
        if cfg.threaded {
            let running = Arc::clone(&running);
            let clone = stream.try_clone()?;
            let handle = thread::spawn(move || run_session(stream, &running));
            workers.push(Worker { handle, stream: clone });
            workers.retain(|w| !w.handle.is_finished());
        } else {
            run_session(stream, &running);
        }
    }
    info!("server shutdown requested");
    for w in workers {
        let _ = w.stream.shutdown(Shutdown::Both);
        let _ = w.handle.join();
    }
    Ok(())
}

fn run_session(mut stream: TcpStream, running: &Arc<AtomicBool>) {
    match exec_client_requests(&mut stream) {
        Ok(SessionEnd::StopServer) => {
            info!("client requested server to stop, stopping...");
            running.store(false, Ordering::SeqCst);
        }
        Ok(SessionEnd::Client) => info!("client exited: getting next connection..."),
        // Fatal to this connection only; the server keeps accepting.
        Err(e) => error!("session ended: {e}"),
    }
}

fn exec_client_requests(stream: &mut TcpStream) -> Result<SessionEnd, ProtocolError> {
    let sock_fd = stream.as_raw_fd();
    let mut buf: Vec<u8> = Vec::new();
    loop {
        let cmd = match read_request(stream, &mut buf) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => return Ok(SessionEnd::Client),
            Err(ProtocolError::RequestTooLong) => {
                warn!("dropping oversized request");
                send_message(stream, "error: command too long or missing null terminator\n")?;
                continue;
            }
            Err(e) => return Err(e),
        };
        let cmd = cmd.trim_end();
        if cmd.is_empty() {
            send_eof(stream)?;
            continue;
        }
        info!("exec: {cmd}");
        if cmd == "exit" {
            send_message(stream, "Goodbye!\n")?;
            return Ok(SessionEnd::Client);
        }
        if cmd == "stop-server" {
            send_message(stream, "Stopping server...\n")?;
            return Ok(SessionEnd::StopServer);
        }
        let stages = match parse_pipeline(cmd) {
            Ok(s) => s,
            Err(e) => {
                send_message(stream, &format!("{e}\n"))?;
                continue;
            }
        };
        // The socket stands in for the terminal: stdin of the first stage,
        // stdout/stderr of every stage.
        match run_pipeline(&stages, sock_fd, sock_fd, sock_fd) {
            Ok(ExitOutcome::Completed(rc)) => {
                info!("rc = {rc}");
                send_eof(stream)?;
            }
            Ok(ExitOutcome::Exit) => {
                send_message(stream, "Goodbye!\n")?;
                return Ok(SessionEnd::Client);
            }
            Ok(ExitOutcome::StopServer) => {
                send_message(stream, "Stopping server...\n")?;
                return Ok(SessionEnd::StopServer);
            }
            Err(e) => {
                error!("command execution error: {e}");
                send_message(stream, "error: command execution error\n")?;
            }
        }
    }
}
