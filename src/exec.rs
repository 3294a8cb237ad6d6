use std::ffi::CString;
use std::os::unix::io::{IntoRawFd, RawFd};

use anyhow::Result;
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{close, dup2, execvp, fork, pipe, ForkResult, Pid};

use crate::builtin::{match_builtin, run_builtin, Builtin};
use crate::parse::Stage;

/// Reserved status a stage may exit with to signal the shell's own exit
/// code. Any spawned stage terminating with it overrides the pipeline's
/// reported status (kept for compatibility with the original tool).
pub const EXIT_SC: i32 = 99;

const SPAWN_FAIL: i32 = 126;
const NOT_FOUND: i32 = 127;

/// What one pipeline run means for the calling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Completed(i32),
    Exit,
    StopServer,
}

/// Run a parsed pipeline against the given endpoints, blocking until every
/// spawned stage has terminated.
///
/// The first stage reads `stdin_fd`, the last writes `stdout_fd`, interior
/// edges go through anonymous pipes, and every stage's stderr is `stderr_fd`.
/// Built-in stages execute in place against the external sinks and are
/// skipped by the pipe wiring. An `exit` or `stop-server` stage anywhere
/// terminates the whole pipeline before anything is spawned.
pub fn run_pipeline(
    stages: &[Stage],
    stdin_fd: RawFd,
    stdout_fd: RawFd,
    stderr_fd: RawFd,
) -> Result<ExitOutcome> {
    if stages.is_empty() {
        return Ok(ExitOutcome::Completed(0));
    }
    let kinds: Vec<Option<Builtin>> = stages.iter().map(|s| match_builtin(s.name())).collect();
    if kinds.iter().any(|k| *k == Some(Builtin::Exit)) {
        return Ok(ExitOutcome::Exit);
    }
    if kinds.iter().any(|k| *k == Some(Builtin::StopServer)) {
        return Ok(ExitOutcome::StopServer);
    }

    let mut chan: Vec<(RawFd, RawFd)> = Vec::with_capacity(stages.len().saturating_sub(1));
    for _ in 0..stages.len() - 1 {
        let (r, w) = pipe()?;
        chan.push((r.into_raw_fd(), w.into_raw_fd()));
    }

    let last = stages.len() - 1;
    let mut pids: Vec<Option<Pid>> = Vec::with_capacity(stages.len());
    let mut statuses = vec![0i32; stages.len()];
    for (i, stage) in stages.iter().enumerate() {
        if let Some(kind) = kinds[i] {
            run_builtin(kind, stage, stdout_fd, stderr_fd);
            pids.push(None);
            continue;
        }
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                let stdin = if i == 0 { stdin_fd } else { chan[i - 1].0 };
                let stdout = if i == last { stdout_fd } else { chan[i].1 };
                child_exec(stage, stdin, stdout, stderr_fd, &chan);
            }
            Ok(ForkResult::Parent { child }) => pids.push(Some(child)),
            Err(e) => {
                // A stage that fails to spawn does not abort its siblings.
                let msg = format!("rdsh: {}: fork failed: {}\n", stage.name(), e);
                let _ = write_all_fd(stderr_fd, msg.as_bytes());
                statuses[i] = SPAWN_FAIL;
                pids.push(None);
            }
        }
    }

    // Channel endpoints are only needed by the children.
    for (r, w) in &chan {
        let _ = close(*r);
        let _ = close(*w);
    }

    for (i, pid) in pids.iter().enumerate() {
        if let Some(pid) = *pid {
            statuses[i] = wait_status(pid);
        }
    }

    let mut rc = statuses[last];
    for (i, status) in statuses.iter().enumerate() {
        if pids[i].is_some() && *status == EXIT_SC {
            rc = EXIT_SC;
        }
    }
    Ok(ExitOutcome::Completed(rc))
}

fn wait_status(pid: Pid) -> i32 {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return code,
            Ok(WaitStatus::Signaled(_, sig, _)) => return 128 + sig as i32,
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(_) => return SPAWN_FAIL,
        }
    }
}

fn child_exec(stage: &Stage, stdin: RawFd, stdout: RawFd, stderr: RawFd, chan: &[(RawFd, RawFd)]) -> ! {
    if stdin != libc::STDIN_FILENO {
        let _ = dup2(stdin, libc::STDIN_FILENO);
    }
    if stdout != libc::STDOUT_FILENO {
        let _ = dup2(stdout, libc::STDOUT_FILENO);
    }
    if stderr != libc::STDERR_FILENO {
        let _ = dup2(stderr, libc::STDERR_FILENO);
    }
    // Endpoints not belonging to this stage must be gone before exec, or
    // downstream readers never observe end-of-stream.
    for (r, w) in chan {
        let _ = close(*r);
        let _ = close(*w);
    }
    let mut argv: Vec<CString> = Vec::with_capacity(stage.argv.len());
    for a in &stage.argv {
        match CString::new(a.as_str()) {
            Ok(c) => argv.push(c),
            Err(_) => {
                let _ = write_all_fd(libc::STDERR_FILENO, b"rdsh: argument contains NUL byte\n");
                unsafe { libc::_exit(SPAWN_FAIL) }
            }
        }
    }
    if let Err(e) = execvp(&argv[0], &argv) {
        let code = if e == Errno::ENOENT {
            let msg = format!("rdsh: command not found: {}\n", stage.name());
            let _ = write_all_fd(libc::STDERR_FILENO, msg.as_bytes());
            NOT_FOUND
        } else {
            let msg = format!("rdsh: {}: {}\n", stage.name(), e);
            let _ = write_all_fd(libc::STDERR_FILENO, msg.as_bytes());
            SPAWN_FAIL
        };
        unsafe { libc::_exit(code) }
    }
    unreachable!()
}

/// Write a full buffer to a raw fd, retrying on partial writes and EINTR.
/// Safe to call on either side of a fork.
pub fn write_all_fd(fd: RawFd, mut buf: &[u8]) -> std::io::Result<()> {
    while !buf.is_empty() {
        let rc = unsafe { libc::write(fd, buf.as_ptr() as *const _, buf.len()) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        let written = rc as usize;
        if written == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write returned 0",
            ));
        }
        buf = &buf[written..];
    }
    Ok(())
}
