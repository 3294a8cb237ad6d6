use std::io::{self, BufRead, Write};

use anyhow::Result;
use log::debug;

use crate::exec::{run_pipeline, ExitOutcome};
use crate::parse::parse_pipeline;

pub const SH_PROMPT: &str = "rdsh> ";

/// Interactive loop over the controlling terminal. The prompt is suppressed
/// when stdin is not a tty so scripted input stays clean.
pub fn exec_local_cmd_loop() -> Result<()> {
    let interactive = atty::is(atty::Stream::Stdin);
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        if interactive {
            print!("{SH_PROMPT}");
            io::stdout().flush()?;
        }
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            if interactive {
                println!();
            }
            break;
        }
        let cmd = line.trim_end();
        if cmd.is_empty() {
            continue;
        }
        let stages = match parse_pipeline(cmd) {
            Ok(s) => s,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        match run_pipeline(
            &stages,
            libc::STDIN_FILENO,
            libc::STDOUT_FILENO,
            libc::STDERR_FILENO,
        )? {
            ExitOutcome::Completed(rc) => debug!("rc = {rc}"),
            ExitOutcome::Exit | ExitOutcome::StopServer => break,
        }
    }
    Ok(())
}
