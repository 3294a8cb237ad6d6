use std::io::{self, BufRead, Write};
use std::net::TcpStream;

use anyhow::{Context, Result};

use crate::local::SH_PROMPT;
use crate::protocol::read_response;

/// One framed command per round-trip: send the line with a trailing null,
/// print response bytes until the end-of-response sentinel.
pub fn exec_remote_cmd_loop(address: &str, port: u16) -> Result<()> {
    let mut stream = TcpStream::connect((address, port))
        .with_context(|| format!("cannot connect to {address}:{port}"))?;
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
        let mut msg = cmd.as_bytes().to_vec();
        msg.push(0);
        stream.write_all(&msg).context("send failed")?;
        if !read_response(&mut stream, &mut io::stdout())? {
            eprintln!("server appeared to terminate - exiting");
            break;
        }
        if cmd == "exit" || cmd == "stop-server" {
            break;
        }
    }
    Ok(())
}
