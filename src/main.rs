use anyhow::{anyhow, bail, Result};

use rdsh::client::exec_remote_cmd_loop;
use rdsh::local::exec_local_cmd_loop;
use rdsh::protocol::{DEF_CLI_CONNECT, DEF_PORT, DEF_SVR_INTFACE};
use rdsh::server::{start_server, ServerConfig};

enum Mode {
    Local,
    Server,
    Client,
}

fn usage() {
    eprintln!("usage: rdsh [-s | -c] [-i <address>] [-p <port>] [-x]");
    eprintln!("  (no flags)  interactive local shell");
    eprintln!("  -s          run as server (default interface {DEF_SVR_INTFACE})");
    eprintln!("  -c          run as remote client (default server {DEF_CLI_CONNECT})");
    eprintln!("  -i <addr>   listen/connect address");
    eprintln!("  -p <port>   listen/connect port (default {DEF_PORT})");
    eprintln!("  -x          threaded server: one worker per connection");
}

fn main() -> Result<()> {
    env_logger::init();
    let mut mode = Mode::Local;
    let mut address: Option<String> = None;
    let mut port: u16 = DEF_PORT;
    let mut threaded = false;
    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        match a.as_str() {
            "-s" | "--server" => mode = Mode::Server,
            "-c" | "--client" => mode = Mode::Client,
            "-i" | "--interface" => {
                address = Some(args.next().ok_or_else(|| anyhow!("missing value after -i"))?);
            }
            "-p" | "--port" => {
                let v = args.next().ok_or_else(|| anyhow!("missing value after -p"))?;
                port = v.parse().map_err(|_| anyhow!("invalid port: {v}"))?;
            }
            "-x" | "--threaded" => threaded = true,
            "-h" | "--help" => {
                usage();
                return Ok(());
            }
            other => {
                usage();
                bail!("unknown arg: {other}");
            }
        }
    }
    match mode {
        Mode::Local => exec_local_cmd_loop(),
        Mode::Server => start_server(&ServerConfig {
            iface: address.unwrap_or_else(|| DEF_SVR_INTFACE.to_string()),
            port,
            threaded,
        }),
        Mode::Client => {
            let address = address.unwrap_or_else(|| DEF_CLI_CONNECT.to_string());
            exec_remote_cmd_loop(&address, port)
        }
    }
}
