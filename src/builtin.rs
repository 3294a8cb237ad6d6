use std::os::unix::io::RawFd;
use std::path::Path;

use nix::unistd::chdir;

use crate::exec::write_all_fd;
use crate::parse::Stage;

/// Commands executed in the shell's own context instead of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Exit,
    Cd,
    Dragon,
    StopServer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinOutcome {
    Executed,
    Exit,
    StopServer,
}

pub fn match_builtin(name: &str) -> Option<Builtin> {
    match name {
        "exit" => Some(Builtin::Exit),
        "cd" => Some(Builtin::Cd),
        "dragon" => Some(Builtin::Dragon),
        "stop-server" => Some(Builtin::StopServer),
        _ => None,
    }
}

/// Run one built-in stage. Output goes to `out_fd` so it is capturable the
/// same way external-process output is (required for remote sessions).
/// Usage and OS errors go to `err_fd` and are never fatal.
pub fn run_builtin(kind: Builtin, stage: &Stage, out_fd: RawFd, err_fd: RawFd) -> BuiltinOutcome {
    match kind {
        Builtin::Exit => BuiltinOutcome::Exit,
        Builtin::StopServer => BuiltinOutcome::StopServer,
        Builtin::Dragon => {
            let _ = write_all_fd(out_fd, DRAGON.as_bytes());
            BuiltinOutcome::Executed
        }
        Builtin::Cd => {
            match stage.argv.get(1) {
                None => {
                    let _ = write_all_fd(err_fd, b"cd: missing argument\n");
                }
                Some(path) => {
                    if let Err(e) = chdir(Path::new(path.as_str())) {
                        let msg = format!("cd: {}: {}\n", path, e);
                        let _ = write_all_fd(err_fd, msg.as_bytes());
                    }
                }
            }
            BuiltinOutcome::Executed
        }
    }
}

const DRAGON: &str = r#"
                 ____ __
                { --.\  |          .)%%%)%%
                 '-._\\ | (\___   %)%%(%%(%%%
                     `\\|{/ ^ _)-%(%%%%)%%;%%%
                 .'^^^^^^^  /`    %%)%%%%)%%%'
                //\   ) ,  \       '%%%%(%%'
          ,  _.'/  `\<-- \<
           `^^^`     ^^   ^^
"#;
