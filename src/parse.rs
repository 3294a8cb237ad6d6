use thiserror::Error;

/// Pipeline depth limit. Exceeding it is a parse error, not a runtime one.
pub const CMD_MAX: usize = 8;
/// Per-stage argument count limit (argv[0] included).
pub const CMD_ARGV_MAX: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub argv: Vec<String>,
}

impl Stage {
    pub fn name(&self) -> &str {
        &self.argv[0]
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("warning: no commands provided")]
    NoCommands,
    #[error("error: piping limited to {0} commands")]
    TooManyStages(usize),
    #[error("error: command limited to {0} arguments")]
    TooManyArgs(usize),
}

/// Split one raw line into pipeline stages. A `|` inside a quoted region
/// does not split; stages that trim to empty are dropped.
pub fn parse_pipeline(line: &str) -> Result<Vec<Stage>, ParseError> {
    let mut stages = Vec::new();
    for seg in split_pipes(line) {
        let argv = split_args(&seg);
        if argv.is_empty() {
            continue;
        }
        if argv.len() > CMD_ARGV_MAX {
            return Err(ParseError::TooManyArgs(CMD_ARGV_MAX));
        }
        if stages.len() == CMD_MAX {
            return Err(ParseError::TooManyStages(CMD_MAX));
        }
        stages.push(Stage { argv });
    }
    if stages.is_empty() {
        return Err(ParseError::NoCommands);
    }
    Ok(stages)
}

fn split_pipes(line: &str) -> Vec<String> {
    let mut segs = Vec::new();
    let mut cur = String::new();
    let mut quote: Option<char> = None;
    for c in line.chars() {
        match quote {
            Some(q) => {
                cur.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                cur.push(c);
            }
            None if c == '|' => {
                segs.push(std::mem::take(&mut cur));
            }
            None => cur.push(c),
        }
    }
    segs.push(cur);
    segs
}

/// Whitespace-split one stage substring. A quoted region becomes a single
/// argument with the delimiters stripped; an unterminated quote consumes the
/// rest of the input.
fn split_args(seg: &str) -> Vec<String> {
    let mut argv = Vec::new();
    let mut cur = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    for c in seg.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => cur.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    argv.push(std::mem::take(&mut cur));
                    in_token = false;
                }
            }
            None => {
                cur.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        argv.push(cur);
    }
    argv
}
