use rdsh::parse::{parse_pipeline, ParseError, CMD_ARGV_MAX, CMD_MAX};

fn argvs(line: &str) -> Vec<Vec<String>> {
    parse_pipeline(line)
        .unwrap()
        .into_iter()
        .map(|s| s.argv)
        .collect()
}

#[test]
fn two_stages() {
    assert_eq!(argvs("a b | c d"), vec![vec!["a", "b"], vec!["c", "d"]]);
}

#[test]
fn pipe_inside_quotes_does_not_split() {
    assert_eq!(argvs("echo \"a | b\""), vec![vec!["echo", "a | b"]]);
    assert_eq!(argvs("echo 'a | b' | cat"), vec![vec!["echo", "a | b"], vec!["cat"]]);
}

#[test]
fn quotes_preserve_interior_whitespace() {
    assert_eq!(argvs("echo 'hello   world'"), vec![vec!["echo", "hello   world"]]);
    assert_eq!(argvs("echo \" padded \""), vec![vec!["echo", " padded "]]);
}

#[test]
fn quote_marks_are_removed_and_join_adjacent_text() {
    assert_eq!(argvs("echo ab\"cd\"ef"), vec![vec!["echo", "abcdef"]]);
    assert_eq!(argvs("echo \"\""), vec![vec!["echo", ""]]);
}

#[test]
fn unbalanced_quote_takes_rest_of_input() {
    assert_eq!(
        argvs("echo \"unterminated rest"),
        vec![vec!["echo", "unterminated rest"]]
    );
}

#[test]
fn empty_stages_are_dropped() {
    assert_eq!(argvs("ls |"), vec![vec!["ls"]]);
    assert_eq!(argvs("| ls"), vec![vec!["ls"]]);
    assert_eq!(argvs("a | | b"), vec![vec!["a"], vec!["b"]]);
}

#[test]
fn whitespace_only_line_is_no_commands() {
    assert_eq!(parse_pipeline("   \t  "), Err(ParseError::NoCommands));
    assert_eq!(parse_pipeline("|"), Err(ParseError::NoCommands));
}

#[test]
fn too_many_stages_is_rejected() {
    let line = vec!["x"; CMD_MAX + 1].join(" | ");
    assert_eq!(parse_pipeline(&line), Err(ParseError::TooManyStages(CMD_MAX)));
    let line = vec!["x"; CMD_MAX].join(" | ");
    assert_eq!(parse_pipeline(&line).unwrap().len(), CMD_MAX);
}

#[test]
fn too_many_args_is_rejected() {
    let line = vec!["a"; CMD_ARGV_MAX + 1].join(" ");
    assert_eq!(parse_pipeline(&line), Err(ParseError::TooManyArgs(CMD_ARGV_MAX)));
}
