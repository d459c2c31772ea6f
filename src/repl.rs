//! Line-oriented front end for [`Session`].

use std::io::Write;

use anyhow::Result;
use chromatic_core::{ReplCommand, Session};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};

fn prompt() {
    print!("{} ", "chromatic>".bright_cyan().bold());
    let _ = std::io::stdout().flush();
}

/// Read commands until `exit` or end of input. Command errors are printed
/// and the session continues.
pub async fn run(session: Session) -> Result<()> {
    println!("{}", "Type 'help' for commands, 'exit' to quit.".dimmed());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt();
    while let Some(line) = lines.next_line().await? {
        match ReplCommand::parse(&line) {
            Ok(None) => {}
            Ok(Some(command)) => match session.execute(command).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => eprintln!("{} {e:#}", "error:".red().bold()),
            },
            Err(e) => eprintln!("{} {e:#}", "error:".red().bold()),
        }
        prompt();
    }
    Ok(())
}
