//! SnapKV command-line client
//!
//! With a command on the command line it runs that one command and exits;
//! otherwise it starts an interactive prompt.

use clap::Parser;
use snapkv::client::{split_command_line, Client};
use std::io::{self, Write};
use std::process::ExitCode;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "snapkv-cli", version, about, disable_help_flag = true)]
struct ClientConfig {
    /// Server hostname
    #[arg(short = 'h', long, default_value = snapkv::DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = snapkv::DEFAULT_PORT)]
    port: u16,

    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,

    /// Command to run once instead of starting the prompt
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

const HELP: &str = "\
Type a command and press enter, e.g.

    SET greeting \"hello world\"
    GET greeting
    LPUSH queue a b c
    LRANGE queue 0 -1

Quote arguments that contain spaces. Inside double quotes, \\n, \\t, \\\" and
\\xHH escapes are understood.

Local commands:
    help          show this text
    quit, exit    leave the prompt";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let config = ClientConfig::parse();

    let mut client = match Client::connect(&config.host, config.port).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!(
                "Could not connect to SnapKV at {}:{}: {}",
                config.host, config.port, e
            );
            return ExitCode::FAILURE;
        }
    };

    if !config.command.is_empty() {
        return match client.send(config.command).await {
            Ok(reply) => {
                println!("{}", reply);
                if reply.is_error() {
                    ExitCode::FAILURE
                } else {
                    ExitCode::SUCCESS
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    match repl(&mut client, BufReader::new(tokio::io::stdin())).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Reads lines from `input` until EOF, `quit` or `exit`.
async fn repl<R>(client: &mut Client, input: R) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let prompt = format!("{}> ", client.addr());
    let mut lines = input.lines();

    loop {
        print!("{}", prompt);
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            return Ok(());
        };

        let args = match split_command_line(&line) {
            Ok(args) if args.is_empty() => continue,
            Ok(args) => args,
            Err(e) => {
                println!("(error) {}", e);
                continue;
            }
        };

        match args[0].to_ascii_lowercase().as_str() {
            "quit" | "exit" => return Ok(()),
            "help" => {
                println!("{}", HELP);
                continue;
            }
            _ => {}
        }

        let reply = client.send(args).await?;
        println!("{}", reply);
    }
}
