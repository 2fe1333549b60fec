use clap::Parser;
use client::input::{parse_input, Input, HELP};
use client::rendering::{render_board, render_status};
use client::{ClientConfig, ClientEvent, ClientSession};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Player name announced to the server
    #[arg(short = 'n', long, default_value = "Player")]
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let config = ClientConfig {
        server: args.server,
        name: args.name,
    };
    let (session, handle, mut events) = ClientSession::connect(config).await?;
    let model = session.model();
    let mut session_task = tokio::spawn(session.run());

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut team = None;
    let mut stdin_open = true;

    loop {
        tokio::select! {
            result = &mut session_task => {
                result??;
                break;
            }
            Some(event) = events.recv() => match event {
                ClientEvent::Joined(assigned) => {
                    team = Some(assigned);
                    println!("joined as {}", assigned);
                }
                ClientEvent::Synchronized { checksum } => println!("board synchronized ({})", checksum),
                ClientEvent::Game(event) => println!("{:?}", event),
                ClientEvent::Disconnected => println!("connection to the server lost"),
                ClientEvent::Closed => println!("session closed"),
            },
            line = lines.next_line(), if stdin_open => {
                let line = match line? {
                    Some(line) => line,
                    None => {
                        stdin_open = false;
                        if handle.disconnect().is_err() {
                            warn!("Session is no longer running");
                        }
                        continue;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_input(&line) {
                    Ok(Input::Command(command)) => {
                        if handle.send(command).is_err() {
                            warn!("Session is no longer running");
                        }
                    }
                    Ok(Input::Board) => print!("{}", render_board(&*model.lock().await, team)),
                    Ok(Input::Status) => print!("{}", render_status(&*model.lock().await)),
                    Ok(Input::Help) => println!("{}", HELP),
                    Ok(Input::Quit) => {
                        if handle.disconnect().is_err() {
                            warn!("Session is no longer running");
                        }
                    }
                    Err(e) => println!("{}", e),
                }
            }
        }
    }

    Ok(())
}
