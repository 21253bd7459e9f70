//! CLI interface for the chat client
//!
//! Command parsing, display formatting and the interactive loop that
//! multiplexes stdin, pushed envelopes and connection-state changes.

use crate::client::ChatClient;
use crate::error::{ClientError, Result};
use crate::models::{ChatMessage, Command, ServerFrame};
use crate::reconnect::ConnectionState;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

pub const RECONNECT_FAILED_NOTICE: &str = "Failed to reconnect. Please restart the client.";

/// Parse a command from user input
pub fn parse_command(input: &str) -> Result<Command> {
    Command::parse(input).map_err(ClientError::InvalidCommand)
}

/// Format a message for display
pub fn format_message(message: &ChatMessage) -> String {
    format!("<{}> {}", message.sender, message.content)
}

/// Format a message the local user just sent
pub fn format_outgoing(peer: &str, text: &str) -> String {
    format!("-> {}: {}", peer, text)
}

/// Format a connection-state notice, if the state is worth announcing
pub fn format_state(state: ConnectionState) -> Option<String> {
    match state {
        ConnectionState::Connected => Some("* connected".to_string()),
        ConnectionState::Reconnecting(n) => {
            Some(format!("* connection lost, reconnecting (attempt {})", n))
        }
        ConnectionState::Disconnected => Some("* disconnected".to_string()),
        ConnectionState::Failed => Some(RECONNECT_FAILED_NOTICE.to_string()),
        ConnectionState::Connecting => None,
    }
}

/// Read stdin lines on a separate task so the main loop can select on them
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

async fn print_history(client: &ChatClient) {
    let Some(peer) = client.peer() else {
        println!("No recipient selected. Use /to <username>");
        return;
    };

    match client.history().await {
        Ok(messages) if messages.is_empty() => println!("* no messages with {} yet", peer),
        Ok(messages) => {
            println!("* conversation with {}", peer);
            for message in &messages {
                println!("{}", format_message(message));
            }
        }
        Err(e) => println!("! could not load history: {}", e),
    }
}

/// Run the interactive loop until `/quit`, end of input or a terminal
/// connection state
pub async fn run_client_loop(
    client: &mut ChatClient,
    incoming: &mut mpsc::UnboundedReceiver<ServerFrame>,
) -> Result<()> {
    println!("Commands: /to <username>, /history, /quit");
    if let Err(e) = client.check_server().await {
        log::warn!("Health check failed: {}", e);
        println!("! server not reachable: {}", e);
    }
    if client.peer().is_some() {
        print_history(client).await;
    }

    let mut input = spawn_stdin_reader();
    let mut state = client.subscribe();
    let mut watching = true;

    loop {
        tokio::select! {
            line = input.recv() => {
                let Some(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(Command::To(peer)) => {
                        client.set_peer(&peer);
                        print_history(client).await;
                    }
                    Ok(Command::History) => print_history(client).await,
                    Ok(Command::Message(text)) => match client.send_message(&text) {
                        Ok(()) => {
                            if let Some(peer) = client.peer() {
                                println!("{}", format_outgoing(peer, &text));
                            }
                        }
                        Err(e) => println!("! {}", e),
                    },
                    Err(e) => println!("! {}", e),
                }
            }
            Some(frame) = incoming.recv() => match frame {
                ServerFrame::Envelope(envelope) => {
                    println!("{}", format_message(&client.open_incoming(&envelope)));
                }
                ServerFrame::Error { error } => println!("! server: {}", error),
            },
            changed = state.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                }
                let current = *state.borrow_and_update();
                if let Some(notice) = format_state(current) {
                    println!("{}", notice);
                }
                match current {
                    ConnectionState::Failed => {
                        client.shutdown().await;
                        return Err(ClientError::ReconnectExhausted(client.policy().max_attempts));
                    }
                    ConnectionState::Disconnected => break,
                    _ => {}
                }
            }
        }
    }

    client.shutdown().await;
    println!("Goodbye!");
    Ok(())
}
