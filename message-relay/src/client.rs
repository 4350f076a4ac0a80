use std::io::IsTerminal;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, Lines},
    select,
};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    codec,
    command::{OperatorCommand, USAGE},
    envelope::Envelope,
    frame::{Frame, FrameError},
    transport::{self, FrameReader, FrameWriter},
};

const PROMPT: &str = " <- ";

pub async fn run(args: ClientArgs) -> Result<()> {
    let (mut reader, mut writer) = establish_connection(&args).await?;
    send_registration(&mut writer, &args.user).await?;

    let session = Session {
        user: args.user,
        interactive: std::io::stdin().is_terminal(),
    };
    let mut stdin = operator_lines(tokio::io::stdin());

    session.prompt().await?;
    run_client_loop(&session, &mut reader, &mut writer, &mut stdin).await?;
    shutdown_connection(&mut writer).await;

    Ok(())
}

struct Session {
    user: String,
    interactive: bool,
}

impl Session {
    async fn prompt(&self) -> io::Result<()> {
        if !self.interactive {
            return Ok(());
        }
        let mut stdout = tokio::io::stdout();
        stdout.write_all(PROMPT.as_bytes()).await?;
        stdout.flush().await
    }
}

/// Line source for operator input. `next_line` is cancel safe, so a server
/// frame arriving mid-line leaves the partial line buffered.
fn operator_lines<R: AsyncRead>(input: R) -> Lines<BufReader<R>> {
    BufReader::new(input).lines()
}

async fn establish_connection(args: &ClientArgs) -> Result<(FrameReader, FrameWriter)> {
    let connection = transport::connect(&args.server, args.server_port)
        .await
        .with_context(|| format!("failed to connect to {}:{}", args.server, args.server_port))?;

    info!("connected to {}:{}", args.server, args.server_port);
    Ok(connection)
}

async fn send_registration(writer: &mut FrameWriter, user: &str) -> Result<()> {
    send_envelope(writer, &Envelope::register(user)).await
}

async fn send_envelope(writer: &mut FrameWriter, envelope: &Envelope) -> Result<()> {
    writer
        .send(codec::encode(envelope))
        .await
        .with_context(|| format!("failed to send {}", envelope.command()))
}

async fn run_client_loop(
    session: &Session,
    reader: &mut FrameReader,
    writer: &mut FrameWriter,
    stdin: &mut Lines<BufReader<tokio::io::Stdin>>,
) -> Result<()> {
    loop {
        select! {
            server_frame = reader.next() => {
                if !handle_server_frame(server_frame, session).await? {
                    break;
                }
            }
            line = stdin.next_line() => {
                if !handle_stdin_input(line, session, writer).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                break;
            }
        }
    }
    Ok(())
}

async fn handle_server_frame(
    frame: Option<Result<Frame, FrameError>>,
    session: &Session,
) -> Result<bool> {
    let frame = match frame {
        Some(Ok(frame)) => frame,
        Some(Err(err)) => return Err(err).context("lost framing with the server"),
        None => {
            write_stdout("*** server closed the connection").await?;
            return Ok(false);
        }
    };

    match codec::decode(&frame) {
        Ok(envelope) => match render_envelope(&envelope) {
            Some(line) => {
                write_stdout(&line).await?;
                session.prompt().await?;
            }
            None => {
                warn!(command = %envelope.command(), "ignoring client-only envelope from server");
            }
        },
        Err(err) => warn!(error = %err, "skipping undecodable frame from server"),
    }
    Ok(true)
}

async fn handle_stdin_input(
    line: io::Result<Option<String>>,
    session: &Session,
    writer: &mut FrameWriter,
) -> Result<bool> {
    let Some(line) = line.context("failed to read operator input")? else {
        return Ok(false);
    };

    let envelope = match OperatorCommand::parse(&line) {
        Ok(Some(command)) => to_envelope(command, &session.user),
        Ok(None) => {
            session.prompt().await?;
            return Ok(true);
        }
        Err(err) => {
            write_stderr(&format!("!!! {err}; {USAGE}")).await?;
            session.prompt().await?;
            return Ok(true);
        }
    };

    submit(writer, &envelope).await?;
    session.prompt().await?;
    Ok(true)
}

/// Sends an operator envelope. A frame over the framing limits is reported
/// and skipped; only a broken connection ends the session.
async fn submit(writer: &mut FrameWriter, envelope: &Envelope) -> Result<()> {
    match writer.send(codec::encode(envelope)).await {
        Ok(()) => Ok(()),
        Err(FrameError::Io(err)) => {
            Err(err).with_context(|| format!("failed to send {}", envelope.command()))
        }
        Err(err) => {
            write_stderr(&format!("!!! {} not sent: {err}", envelope.command())).await?;
            Ok(())
        }
    }
}

/// Translates an operator command into the envelope sent to the relay.
pub fn to_envelope(command: OperatorCommand, user: &str) -> Envelope {
    match command {
        OperatorCommand::List => Envelope::List,
        OperatorCommand::Register => Envelope::register(user),
        OperatorCommand::Send {
            destination,
            message,
        } => Envelope::send(destination, message),
    }
}

/// Terminal line for an envelope arriving from the relay, or `None` for
/// shapes a relay never sends.
pub fn render_envelope(envelope: &Envelope) -> Option<String> {
    match envelope {
        Envelope::ListReply { names } => {
            Some(format!("  - Currently logged on: {}", names.join(", ")))
        }
        Envelope::Msg { payload } => Some(format!("  > {}", String::from_utf8_lossy(payload))),
        Envelope::RegisterAck { text } => Some(format!(" <o> {text}")),
        Envelope::Err { text } => Some(format!(" <!> {text}")),
        Envelope::Register { .. } | Envelope::List | Envelope::Send { .. } => None,
    }
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn shutdown_connection(writer: &mut FrameWriter) {
    if let Err(error) = writer.get_mut().shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}
