//! Connection multiplexer
//!
//! One task owns the socket. Callers enqueue commands on an unbounded FIFO
//! and await a oneshot result. RIO responses carry no request identifier, so
//! the task writes a single command, then consumes lines in arrival order
//! until the `S` or `E` line that completes it. Only then is the next command
//! taken from the queue. Lines that arrive while no command is active are
//! unsolicited pushes and only update the cache.

use crate::cache::SharedCache;
use crate::error::{Result, RioError};
use crate::protocol::{decode_line, Response, COMMAND_TERMINATOR};
use crate::types::ConnectionState;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;

/// A queued command and the slot its result is delivered to
struct PendingCommand {
    line: String,
    reply: oneshot::Sender<Result<Option<String>>>,
}

/// Cloneable handle for enqueueing commands on a connection
#[derive(Clone)]
pub(crate) struct CommandSender {
    tx: mpsc::UnboundedSender<PendingCommand>,
}

impl CommandSender {
    /// Queue a command and wait for the device's answer
    ///
    /// Resolves to the value carried by the `S` line, or `None` when the
    /// success line has no variable payload.
    pub(crate) async fn send(&self, line: String) -> Result<Option<String>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PendingCommand { line, reply })
            .map_err(|_| RioError::ConnectionClosed)?;

        rx.await.map_err(|_| RioError::ConnectionClosed)?
    }
}

/// A running connection: the I/O task plus the means to feed and stop it
pub(crate) struct Connection {
    commands: CommandSender,
    cancel: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl Connection {
    /// Open a TCP connection and start the I/O task
    pub(crate) async fn open(
        address: &str,
        connect_timeout: Duration,
        response_timeout: Duration,
        cache: SharedCache,
        state: Arc<watch::Sender<ConnectionState>>,
    ) -> Result<Self> {
        tracing::info!("Connecting to {}", address);

        let stream = timeout(connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| RioError::ConnectTimeout)??;
        stream.set_nodelay(true)?;

        tracing::info!("Connected to {}", address);
        Ok(Self::spawn(stream, cache, response_timeout, state))
    }

    /// Start the I/O task over an already open stream
    ///
    /// The task sets `state` to `Closed` when it exits, whatever the reason.
    pub(crate) fn spawn<S>(
        stream: S,
        cache: SharedCache,
        response_timeout: Duration,
        state: Arc<watch::Sender<ConnectionState>>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let (read, write) = tokio::io::split(stream);
        let io = IoLoop {
            lines: BufReader::new(read).lines(),
            writer: write,
            commands: rx,
            cache,
            response_timeout,
            cancel: cancel.clone(),
        };

        let task = tokio::spawn(async move {
            let result = io.run().await;
            state.send_replace(ConnectionState::Closed);
            result
        });

        Self {
            commands: CommandSender { tx },
            cancel,
            task,
        }
    }

    pub(crate) fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    /// Whether the I/O task has exited
    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the I/O task and wait for it to unwind
    ///
    /// Returns the error that ended the task if it failed before it was
    /// asked to stop.
    pub(crate) async fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("IO task panicked or was aborted: {}", e);
                Err(RioError::ConnectionClosed)
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// How the wait for a command's response ended
enum Completion {
    Done(Result<Option<String>>),
    Cancelled,
}

struct IoLoop<S> {
    lines: Lines<BufReader<ReadHalf<S>>>,
    writer: WriteHalf<S>,
    commands: mpsc::UnboundedReceiver<PendingCommand>,
    cache: SharedCache,
    response_timeout: Duration,
    cancel: CancellationToken,
}

impl<S: AsyncRead + AsyncWrite> IoLoop<S> {
    async fn run(mut self) -> Result<()> {
        tracing::debug!("Starting IO loop");

        let result = self.serve().await;
        match &result {
            Ok(()) => tracing::debug!("IO loop exited"),
            Err(e) => tracing::error!("IO loop terminated: {}", e),
        }

        self.fail_queued();
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!("Socket shutdown failed: {}", e);
        }
        result
    }

    async fn serve(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    tracing::debug!("IO loop cancelled");
                    return Ok(());
                }

                // Commands go first, buffered pushes are drained while the
                // command waits for its response
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.dispatch(command).await?,
                        // Every sender is gone, nobody can issue commands any more
                        None => return Ok(()),
                    }
                }

                line = self.lines.next_line() => {
                    match line? {
                        Some(line) => self.handle_unsolicited(&line),
                        None => return Err(RioError::ConnectionClosed),
                    }
                }
            }
        }
    }

    /// A line that arrived while no command was active
    fn handle_unsolicited(&self, line: &str) {
        tracing::debug!("Received: {}", line);

        let Some(response) = decode_line(line) else {
            return;
        };
        match (&response, response.update()) {
            (_, Some(update)) => self.cache.record_update(update),
            (Response::Error(message), None) => {
                tracing::warn!("Discarding error response with no active command: {}", message)
            }
            (Response::Success(_), None) => {
                tracing::warn!("Discarding success response with no active command: {}", line)
            }
            (Response::Notification { .. }, None) => {}
        }
    }

    /// Write one command and wait for the line that completes it
    async fn dispatch(&mut self, command: PendingCommand) -> Result<()> {
        let PendingCommand { line, reply } = command;

        tracing::debug!("Sending: {}", line);
        if let Err(e) = self.write_command(&line).await {
            let _ = reply.send(Err(RioError::ConnectionClosed));
            return Err(e.into());
        }

        match self.await_response(&line).await {
            Ok(Completion::Done(result)) => {
                let _ = reply.send(result);
                Ok(())
            }
            Ok(Completion::Cancelled) => {
                let _ = reply.send(Err(RioError::ConnectionClosed));
                Ok(())
            }
            Err(e) => {
                let caller_error = match &e {
                    RioError::ProtocolDesync(message) => RioError::ProtocolDesync(message.clone()),
                    _ => RioError::ConnectionClosed,
                };
                let _ = reply.send(Err(caller_error));
                Err(e)
            }
        }
    }

    async fn write_command(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(COMMAND_TERMINATOR.as_bytes()).await?;
        self.writer.flush().await
    }

    /// Consume lines until the active command is answered
    ///
    /// Notifications that arrive in between go to the cache. The deadline
    /// covers the whole wait, so a steady stream of notifications cannot
    /// keep a lost response pending forever.
    async fn await_response(&mut self, command: &str) -> Result<Completion> {
        let deadline = Instant::now() + self.response_timeout;

        loop {
            let line = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Ok(Completion::Cancelled),

                _ = sleep_until(deadline) => {
                    return Err(RioError::ProtocolDesync(format!(
                        "no response to {:?} within {:?}",
                        command, self.response_timeout
                    )));
                }

                line = self.lines.next_line() => line?.ok_or(RioError::ConnectionClosed)?,
            };
            tracing::debug!("Received: {}", line);

            let Some(response) = decode_line(&line) else {
                continue;
            };
            if let Some(update) = response.update() {
                self.cache.record_update(update);
            }
            match response {
                Response::Success(update) => {
                    return Ok(Completion::Done(Ok(update.map(|u| u.value))));
                }
                Response::Error(message) => {
                    tracing::error!("Device responded with error: {}", message);
                    return Ok(Completion::Done(Err(RioError::Command(message))));
                }
                Response::Notification { .. } => {}
            }
        }
    }

    /// Fail everything still queued so no caller waits forever
    fn fail_queued(&mut self) {
        self.commands.close();

        let mut abandoned = 0;
        while let Ok(PendingCommand { line, reply }) = self.commands.try_recv() {
            tracing::debug!("Abandoning queued command: {}", line);
            let _ = reply.send(Err(RioError::ConnectionClosed));
            abandoned += 1;
        }
        if abandoned > 0 {
            tracing::warn!("Failed {} queued command(s) on shutdown", abandoned);
        }
    }
}
