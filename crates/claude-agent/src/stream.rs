use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::process::ClaudeProcess;
use crate::types::{CompletionOptions, RuntimeEvent};
use crate::Result;

// ─── EventStream ──────────────────────────────────────────────────────────

/// An async stream of [`RuntimeEvent`]s from one Claude invocation.
///
/// Backed by a Tokio mpsc channel. A background task owns the subprocess
/// and forwards events until the terminal `Result` event or process exit.
/// Dropping `EventStream` closes the receiver; the background task then
/// fails its next send, breaks out, and kills the child. That drop path
/// is how client disconnects cancel an in-flight completion.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<Result<RuntimeEvent>>,
}

impl EventStream {
    pub(crate) fn spawn(executable: PathBuf, prompt: String, opts: CompletionOptions) -> Self {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut process = match ClaudeProcess::spawn(&executable, &prompt, &opts) {
                Ok(p) => p,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let mut got_result = false;
            loop {
                match process.next_event().await {
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                    Ok(None) => break, // EOF — process exited
                    Ok(Some(event)) => {
                        let is_terminal = matches!(event, RuntimeEvent::Result(_));
                        if is_terminal {
                            got_result = true;
                        }
                        if tx.send(Ok(event)).await.is_err() {
                            break; // Receiver dropped — cancelled
                        }
                        if is_terminal {
                            break;
                        }
                    }
                }
            }

            // A process that died without a terminal event surfaces its
            // exit status instead of silently ending the stream.
            if !got_result {
                if let Some(exit_err) = process.wait_exit_error().await {
                    let _ = tx.send(Err(exit_err)).await;
                }
            }

            process.kill().await;
        });

        EventStream { rx }
    }

    /// Wrap a raw mpsc receiver as an `EventStream`.
    ///
    /// This is the seam deterministic fakes use: tests (and any non-CLI
    /// runtime) push scripted events through the sender half.
    pub fn from_channel(rx: mpsc::Receiver<Result<RuntimeEvent>>) -> Self {
        Self { rx }
    }

    /// Convenience for fakes: a paired sender and stream.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Result<RuntimeEvent>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

impl Stream for EventStream {
    type Item = Result<RuntimeEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
