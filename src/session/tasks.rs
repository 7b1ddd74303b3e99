//! Background tasks of a running session
//!
//! Each session runs three tasks: the stderr reader, the decode-and-display
//! loop over the tapped stdout, and the exit monitor. None of them touches
//! UI state; they write to the [`LogSink`] and post [`UiEvent`]s.

use super::{RenderPolicy, SessionId};
use crate::decoder::{CodecFactory, DecoderOptions, StreamDecoder};
use crate::display::FrameMailbox;
use crate::error::StreamTapError;
use crate::subprocess::{lossy_lines, ByteTee, LogSink, ProcessHandle, ProcessSupervisor};
use crate::ui::{UiDispatcher, UiEvent};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{ChildStderr, ChildStdout};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// How long the monitor waits for trailing stderr lines after exit
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything the background tasks of one session share
#[derive(Clone)]
pub struct SessionContext {
    pub id: SessionId,
    pub supervisor: Arc<ProcessSupervisor>,
    pub log: LogSink,
    pub dispatcher: UiDispatcher,
    pub decoder_options: DecoderOptions,
    pub codec: Arc<dyn CodecFactory>,
    pub render: RenderPolicy,
    pub mailbox: Arc<FrameMailbox>,
}

pub struct SessionTasks {
    pub decode: Option<JoinHandle<()>>,
    pub monitor: JoinHandle<()>,
}

/// Start the background tasks for a freshly spawned process.
pub fn spawn_session(runtime: &Handle, ctx: SessionContext, mut handle: ProcessHandle) -> SessionTasks {
    let stderr_task = handle
        .take_stderr()
        .map(|stderr| runtime.spawn(read_stderr(stderr, ctx.log.clone())));

    let decode = match handle.take_stdout() {
        Some(stdout) => Some(runtime.spawn(decode_and_display(stdout, ctx.clone()))),
        None => {
            ctx.log.append("Backend stdout is not available; no video");
            ctx.dispatcher.post(UiEvent::DecodeFinished(ctx.id));
            None
        }
    };

    let monitor = runtime.spawn(monitor_exit(handle, stderr_task, ctx));
    SessionTasks { decode, monitor }
}

pub async fn read_stderr(stderr: ChildStderr, log: LogSink) {
    let mut lines = lossy_lines(stderr);
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => log.append(format!("ERR: {}", line)),
            Err(e) => {
                tracing::debug!("Backend stderr closed: {}", e);
                break;
            }
        }
    }
}

pub async fn decode_and_display(stdout: ChildStdout, ctx: SessionContext) {
    let source = ByteTee::new(stdout, ctx.log.clone());
    let mut decoder = match StreamDecoder::open(
        source,
        &ctx.decoder_options,
        ctx.codec.as_ref(),
        ctx.log.clone(),
    )
    .await
    {
        Ok(decoder) => decoder,
        Err(e) => {
            ctx.log.append(format!("Failed to open video stream: {}", e));
            let err = StreamTapError::from(e);
            tracing::warn!("{}: video stream unusable: {} ({})", ctx.id, err, err.describe());
            ctx.dispatcher.post(UiEvent::DecodeFinished(ctx.id));
            return;
        }
    };

    while let Some(frame) = decoder.next_frame().await {
        let delivered = match ctx.render {
            RenderPolicy::LatestOnly => {
                // An occupied slot already has a wakeup queued
                !ctx.mailbox.put(frame) || ctx.dispatcher.post(UiEvent::FrameReady(ctx.id))
            }
            RenderPolicy::Paced(delay) => {
                let posted = ctx.dispatcher.post(UiEvent::Frame(ctx.id, frame));
                tokio::time::sleep(delay).await;
                posted
            }
        };
        if !delivered {
            tracing::debug!("{}: UI gone, stopping decode", ctx.id);
            break;
        }
    }

    tracing::debug!(
        "{}: decode finished after {} frames ({} dropped by the mailbox)",
        ctx.id,
        decoder.frames_delivered(),
        ctx.mailbox.replaced_count()
    );
    ctx.dispatcher.post(UiEvent::DecodeFinished(ctx.id));
}

pub async fn monitor_exit(
    handle: ProcessHandle,
    stderr_task: Option<JoinHandle<()>>,
    ctx: SessionContext,
) {
    let result = ctx.supervisor.monitor_exit(handle).await;

    // Let the last diagnostics land before the exit line
    if let Some(stderr_task) = stderr_task {
        if tokio::time::timeout(STDERR_DRAIN_TIMEOUT, stderr_task)
            .await
            .is_err()
        {
            tracing::debug!("{}: stderr still open after exit", ctx.id);
        }
    }

    let code = match result {
        Ok(code) => {
            ctx.log
                .append(format!("Process exited with return code {}", code.code()));
            Some(code)
        }
        Err(e) => {
            ctx.log.append(format!("Failed to collect process exit: {}", e));
            let err = StreamTapError::from(e);
            tracing::error!("{}: {}", ctx.id, err);
            None
        }
    };
    ctx.dispatcher.post(UiEvent::SessionEnded(ctx.id, code));
}
