//! Output router: turns the worker's two output pipes into [`Event`]s.
//!
//! Each pipe gets its own reader task. Readers push events into one
//! bounded queue, and a single dispatcher task drains it into the
//! [`Notifier`], so notifications are never delivered concurrently.
//!
//! A stdout line beginning with [`RESULT_MARKER`] carries the password.
//! The line itself is still logged; the first such line also records the
//! result on the run and produces a [`Event::ResultFound`] right after it.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::SupervisorConfig;
use crate::notify::{Channel, Event, Notifier};
use crate::run::RunHandle;
use crate::worker::OutputPipe;

/// Prefix of the result line on stdout.
pub const RESULT_MARKER: &str = "FOUND:";

/// Capacity of the event queue between readers and the dispatcher.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// What a single output line means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// Whitespace only; dropped.
    Blank,
    Log(&'a str),
    /// A result marker line and the password it carries.
    Result { line: &'a str, password: &'a str },
}

/// Classify one line read from `channel`.
///
/// Markers are only honoured on stdout, and a marker with nothing after it
/// is treated as an ordinary log line.
pub fn classify_line(channel: Channel, line: &str) -> LineKind<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if channel == Channel::Stdout {
        if let Some(rest) = trimmed.strip_prefix(RESULT_MARKER) {
            let password = rest.trim();
            if !password.is_empty() {
                return LineKind::Result {
                    line: trimmed,
                    password,
                };
            }
        }
    }
    LineKind::Log(trimmed)
}

/// Events produced by one line, recording a first result on `run`.
pub fn route_line(channel: Channel, line: &str, run: &RunHandle) -> Vec<Event> {
    match classify_line(channel, line) {
        LineKind::Blank => Vec::new(),
        LineKind::Log(text) => vec![Event::LogLine {
            channel,
            text: text.to_string(),
        }],
        LineKind::Result { line, password } => {
            let mut events = vec![Event::LogLine {
                channel,
                text: line.to_string(),
            }];
            if run.record_result(password) {
                events.push(Event::ResultFound {
                    password: password.to_string(),
                });
            } else {
                debug!(run_id = %run.id(), "ignoring additional result marker");
            }
            events
        }
    }
}

/// Newline-delimited lines of `reader`, decoded lossily.
///
/// Invalid UTF-8 is replaced rather than ending the stream; a read error
/// is yielded once and ends it.
pub fn decoded_lines<R>(reader: R) -> impl Stream<Item = std::io::Result<String>> + Send
where
    R: AsyncRead + Send + Unpin,
{
    async_stream::try_stream! {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf).await?;
            if n == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            yield line.trim_end_matches(['\n', '\r']).to_string();
        }
    }
}

/// Read `pipe` until EOF, forwarding routed events to `tx`.
pub fn spawn_reader(
    pipe: OutputPipe,
    channel: Channel,
    run: Arc<RunHandle>,
    tx: mpsc::Sender<Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let lines = decoded_lines(pipe);
        futures::pin_mut!(lines);
        while let Some(next) = lines.next().await {
            match next {
                Ok(line) => {
                    for event in route_line(channel, &line, &run) {
                        if tx.send(event).await.is_err() {
                            debug!(run_id = %run.id(), %channel, "event queue closed");
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(run_id = %run.id(), %channel, error = %e, "error reading worker output");
                    break;
                }
            }
        }
        debug!(run_id = %run.id(), %channel, "output channel closed");
    })
}

/// Deliver queued events to `notifier`, one at a time, until every sender
/// is gone.
pub fn spawn_dispatcher(
    mut rx: mpsc::Receiver<Event>,
    notifier: Arc<dyn Notifier>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            notifier.on_event(event);
        }
    })
}

/// The reader and dispatcher tasks of one run.
#[derive(Debug)]
pub struct OutputRouter {
    stdout: JoinHandle<()>,
    stderr: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl OutputRouter {
    pub fn start(
        run: &Arc<RunHandle>,
        stdout: OutputPipe,
        stderr: OutputPipe,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let stdout = spawn_reader(stdout, Channel::Stdout, Arc::clone(run), tx.clone());
        let stderr = spawn_reader(stderr, Channel::Stderr, Arc::clone(run), tx);
        let dispatcher = spawn_dispatcher(rx, notifier);
        Self {
            stdout,
            stderr,
            dispatcher,
        }
    }

    /// Wait for both readers, then for the queue to drain.
    ///
    /// Every wait is bounded. A task that overruns its bound is aborted, and
    /// the abort is awaited so a notifier call in flight has returned before
    /// this does.
    pub async fn finish(self, config: &SupervisorConfig) {
        join_bounded(self.stdout, config.reader_join_timeout, "stdout reader").await;
        join_bounded(self.stderr, config.reader_join_timeout, "stderr reader").await;
        join_bounded(self.dispatcher, config.dispatch_drain_timeout, "event dispatcher").await;
    }
}

async fn join_bounded(mut task: JoinHandle<()>, limit: Duration, what: &str) {
    match tokio::time::timeout(limit, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(task = what, error = %e, "router task failed"),
        Err(_) => {
            warn!(task = what, timeout_ms = limit.as_millis() as u64, "router task did not finish in time; aborting");
            task.abort();
            // Abort lands at the task's next await; until then it may still
            // be inside `Notifier::on_event`.
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::job::{JobDescriptor, SearchOrder};
    use crate::outcome::Outcome;

    fn run() -> (tempfile::TempDir, Arc<RunHandle>) {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("a.rar");
        std::fs::write(&archive, b"rar").unwrap();
        let job = JobDescriptor::lengths("ab", 1, 2, &archive, SearchOrder::Ascending).unwrap();
        (tmp, Arc::new(RunHandle::new(job)))
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
    }

    impl Notifier for Recorder {
        fn on_event(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }

        fn on_outcome(&self, _outcome: Outcome) {}
    }

    /// Blocks inside every `on_event` and tracks whether a call is in flight.
    #[derive(Default)]
    struct SlowRecorder {
        busy: AtomicBool,
        delivered: AtomicUsize,
    }

    impl Notifier for SlowRecorder {
        fn on_event(&self, _event: Event) {
            self.busy.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(300));
            self.delivered.fetch_add(1, Ordering::SeqCst);
            self.busy.store(false, Ordering::SeqCst);
        }

        fn on_outcome(&self, _outcome: Outcome) {}
    }

    #[test]
    fn classify_marker_only_on_stdout() {
        assert_eq!(
            classify_line(Channel::Stdout, "FOUND: hunter2 \r"),
            LineKind::Result {
                line: "FOUND: hunter2",
                password: "hunter2"
            }
        );
        assert_eq!(
            classify_line(Channel::Stderr, "FOUND: hunter2"),
            LineKind::Log("FOUND: hunter2")
        );
    }

    #[test]
    fn classify_blank_and_empty_marker() {
        assert_eq!(classify_line(Channel::Stdout, "   "), LineKind::Blank);
        assert_eq!(classify_line(Channel::Stdout, "FOUND:"), LineKind::Log("FOUND:"));
        assert_eq!(
            classify_line(Channel::Stdout, "INFO: FOUND: not a marker"),
            LineKind::Log("INFO: FOUND: not a marker")
        );
    }

    #[test]
    fn route_emits_log_then_result_once() {
        let (_tmp, run) = run();
        let first = route_line(Channel::Stdout, "FOUND: abc", &run);
        assert_eq!(
            first,
            vec![
                Event::LogLine {
                    channel: Channel::Stdout,
                    text: "FOUND: abc".to_string()
                },
                Event::ResultFound {
                    password: "abc".to_string()
                },
            ]
        );

        let second = route_line(Channel::Stdout, "FOUND: xyz", &run);
        assert_eq!(second.len(), 1);
        assert_eq!(run.found_result(), Some("abc"));
    }

    #[tokio::test]
    async fn decoded_lines_handles_crlf_and_invalid_utf8() {
        let input: &[u8] = b"one\r\ntwo\n\xffbad\nlast-without-newline";
        let lines: Vec<String> = decoded_lines(input)
            .map(|l| l.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["one", "two", "\u{fffd}bad", "last-without-newline"]);
    }

    #[tokio::test]
    async fn router_delivers_every_line_before_finish_returns() {
        let (_tmp, run) = run();
        let recorder = Arc::new(Recorder::default());
        let stdout: OutputPipe = Box::new(&b"INFO: start\n\nFOUND: pw\nINFO: done\n"[..]);
        let stderr: OutputPipe = Box::new(&b"warning: slow\n"[..]);

        let router = OutputRouter::start(&run, stdout, stderr, recorder.clone());
        router.finish(&SupervisorConfig::default()).await;

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events.len(), 5);
        let stdout_events: Vec<_> = events
            .iter()
            .filter(|e| !matches!(e, Event::LogLine { channel: Channel::Stderr, .. }))
            .cloned()
            .collect();
        assert_eq!(
            stdout_events,
            vec![
                Event::LogLine {
                    channel: Channel::Stdout,
                    text: "INFO: start".to_string()
                },
                Event::LogLine {
                    channel: Channel::Stdout,
                    text: "FOUND: pw".to_string()
                },
                Event::ResultFound {
                    password: "pw".to_string()
                },
                Event::LogLine {
                    channel: Channel::Stdout,
                    text: "INFO: done".to_string()
                },
            ]
        );
        assert_eq!(run.found_result(), Some("pw"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn finish_waits_out_an_aborted_dispatcher() {
        let (_tmp, run) = run();
        let notifier = Arc::new(SlowRecorder::default());
        let stdout: OutputPipe = Box::new(&b"INFO: one\nINFO: two\nINFO: three\n"[..]);
        let stderr: OutputPipe = Box::new(&b""[..]);
        let config = SupervisorConfig {
            dispatch_drain_timeout: Duration::from_millis(50),
            ..SupervisorConfig::default()
        };

        let router = OutputRouter::start(&run, stdout, stderr, notifier.clone());
        router.finish(&config).await;

        assert!(!notifier.busy.load(Ordering::SeqCst));
        let delivered = notifier.delivered.load(Ordering::SeqCst);
        assert!(delivered < 3, "drain should have been cut short");
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(notifier.delivered.load(Ordering::SeqCst), delivered);
    }
}
