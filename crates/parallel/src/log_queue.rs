//! Log records from tile workers
//!
//! Workers never write to the subscriber themselves; they push records on a
//! shared channel and one consumer thread emits them through `tracing`.
//! Events raised by library code while a job runs are captured by
//! [`SinkLayer`] and queued the same way. Records of one worker keep their
//! order, records of different workers interleave arbitrarily.

use crossbeam_channel::{unbounded, Receiver, Sender};
use metgrid_core::{Error, Result};
use serde::Serialize;
use std::fmt::{self, Write as _};
use std::thread::{self, JoinHandle};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// Severity of a [`LogRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One message from a worker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    /// Pool thread index, `None` outside the pool
    pub worker: Option<usize>,
    pub job: String,
    pub level: LogLevel,
    pub message: String,
}

/// Shared record channel plus its consumer thread.
pub struct LogQueue {
    sender: Sender<LogRecord>,
    consumer: JoinHandle<usize>,
}

impl LogQueue {
    /// Spawn the consumer thread.
    pub fn start() -> Result<Self> {
        let (sender, receiver) = unbounded();
        let consumer = thread::Builder::new()
            .name("metgrid-log".into())
            .spawn(move || drain(receiver))?;
        Ok(Self { sender, consumer })
    }

    /// Producer handle tagged with a job id
    pub fn sink(&self, job: impl Into<String>) -> LogSink {
        LogSink {
            sender: self.sender.clone(),
            job: job.into(),
        }
    }

    /// Close the queue once every sink is dropped and wait for the consumer.
    ///
    /// Returns the number of records emitted.
    pub fn finish(self) -> Result<usize> {
        let LogQueue { sender, consumer } = self;
        drop(sender);
        consumer
            .join()
            .map_err(|_| Error::Other("log consumer thread panicked".into()))
    }
}

fn drain(receiver: Receiver<LogRecord>) -> usize {
    let mut n = 0;
    for record in receiver.iter() {
        emit(&record);
        n += 1;
    }
    n
}

fn emit(r: &LogRecord) {
    match r.level {
        LogLevel::Debug => tracing::debug!(worker = ?r.worker, job = %r.job, "{}", r.message),
        LogLevel::Info => tracing::info!(worker = ?r.worker, job = %r.job, "{}", r.message),
        LogLevel::Warn => tracing::warn!(worker = ?r.worker, job = %r.job, "{}", r.message),
        LogLevel::Error => tracing::error!(worker = ?r.worker, job = %r.job, "{}", r.message),
    }
}

/// Producer side of the queue, one per running job.
#[derive(Debug, Clone)]
pub struct LogSink {
    sender: Sender<LogRecord>,
    job: String,
}

impl LogSink {
    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let record = LogRecord {
            worker: rayon::current_thread_index(),
            job: self.job.clone(),
            level,
            message: message.into(),
        };
        // Only fails once the consumer is gone, at which point nobody listens
        let _ = self.sender.send(record);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    /// Run `f` with every `tracing` event on this thread routed to the queue.
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::registry().with(SinkLayer::new(self.clone()));
        tracing::subscriber::with_default(subscriber, f)
    }
}

impl From<&Level> for LogLevel {
    fn from(level: &Level) -> Self {
        match *level {
            Level::ERROR => LogLevel::Error,
            Level::WARN => LogLevel::Warn,
            Level::INFO => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

/// Layer turning `tracing` events into [`LogRecord`]s on a sink
pub struct SinkLayer {
    sink: LogSink,
}

impl SinkLayer {
    pub fn new(sink: LogSink) -> Self {
        Self { sink }
    }
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.sink
            .log(LogLevel::from(event.metadata().level()), visitor.finish());
    }
}

/// `message` first, other fields appended as `name=value`
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.record_debug(field, &value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            if !self.fields.is_empty() {
                self.fields.push(' ');
            }
            let _ = write!(self.fields, "{}={:?}", field.name(), value);
        }
    }
}
