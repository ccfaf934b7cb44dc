//! Execution tracing for the stepwise evaluator.
//!
//! A trait-based hook system in the spirit of the resource tracker: the
//! default [`NoopTracer`] compiles away, [`StderrTracer`] gives a
//! human-readable step log, and [`RecordingTracer`] captures a full event
//! list for assertions or post-mortem inspection.

use crate::ast::Span;

/// Trace event emitted during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A frame was dispatched.
    Step {
        /// Static name of the frame kind (e.g. `"Binary"`, `"Call"`).
        kind: &'static str,
        /// Source span of the node, `None` for polyfill nodes.
        span: Option<Span>,
    },
    /// A function call pushed a body frame.
    Call { depth: usize },
    /// A call completed and its frame was popped.
    Return { depth: usize },
    /// An interpreter-level throw started unwinding.
    Throw { message: String },
    /// Execution paused for an asynchronous native call.
    Pause,
}

/// Hook points invoked by the driver at key execution events.
///
/// All methods default to no-ops so implementations only override what they
/// need.
pub trait StepTracer {
    fn on_step(&mut self, kind: &'static str, span: Option<Span>) {
        let _ = (kind, span);
    }

    fn on_call(&mut self, depth: usize) {
        let _ = depth;
    }

    fn on_return(&mut self, depth: usize) {
        let _ = depth;
    }

    fn on_throw(&mut self, message: &str) {
        let _ = message;
    }

    fn on_pause(&mut self) {}
}

/// Zero-cost no-op tracer, the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl StepTracer for NoopTracer {}

/// Tracer that writes a line per event to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrTracer;

impl StepTracer for StderrTracer {
    fn on_step(&mut self, kind: &'static str, span: Option<Span>) {
        match span {
            Some(span) => eprintln!("step {kind} @ {}..{}", span.start, span.end),
            None => eprintln!("step {kind} (polyfill)"),
        }
    }

    fn on_call(&mut self, depth: usize) {
        eprintln!("call depth={depth}");
    }

    fn on_return(&mut self, depth: usize) {
        eprintln!("return depth={depth}");
    }

    fn on_throw(&mut self, message: &str) {
        eprintln!("throw {message}");
    }

    fn on_pause(&mut self) {
        eprintln!("pause (async native in flight)");
    }
}

/// Tracer that records every event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.events)
    }
}

impl StepTracer for RecordingTracer {
    fn on_step(&mut self, kind: &'static str, span: Option<Span>) {
        self.events.push(TraceEvent::Step { kind, span });
    }

    fn on_call(&mut self, depth: usize) {
        self.events.push(TraceEvent::Call { depth });
    }

    fn on_return(&mut self, depth: usize) {
        self.events.push(TraceEvent::Return { depth });
    }

    fn on_throw(&mut self, message: &str) {
        self.events.push(TraceEvent::Throw {
            message: message.to_owned(),
        });
    }

    fn on_pause(&mut self) {
        self.events.push(TraceEvent::Pause);
    }
}
