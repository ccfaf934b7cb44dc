#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_wrap, reason = "bit operations mirror ECMAScript ToInt32")]
#![expect(clippy::float_cmp, reason = "ECMAScript equality requires exact float comparison")]
#![expect(clippy::unnecessary_wraps, reason = "native dispatch signatures are uniform")]
#![expect(clippy::needless_pass_by_value, reason = "call APIs pass values consistently")]

mod ast;
mod builtins;
mod error;
mod frame;
mod heap;
mod host;
mod interp;
mod machine;
mod parse;
mod resource;
mod scope;
mod tracer;
mod value;

pub use crate::{
    ast::Span,
    error::{CodeLoc, ErrorKind, Exception},
    heap::ObjId,
    host::{AsyncHandle, HostValue},
    interp::Interpreter,
    resource::{LimitedTracker, NoLimitTracker, ResourceError, ResourceTracker},
    tracer::{NoopTracer, RecordingTracer, StderrTracer, StepTracer, TraceEvent},
    value::Value,
};
