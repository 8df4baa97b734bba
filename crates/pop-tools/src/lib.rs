//! Tooling primitives for inspecting the goal engine.
//!
//! The engine emits small trace events at its interesting transitions (preemption, budget
//! resets, completions). Tests and debug tooling install a [`TraceLog`] or a [`TraceSink`] on
//! the blackboard to observe them; with neither installed, emitting is a no-op.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod trace;

pub use trace::{
    emit, install_log, take_log, NullTraceSink, TraceEvent, TraceLog, TraceSink, VecTraceSink,
    TRACE_LOG, TRACE_SINK,
};
