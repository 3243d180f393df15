// Captured program output and the result record of a run

use crate::ast::SourceLocation;
use crate::interpreter::errors::CeskError;
use crate::interpreter::state::ThreadId;

/// Output buffer standing in for the program's stdout
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    pub chunks: Vec<OutputChunk>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        OutputBuffer { chunks: Vec::new() }
    }

    /// Append text printed by `tid`; consecutive prints from the same thread
    /// and source line are merged
    pub fn print(&mut self, text: String, tid: ThreadId, location: SourceLocation) {
        if let Some(last) = self.chunks.last_mut() {
            if last.tid == tid && last.location.line == location.line {
                last.text.push_str(&text);
                return;
            }
        }
        self.chunks.push(OutputChunk {
            text,
            tid,
            location,
        });
    }

    /// Everything printed so far, in scheduling order
    pub fn contents(&self) -> String {
        self.chunks.iter().map(|chunk| chunk.text.as_str()).collect()
    }

    /// Text printed by one thread
    pub fn thread_output(&self, tid: ThreadId) -> String {
        self.chunks
            .iter()
            .filter(|chunk| chunk.tid == tid)
            .map(|chunk| chunk.text.as_str())
            .collect()
    }
}

/// A run of output from one thread
#[derive(Debug, Clone)]
pub struct OutputChunk {
    pub text: String,
    pub tid: ThreadId,
    pub location: SourceLocation,
}

/// Result record of one machine run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub output: String,
    /// False once a memory fault was detected
    pub memory_safe: bool,
    /// The fault that stopped the run, if any
    pub fault: Option<CeskError>,
    /// Value `main` returned, as displayed by the active interpretation
    pub return_value: Option<String>,
    pub states_generated: u64,
    pub states_matched: u64,
    pub states_evaluated: u64,
}

impl RunReport {
    /// Process status for the driver: 0 when the run finished cleanly
    pub fn exit_code(&self) -> i32 {
        self.fault.as_ref().map_or(0, CeskError::exit_code)
    }
}
