//! Mock command runner for testing
//!
//! Simulates external tools without spawning processes. Responses are queued in
//! advance and consumed in order; once the queue is empty every invocation succeeds
//! with empty output. When a response carries an output document and the invocation
//! names an `--output` file, the document is written there, the way the load
//! generator would.
//!
//! # Example
//!
//! ```
//! use zbdsweep::executor::mock::MockRunner;
//! use zbdsweep::executor::runner::{CommandRunner, Invocation};
//!
//! let runner = MockRunner::new();
//! runner.push_exit_code(2);
//!
//! let out = runner.run(&Invocation::new("fio")).unwrap();
//! assert_eq!(out.exit_code, 2);
//! assert_eq!(runner.invocations().len(), 1);
//! ```

use super::runner::{CommandOutput, CommandRunner, Invocation};
use crate::Result;
use anyhow::Context;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Canned response for one invocation
#[derive(Debug, Clone, Default)]
pub struct MockResponse {
    pub exit_code: i32,
    pub stdout: String,
    /// Written to the invocation's `--output` path
    pub output_document: Option<String>,
}

/// Recording command runner
#[derive(Clone, Default)]
pub struct MockRunner {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: MockResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn push_exit_code(&self, exit_code: i32) {
        self.push_response(MockResponse {
            exit_code,
            ..Default::default()
        });
    }

    pub fn push_stdout(&self, stdout: &str) {
        self.push_response(MockResponse {
            stdout: stdout.to_string(),
            ..Default::default()
        });
    }

    /// Successful run that leaves `document` in the `--output` file
    pub fn push_document(&self, document: &str) {
        self.push_response(MockResponse {
            output_document: Some(document.to_string()),
            ..Default::default()
        });
    }

    /// All invocations seen so far, in order
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// Program names of all invocations, in order
    pub fn programs(&self) -> Vec<String> {
        self.invocations().into_iter().map(|inv| inv.program).collect()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.invocations.lock().unwrap().push(invocation.clone());
        let response = self.responses.lock().unwrap().pop_front().unwrap_or_default();

        if let (Some(document), Some(path)) = (&response.output_document, invocation.output_path()) {
            std::fs::write(&path, document)
                .with_context(|| format!("mock: failed to write {}", path.display()))?;
        }

        Ok(CommandOutput {
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: String::new(),
        })
    }
}
