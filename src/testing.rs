//! In-process fakes shared by unit tests.

use crate::backend::{ExtractionBackend, TransportError};
use crate::extraction::types::{
    ExtractionError, ExtractionOptions, ExtractionResult, LoadedDocument, TaskHandle, TaskStatus,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Map;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Submission observed by [`ScriptedBackend`].
#[derive(Debug, Clone)]
pub(crate) struct SubmitCall {
    pub(crate) file_name: String,
    pub(crate) options: ExtractionOptions,
}

/// Backend whose status answers follow a script, then repeat a fallback status.
pub(crate) struct ScriptedBackend {
    script: Mutex<VecDeque<Result<TaskStatus, ExtractionError>>>,
    fallback: Option<TaskStatus>,
    submits: Mutex<Vec<SubmitCall>>,
    status_queries: AtomicUsize,
    clears: AtomicUsize,
    reject_submit: AtomicBool,
    reject_clear: AtomicBool,
}

impl ScriptedBackend {
    pub(crate) fn with_script(script: Vec<Result<TaskStatus, ExtractionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            submits: Mutex::new(Vec::new()),
            status_queries: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
            reject_submit: AtomicBool::new(false),
            reject_clear: AtomicBool::new(false),
        }
    }

    /// Report `status` for every query.
    pub(crate) fn always(status: TaskStatus) -> Self {
        let mut backend = Self::with_script(Vec::new());
        backend.fallback = Some(status);
        backend
    }

    /// Report `Processing` `pending` times, then complete every task with `content`.
    pub(crate) fn completing_after(pending: usize, content: &str) -> Self {
        let mut script: Vec<Result<TaskStatus, ExtractionError>> =
            (0..pending).map(|_| Ok(TaskStatus::Processing)).collect();
        script.push(Ok(TaskStatus::Completed(result(content))));
        let mut backend = Self::with_script(script);
        backend.fallback = Some(TaskStatus::Completed(result(content)));
        backend
    }

    pub(crate) fn reject_submissions(&self) {
        self.reject_submit.store(true, Ordering::SeqCst);
    }

    pub(crate) fn reject_clears(&self) {
        self.reject_clear.store(true, Ordering::SeqCst);
    }

    pub(crate) fn status_queries(&self) -> usize {
        self.status_queries.load(Ordering::SeqCst)
    }

    pub(crate) fn submissions(&self) -> Vec<SubmitCall> {
        self.submits.lock().expect("submits lock").clone()
    }

    pub(crate) fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    /// Total backend round trips of any kind.
    pub(crate) fn network_calls(&self) -> usize {
        self.submissions().len() + self.status_queries() + self.clears()
    }
}

#[async_trait]
impl ExtractionBackend for ScriptedBackend {
    async fn submit(
        &self,
        document: &LoadedDocument,
        options: &ExtractionOptions,
    ) -> Result<TaskHandle, ExtractionError> {
        if self.reject_submit.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut submits = self.submits.lock().expect("submits lock");
        submits.push(SubmitCall {
            file_name: document.file_name.clone(),
            options: *options,
        });
        Ok(TaskHandle::new(format!("task-{}", submits.len())))
    }

    async fn query_status(&self, _handle: &TaskHandle) -> Result<TaskStatus, ExtractionError> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().expect("script lock").pop_front();
        match (next, &self.fallback) {
            (Some(answer), _) => answer,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(ExtractionError::Protocol("script exhausted".into())),
        }
    }

    async fn clear_cache(&self) -> Result<(), ExtractionError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        if self.reject_clear.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

fn unavailable() -> ExtractionError {
    ExtractionError::Transport(TransportError::UnexpectedStatus {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: "backend unavailable".into(),
    })
}

pub(crate) fn result(content: &str) -> ExtractionResult {
    ExtractionResult {
        content: content.to_string(),
        metadata: Map::new(),
    }
}
