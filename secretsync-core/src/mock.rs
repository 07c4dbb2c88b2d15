// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Mock Transport
//!
//! Scripted implementation of [`HttpTransport`] for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

#[derive(Debug, Default)]
struct MockState {
    /// Outcomes returned by successive get() calls.
    script: VecDeque<Result<HttpResponse, TransportError>>,
    /// Requests that have been issued.
    requests: Vec<HttpRequest>,
}

/// Mock transport for testing.
///
/// Clones share state, so a test can keep one handle while the agent owns
/// another.
///
/// # Example
///
/// ```
/// use secretsync_core::{HttpRequest, HttpResponse, HttpTransport, MockTransport};
///
/// let transport = MockTransport::new();
/// transport.respond(HttpResponse::new(304));
///
/// let response = transport.get(&HttpRequest::get("https://server/config")).unwrap();
/// assert_eq!(response.status, 304);
/// assert_eq!(transport.requests().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for the next get() call.
    pub fn respond(&self, response: HttpResponse) {
        self.lock().script.push_back(Ok(response));
    }

    /// Queues an error for the next get() call.
    pub fn fail(&self, error: TransportError) {
        self.lock().script.push_back(Err(error));
    }

    /// Returns all requests issued so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().requests.clone()
    }

    /// Number of scripted outcomes not yet consumed.
    pub fn pending(&self) -> usize {
        self.lock().script.len()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl HttpTransport for MockTransport {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut state = self.lock();
        state.requests.push(request.clone());
        state.script.pop_front().unwrap_or_else(|| {
            Err(TransportError::Request {
                url: request.url.clone(),
                message: "no scripted response".to_string(),
            })
        })
    }
}
