//! An in-process stand-in for the university portal.
//!
//! The bot talks to it through a [`RetryTransport`], exactly as it would talk
//! to the real thing over HTTP:
//!
//! - password `hunter2` logs in any user;
//! - logins starting with `flaky` get two `502`s before succeeding;
//! - login `down` always gets `503`;
//! - anything else gets `403`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use brass::transport::{
    CallRequest, CallResponse, RetryTransport, RoundTrip, TransportError, TransportResult,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const GRADES_URL: &str = "https://portal.example.edu/api/grades";

pub const VALID_PASSWORD: &str = "hunter2";

/// Shared client handed to handlers.
pub type Portal = Arc<RetryTransport<FakePortal>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub name: String,
    pub grade: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Semester {
    pub id: u32,
    pub name: String,
    pub courses: Vec<Course>,
}

/// Builds the grades request for `creds`.
pub fn grades_request(creds: &Credentials) -> TransportResult<CallRequest> {
    CallRequest::post(GRADES_URL).json(creds)
}

#[derive(Debug, Default)]
pub struct FakePortal {
    failures: Mutex<HashMap<String, u32>>,
}

impl FakePortal {
    pub fn new() -> Self {
        Self::default()
    }
}

fn course(name: &str, grade: &str) -> Course {
    Course {
        name: name.to_string(),
        grade: grade.to_string(),
    }
}

fn transcript() -> Vec<Semester> {
    vec![
        Semester {
            id: 1,
            name: "Autumn 2025".into(),
            courses: vec![course("Linear Algebra", "A"), course("Operating Systems", "B+")],
        },
        Semester {
            id: 2,
            name: "Spring 2026".into(),
            courses: vec![course("Compilers", "A-"), course("Databases", "A")],
        },
    ]
}

#[async_trait]
impl RoundTrip for FakePortal {
    async fn round_trip(&self, request: &CallRequest) -> TransportResult<CallResponse> {
        let creds: Credentials = serde_json::from_slice(&request.body)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        if creds.login == "down" {
            return Ok(CallResponse::new(503, "maintenance"));
        }

        if creds.login.starts_with("flaky") {
            let mut failures = self.failures.lock();
            let seen = failures.entry(creds.login.clone()).or_default();
            if *seen < 2 {
                *seen += 1;
                return Ok(CallResponse::new(502, "bad gateway"));
            }
        }

        if creds.password != VALID_PASSWORD {
            return Ok(CallResponse::new(403, "forbidden"));
        }

        let body =
            serde_json::to_vec(&transcript()).map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(CallResponse::new(200, body))
    }
}
