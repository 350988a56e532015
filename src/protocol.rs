//! Request and response shapes carried by the framed transport.
//!
//! The envelope and every method's args/payload are encoded independently
//! with MessagePack, so the dispatch layer can route on the method name
//! without knowing the argument types.

use std::fmt;

pub const METHOD_COMPILE: &str = "compile";
pub const METHOD_PREPROCESS: &str = "preprocess";
pub const METHOD_STATUS: &str = "status";

/// RPC envelope, request direction. `args` is the MessagePack encoding of
/// the named method's request type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub name: String,
    #[serde(with = "serde_bytes")]
    pub args: Vec<u8>,
}

/// RPC envelope, response direction. `payload` is the MessagePack encoding
/// of the method's response type, empty on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub error_msg: Option<String>,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

/// One header (or other file) shipped alongside a compile request, keyed by
/// its absolute path on the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludeEntry {
    pub path: String,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileRequest {
    pub command: String,
    #[serde(with = "serde_bytes")]
    pub code: Vec<u8>,
    pub includes: Vec<IncludeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileResponse {
    /// Combined compiler stdout/stderr (warnings and notes).
    pub output: String,
    #[serde(with = "serde_bytes")]
    pub object: Vec<u8>,
    /// Dependency manifest with paths repaired for the requesting host,
    /// empty when none was requested.
    #[serde(with = "serde_bytes")]
    pub dep: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessRequest {
    /// Client working directory, so relative paths resolve the same way they
    /// would have on the client.
    pub dir: String,
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessResponse {
    pub output: String,
    #[serde(with = "serde_bytes")]
    pub code: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub dep: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRequest {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    Compile,
    Preprocess,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobKind::Compile => write!(f, "Compile"),
            JobKind::Preprocess => write!(f, "Preprocess"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusJob {
    pub source_address: String,
    pub filename: String,
    pub command: String,
    pub mode: JobKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub id: usize,
    pub job: Option<StatusJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub workers: Vec<WorkerStatus>,
    pub queued: Vec<StatusJob>,
    pub num_workers: usize,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let args = rmp_serde::to_vec_named(&CompileRequest {
            command: "cc -c a.cpp -o a.o".to_string(),
            code: b"int main() {}".to_vec(),
            includes: vec![IncludeEntry {
                path: "/src/a.h".to_string(),
                data: b"#pragma once".to_vec(),
            }],
        })
        .unwrap();
        let req = Request {
            name: METHOD_COMPILE.to_string(),
            args,
        };
        let encoded = rmp_serde::to_vec_named(&req).unwrap();
        let decoded: Request = rmp_serde::from_slice(&encoded).unwrap();
        assert_eq!(decoded.name, METHOD_COMPILE);

        let inner: CompileRequest = rmp_serde::from_slice(&decoded.args).unwrap();
        assert_eq!(inner.command, "cc -c a.cpp -o a.o");
        assert_eq!(inner.includes[0].path, "/src/a.h");
    }

    #[test]
    fn test_error_response_roundtrip() {
        let resp = Response {
            success: false,
            error_msg: Some("queue full".to_string()),
            payload: Vec::new(),
        };
        let encoded = rmp_serde::to_vec_named(&resp).unwrap();
        let decoded: Response = rmp_serde::from_slice(&encoded).unwrap();
        assert!(!decoded.success);
        assert_eq!(decoded.error_msg.as_deref(), Some("queue full"));
    }
}
