use std::io;

error_chain! {
    foreign_links {
        Io(io::Error);
        Json(::serde_json::Error);
        MsgpackDecode(::rmp_serde::decode::Error);
        MsgpackEncode(::rmp_serde::encode::Error);
    }

    errors {
        MissingSwitch(name: String) {
            description("switch not present")
            display("no {} switch found", name)
        }
        QueueFull {
            description("queue full")
            display("queue full")
        }
        NoRemotesAvailable {
            description("no remotes available")
            display("no remotes available")
        }
        PreprocessFailed(output: String) {
            description("preprocess failed")
            display("preprocess failed: {}", output)
        }
        /// Nonzero compiler exit. The display is the compiler's combined
        /// stdout/stderr so the text reaching the client is exactly what the
        /// compiler printed.
        CompileFailed(output: String) {
            description("compile failed")
            display("{}", output)
        }
        DecryptFailed {
            description("decrypt failed")
            display("decrypt failed")
        }
        Timeout(op: &'static str) {
            description("timeout")
            display("{} timed out", op)
        }
        UnknownMethod(name: String) {
            description("unknown method")
            display("unknown method: {}", name)
        }
        FrameTooLarge(size: usize) {
            description("frame too large")
            display("frame too large: {} bytes", size)
        }
        /// Error reported by the remote side of an RPC.
        Rpc(msg: String) {
            description("rpc error")
            display("{}", msg)
        }
    }
}

/// Flattens an error and its causes into a single `outer: inner` string, the
/// form sent back in RPC error responses.
pub fn error_string(err: &Error) -> String {
    err.iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}
