//! Request loop run by the `mathhub-worker` binary.

use std::io::{self, BufRead, Write};

use crate::config::EngineLimits;
use crate::engine::ScriptEngine;
use crate::protocol::{WorkerRequest, WorkerResponse};

/// Serve requests from `input` until it closes, one reply line per request.
///
/// Malformed lines get a `protocol` reply; the loop keeps going.
///
/// # Errors
/// Returns an I/O error if reading a request or writing a reply fails.
pub fn serve<R: BufRead, W: Write>(input: R, mut output: W) -> io::Result<()> {
    let mut engine = ScriptEngine::new(EngineLimits::default());
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<WorkerRequest>(&line) {
            Ok(request) => engine.handle(request),
            Err(e) => {
                tracing::warn!(error = %e, "malformed request");
                WorkerResponse::Protocol { message: e.to_string() }
            }
        };
        serde_json::to_writer(&mut output, &reply)?;
        output.write_all(b"\n")?;
        output.flush()?;
    }
    tracing::debug!(contexts = engine.context_count(), "input closed, worker exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replies(input: &str) -> Vec<WorkerResponse> {
        let mut output = Vec::new();
        if let Err(e) = serve(input.as_bytes(), &mut output) {
            panic!("serve failed: {e}");
        }
        let text = match String::from_utf8(output) {
            Ok(t) => t,
            Err(e) => panic!("worker wrote invalid UTF-8: {e}"),
        };
        text.lines()
            .map(|line| match serde_json::from_str(line) {
                Ok(reply) => reply,
                Err(e) => panic!("bad reply line {line}: {e}"),
            })
            .collect()
    }

    #[test]
    fn session_runs_in_order() {
        let input = concat!(
            r#"{"op":"create_context","context":1}"#,
            "\n\n",
            r#"{"op":"run","context":1,"source":"() => 'hi'","args":[]}"#,
            "\n",
        );
        let replies = replies(input);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], WorkerResponse::Ready);
        assert!(matches!(&replies[1], WorkerResponse::Value { .. }), "got {:?}", replies[1]);
    }

    #[test]
    fn malformed_line_gets_protocol_reply() {
        let replies = replies("not json\n");
        assert!(matches!(replies.as_slice(), [WorkerResponse::Protocol { .. }]), "got {replies:?}");
    }
}
