//! Shared scaffolding for the end-to-end scenario specs: an in-memory
//! writer the `Emitter` can write NDJSON into, and the session context every
//! scenario needs to hand `Pipeline::build` to get going.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use simtail_daemon::tracker::SessionContext;

#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    pub fn events(&self) -> Vec<serde_json::Value> {
        let data = self.0.lock().clone();
        String::from_utf8(data)
            .expect("utf8 output")
            .lines()
            .map(|l| serde_json::from_str(l).expect("valid ndjson line"))
            .collect()
    }
}

pub fn test_session_context() -> SessionContext {
    SessionContext {
        app: "com.example.app".to_string(),
        simulator: "iPhone 15".to_string(),
        udid: "ABCD-1234".to_string(),
        version: None,
        build: None,
    }
}

pub async fn wait_for_at_least(buf: &SharedBuf, n: usize) {
    for _ in 0..300 {
        if buf.events().len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
