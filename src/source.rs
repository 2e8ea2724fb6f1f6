use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::topology::{RawSnapshot, SnapshotError, parse_snapshot};

pub type PollResult = Result<RawSnapshot, SnapshotError>;

/// Anything that can produce a topology snapshot on demand.
pub trait SnapshotSource: Send + 'static {
    fn fetch(&self) -> PollResult;
}

pub struct HttpSnapshotSource {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpSnapshotSource {
    pub fn new(
        base_url: &str,
        namespace: &str,
        label: &str,
        display: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        let url = format!(
            "{}/api/pods?namespace={namespace}&label={label}&display={display}",
            base_url.trim_end_matches('/')
        );
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn fetch_body(&self) -> Result<String> {
        self.client
            .get(&self.url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .with_context(|| format!("request to {} failed", self.url))
    }
}

impl SnapshotSource for HttpSnapshotSource {
    fn fetch(&self) -> PollResult {
        let body = self
            .fetch_body()
            .map_err(SnapshotError::TransientFetch)?;
        parse_snapshot(&body)
    }
}

/// Background fetch loop. The first request goes out immediately, then one
/// per interval. Results queue up in a channel that the UI loop drains, so
/// applying a snapshot never races a simulation tick.
pub struct Poller {
    rx: Receiver<PollResult>,
    stop_tx: Option<Sender<()>>,
}

impl Poller {
    pub fn spawn<S: SnapshotSource>(source: S, interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        thread::spawn(move || {
            loop {
                let result = source.fetch();

                // Stopped while the request was in flight: drop the response.
                if matches!(stop_rx.try_recv(), Err(TryRecvError::Disconnected) | Ok(())) {
                    debug!("poller stopped, discarding in-flight response");
                    break;
                }
                if tx.send(result).is_err() {
                    break;
                }

                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("poller thread exiting");
        });

        Self {
            rx,
            stop_tx: Some(stop_tx),
        }
    }

    /// Every result received since the last call, oldest first.
    pub fn drain(&self) -> Vec<PollResult> {
        let mut results = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(result) => results.push(result),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.is_running() {
                        warn!("poller thread disconnected unexpectedly");
                    }
                    break;
                }
            }
        }
        results
    }

    pub fn is_running(&self) -> bool {
        self.stop_tx.is_some()
    }

    pub fn stop(&mut self) {
        if self.stop_tx.take().is_some() {
            debug!("stopping poller");
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use super::*;

    /// Hands out queued results, then repeats the last one.
    #[derive(Clone)]
    pub(crate) struct ScriptedSource {
        script: Arc<Mutex<Vec<&'static str>>>,
        pub(crate) calls: Arc<Mutex<usize>>,
    }

    impl ScriptedSource {
        pub(crate) fn new(bodies: Vec<&'static str>) -> Self {
            Self {
                script: Arc::new(Mutex::new(bodies)),
                calls: Arc::new(Mutex::new(0)),
            }
        }
    }

    impl SnapshotSource for ScriptedSource {
        fn fetch(&self) -> PollResult {
            *self.calls.lock().expect("lock") += 1;
            let mut script = self.script.lock().expect("lock");
            let body = if script.len() > 1 {
                script.remove(0)
            } else {
                script.first().copied().unwrap_or("")
            };
            parse_snapshot(body)
        }
    }

    fn wait_for(poller: &Poller, count: usize) -> Vec<PollResult> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut results = Vec::new();
        while results.len() < count && Instant::now() < deadline {
            results.extend(poller.drain());
            thread::sleep(Duration::from_millis(5));
        }
        results
    }

    #[test]
    fn http_source_builds_endpoint_url() {
        let source = HttpSnapshotSource::new(
            "http://localhost:5010/",
            "default",
            "zone",
            "label",
            Duration::from_secs(2),
        )
        .expect("client builds");
        assert_eq!(
            source.url(),
            "http://localhost:5010/api/pods?namespace=default&label=zone&display=label"
        );
    }

    #[test]
    fn poller_delivers_in_order() {
        let source = ScriptedSource::new(vec![
            r#"{"nodes":[],"pods":[]}"#,
            "not json",
            r#"{"nodes":[{"name":"n1"}],"pods":[]}"#,
        ]);
        let poller = Poller::spawn(source, Duration::from_millis(1));

        let results = wait_for(&poller, 3);
        assert!(results.len() >= 3, "only {} results arrived", results.len());
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(SnapshotError::TransientFetch(_))));
        assert_eq!(
            results[2].as_ref().ok().and_then(|snapshot| snapshot.nodes.as_ref()).map(Vec::len),
            Some(1)
        );
    }

    #[test]
    fn stopped_poller_stops_fetching() {
        let source = ScriptedSource::new(vec![r#"{"nodes":[],"pods":[]}"#]);
        let calls = Arc::clone(&source.calls);
        let mut poller = Poller::spawn(source, Duration::from_millis(5));
        wait_for(&poller, 1);

        poller.stop();
        assert!(!poller.is_running());
        thread::sleep(Duration::from_millis(50));
        let after_stop = *calls.lock().expect("lock");
        thread::sleep(Duration::from_millis(100));
        assert_eq!(*calls.lock().expect("lock"), after_stop);
    }
}
