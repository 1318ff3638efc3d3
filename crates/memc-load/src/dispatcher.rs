//! Line dispatcher: routes raw lines to per-type worker queues
//!
//! Runs on a blocking thread. Only the first whitespace-delimited token is
//! inspected here; full parsing happens in the worker. Lines whose type has
//! no queue are counted as processed and failed and are never enqueued.
//!
//! However dispatching ends (end of input, read error, or shutdown), every
//! queue receives exactly one [`QueueItem::Sentinel`].

use std::collections::BTreeMap;
use std::io;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::error::RecordError;
use crate::record::device_type;
use crate::worker::{QueueItem, WorkerStats};

/// Counters kept by the dispatcher itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Lines with no configured device type
    pub unknown: u64,
    /// Lines handed to a worker queue
    pub routed: u64,
    /// Lines whose worker queue was already closed
    pub dropped: u64,
    /// Dispatching stopped early because of a shutdown request
    pub interrupted: bool,
}

impl DispatchStats {
    /// Job-level contribution to the processed/error totals
    pub fn as_worker_stats(&self) -> WorkerStats {
        let failed = self.unknown + self.dropped;
        WorkerStats {
            processed: failed,
            errors: failed,
        }
    }
}

pub struct Dispatcher {
    queues: BTreeMap<String, mpsc::Sender<QueueItem>>,
    shutdown: CancellationToken,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(queues: BTreeMap<String, mpsc::Sender<QueueItem>>, shutdown: CancellationToken) -> Self {
        Self {
            queues,
            shutdown,
            stats: DispatchStats::default(),
        }
    }

    /// Route every non-empty line, then send one sentinel per queue
    ///
    /// Blocks on full queues. Must not be called from an async context.
    pub fn dispatch<I>(mut self, lines: I) -> io::Result<DispatchStats>
    where
        I: IntoIterator<Item = io::Result<String>>,
    {
        let result = self.route_all(lines);
        self.close_queues();
        result.map(|()| self.stats)
    }

    fn route_all<I>(&mut self, lines: I) -> io::Result<()>
    where
        I: IntoIterator<Item = io::Result<String>>,
    {
        for line in lines {
            if self.shutdown.is_cancelled() {
                warn!(routed = self.stats.routed, "Shutdown requested, dispatching stopped");
                self.stats.interrupted = true;
                break;
            }

            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            self.route(line);
        }
        Ok(())
    }

    fn route(&mut self, line: &str) {
        let dev_type = device_type(line).unwrap_or_default();

        let Some(queue) = self.queues.get(dev_type) else {
            self.stats.unknown += 1;
            error!("{}", RecordError::UnknownCategory(dev_type.to_string()));
            return;
        };

        if queue.blocking_send(QueueItem::Line(line.to_string())).is_err() {
            self.stats.dropped += 1;
            error!(dev_type, "Worker queue closed, line dropped");
            return;
        }
        self.stats.routed += 1;
    }

    fn close_queues(&mut self) {
        for (dev_type, queue) in std::mem::take(&mut self.queues) {
            if queue.blocking_send(QueueItem::Sentinel).is_err() {
                warn!(dev_type = %dev_type, "Worker queue closed before sentinel");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<io::Result<String>> {
        raw.iter().map(|l| Ok(l.to_string())).collect()
    }

    fn drain(rx: &mut mpsc::Receiver<QueueItem>) -> Vec<QueueItem> {
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }

    fn queues(
        types: &[&str],
    ) -> (
        BTreeMap<String, mpsc::Sender<QueueItem>>,
        BTreeMap<String, mpsc::Receiver<QueueItem>>,
    ) {
        let mut senders = BTreeMap::new();
        let mut receivers = BTreeMap::new();
        for t in types {
            let (tx, rx) = mpsc::channel(64);
            senders.insert(t.to_string(), tx);
            receivers.insert(t.to_string(), rx);
        }
        (senders, receivers)
    }

    #[test]
    fn test_routes_by_first_token() {
        let (senders, mut receivers) = queues(&["idfa", "gaid"]);
        let stats = Dispatcher::new(senders, CancellationToken::new())
            .dispatch(lines(&[
                "idfa\t1\t0\t0\t1",
                "",
                "gaid\t2\t0\t0\t2",
                "   ",
                "idfa\t3\t0\t0\t3",
            ]))
            .unwrap();

        assert_eq!(stats.routed, 3);
        assert_eq!(stats.unknown, 0);

        let idfa = drain(receivers.get_mut("idfa").unwrap());
        assert_eq!(
            idfa,
            vec![
                QueueItem::Line("idfa\t1\t0\t0\t1".into()),
                QueueItem::Line("idfa\t3\t0\t0\t3".into()),
                QueueItem::Sentinel,
            ]
        );
    }

    #[test]
    fn test_unknown_type_is_counted_and_not_enqueued() {
        let (senders, mut receivers) = queues(&["idfa"]);
        let stats = Dispatcher::new(senders, CancellationToken::new())
            .dispatch(lines(&["dzid\t1\t0\t0\t1", "idfa\t2\t0\t0\t2"]))
            .unwrap();

        assert_eq!(stats.unknown, 1);
        assert_eq!(
            stats.as_worker_stats(),
            WorkerStats {
                processed: 1,
                errors: 1
            }
        );
        assert_eq!(drain(receivers.get_mut("idfa").unwrap()).len(), 2);
    }

    #[test]
    fn test_every_queue_gets_one_sentinel() {
        let (senders, mut receivers) = queues(&["idfa", "gaid", "adid", "dvid"]);
        Dispatcher::new(senders, CancellationToken::new())
            .dispatch(lines(&["idfa\t1\t0\t0\t1"]))
            .unwrap();

        for rx in receivers.values_mut() {
            let sentinels = drain(rx)
                .into_iter()
                .filter(|item| *item == QueueItem::Sentinel)
                .count();
            assert_eq!(sentinels, 1);
        }
    }

    #[test]
    fn test_read_error_still_sends_sentinels() {
        let (senders, mut receivers) = queues(&["idfa"]);
        let input = vec![
            Ok("idfa\t1\t0\t0\t1".to_string()),
            Err(io::Error::new(io::ErrorKind::InvalidData, "corrupt gzip stream")),
            Ok("idfa\t2\t0\t0\t2".to_string()),
        ];

        let result = Dispatcher::new(senders, CancellationToken::new()).dispatch(input);

        assert!(result.is_err());
        assert_eq!(
            drain(receivers.get_mut("idfa").unwrap()),
            vec![QueueItem::Line("idfa\t1\t0\t0\t1".into()), QueueItem::Sentinel]
        );
    }

    #[test]
    fn test_shutdown_stops_reading() {
        let (senders, mut receivers) = queues(&["idfa"]);
        let token = CancellationToken::new();
        token.cancel();

        let stats = Dispatcher::new(senders, token)
            .dispatch(lines(&["idfa\t1\t0\t0\t1"]))
            .unwrap();

        assert!(stats.interrupted);
        assert_eq!(drain(receivers.get_mut("idfa").unwrap()), vec![QueueItem::Sentinel]);
    }
}
