//! Event stream serve loop
//!
//! One [`EventStream`] backs one long-lived streaming response. It owns the
//! receiving end of a subscriber queue and writes frames to any
//! [`AsyncWrite`]. On open it writes a snapshot of visible devices before
//! anything queued, and while idle it writes keep-alive comments.
//!
//! The queue is detached by a guard's `Drop`, so cleanup runs exactly once
//! whether the loop ends by cancellation, a write error, or a panic.

use std::sync::Arc;
use std::time::Duration;

use lanshare_core::{ClientAddr, CoreResult, Device, EventFrame, EventKind};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::fanout::Fanout;
use crate::registry::{ChannelId, Registry};

/// Default keep-alive interval in seconds
pub const KEEPALIVE_SECS: u64 = 20;

/// Errors that end a serve loop
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Detaches a subscriber queue when dropped
struct ChannelGuard {
    fanout: Fanout,
    device_id: String,
    channel: ChannelId,
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        let last = self
            .fanout
            .registry()
            .close_channel(&self.device_id, self.channel);
        info!("Stream disconnected: {}", self.device_id);
        if last {
            self.fanout.device_left(&self.device_id);
        }
    }
}

/// An open event stream for one device
pub struct EventStream {
    receiver: mpsc::Receiver<EventFrame>,
    snapshot: Vec<Device>,
    keepalive: Duration,
    guard: ChannelGuard,
}

impl EventStream {
    /// Attach a new stream to `id`, registering the device if it is unknown
    ///
    /// The snapshot of visible devices is taken here, after the queue is
    /// attached, so no event can fall between the snapshot and the queue.
    pub fn open(
        registry: &Arc<Registry>,
        fanout: &Fanout,
        id: &str,
        origin: &ClientAddr,
        user_agent: &str,
        keepalive: Duration,
    ) -> CoreResult<Self> {
        let subscription = registry.open_channel(id, origin, user_agent)?;
        let guard = ChannelGuard {
            fanout: fanout.clone(),
            device_id: subscription.device_id,
            channel: subscription.channel,
        };
        let snapshot = registry.list_visible(id, fanout.scope());

        Ok(Self {
            receiver: subscription.receiver,
            snapshot,
            keepalive,
            guard,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.guard.device_id
    }

    /// Devices included in the opening snapshot
    pub fn snapshot(&self) -> &[Device] {
        &self.snapshot
    }

    /// Write frames to `writer` until cancelled or the writer fails
    pub async fn serve<W>(mut self, mut writer: W, cancel: CancellationToken) -> Result<(), StreamError>
    where
        W: AsyncWrite + Unpin,
    {
        let snapshot = EventFrame::encode(EventKind::Peers, &self.snapshot)?;
        write_frame(&mut writer, &snapshot).await?;
        debug!(
            "Sent initial peer list to {} ({} peers)",
            self.guard.device_id,
            self.snapshot.len()
        );

        // Announce only once the snapshot is out
        if let Ok(me) = self.guard.fanout.registry().lookup(&self.guard.device_id) {
            self.guard.fanout.device_joined(&me);
        }

        let start = tokio::time::Instant::now() + self.keepalive;
        let mut keepalive = interval_at(start, self.keepalive);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Stream cancelled: {}", self.guard.device_id);
                    return Ok(());
                }
                frame = self.receiver.recv() => match frame {
                    Some(frame) => write_frame(&mut writer, &frame).await?,
                    None => return Ok(()),
                },
                _ = keepalive.tick() => {
                    write_frame(&mut writer, &EventFrame::keepalive()).await?;
                }
            }
        }
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &EventFrame) -> std::io::Result<()> {
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::BroadcastScope;
    use tokio::io::AsyncReadExt;

    fn setup() -> (Arc<Registry>, Fanout) {
        let registry = Arc::new(Registry::new());
        let fanout = Fanout::new(registry.clone(), BroadcastScope::SameNetwork);
        (registry, fanout)
    }

    fn lan() -> ClientAddr {
        ClientAddr::from_parts("192.168.1.2:5000", None, None)
    }

    #[test]
    fn test_open_rejects_empty_id() {
        let (registry, fanout) = setup();
        let result = EventStream::open(&registry, &fanout, "", &lan(), "", Duration::from_secs(20));
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drop_without_serve_detaches() {
        let (registry, fanout) = setup();
        let mut watcher = registry.open_channel("w", &lan(), "").unwrap();

        let stream =
            EventStream::open(&registry, &fanout, "a", &lan(), "", Duration::from_secs(20)).unwrap();
        assert_eq!(registry.channel_count("a"), 1);
        drop(stream);

        assert_eq!(registry.channel_count("a"), 0);
        let frame = watcher.receiver.try_recv().unwrap();
        assert!(frame.as_bytes().starts_with(b"event: device-left\n"));
    }

    #[tokio::test]
    async fn test_snapshot_first_then_events() {
        let (registry, fanout) = setup();
        registry.register("b", None, &lan(), "").unwrap();

        let stream =
            EventStream::open(&registry, &fanout, "a", &lan(), "", Duration::from_secs(20)).unwrap();
        assert_eq!(stream.snapshot().len(), 1);

        // Queued before the loop starts; must still come after the snapshot
        fanout.shared_update();

        let (writer, mut reader) = tokio::io::duplex(4096);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(stream.serve(writer, cancel.clone()));

        let mut buf = Vec::new();
        while !String::from_utf8_lossy(&buf).contains("shared-update") {
            let mut chunk = [0u8; 1024];
            let n = reader.read(&mut chunk).await.unwrap();
            assert!(n > 0, "stream closed early");
            buf.extend_from_slice(&chunk[..n]);
        }
        let text = String::from_utf8_lossy(&buf).into_owned();
        assert!(text.starts_with("event: peers\ndata: [{\"id\":\"b\""));
        assert!(text.find("shared-update") > text.find("event: peers"));

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(registry.channel_count("a"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive() {
        let (registry, fanout) = setup();
        let stream =
            EventStream::open(&registry, &fanout, "a", &lan(), "", Duration::from_secs(20)).unwrap();

        let (writer, mut reader) = tokio::io::duplex(4096);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(stream.serve(writer, cancel.clone()));

        let mut buf = Vec::new();
        while !String::from_utf8_lossy(&buf).contains(": ping") {
            let mut chunk = [0u8; 256];
            let n = reader.read(&mut chunk).await.unwrap();
            assert!(n > 0);
            buf.extend_from_slice(&chunk[..n]);
        }
        assert!(String::from_utf8_lossy(&buf).ends_with(": ping\n\n"));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_reader_gone_ends_loop_and_cleans_up() {
        let (registry, fanout) = setup();
        let mut watcher = registry.open_channel("w", &lan(), "").unwrap();
        let stream =
            EventStream::open(&registry, &fanout, "a", &lan(), "", Duration::from_secs(20)).unwrap();

        let (writer, reader) = tokio::io::duplex(64);
        drop(reader);

        let result = stream.serve(writer, CancellationToken::new()).await;
        assert!(matches!(result, Err(StreamError::Io(_))));
        assert_eq!(registry.channel_count("a"), 0);

        let frame = watcher.receiver.try_recv().unwrap();
        assert!(frame.as_bytes().starts_with(b"event: device-left\n"));
        assert!(watcher.receiver.try_recv().is_err());
    }
}
