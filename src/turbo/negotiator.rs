use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::transport::Transport;
use crate::wire::{join_u14, turbo_kind, Frame, FrameBuilder, TURBO_PREFIX};

use super::{
    best_index_in_mask, factor_for, index_for_factor, Keepalive, KeepaliveGuard, TurboConfig,
    TurboError, TurboStatus,
};

/// Speed negotiator for one device link.
///
/// Owns the inbound turbo frame stream and the link heartbeat. At most
/// one negotiation runs at a time; a failed negotiation leaves the
/// link at 1x with the heartbeat stopped.
pub struct TurboLink {
    transport: Arc<dyn Transport>,
    frames: mpsc::Receiver<Frame>,
    config: TurboConfig,
    keepalive: Keepalive,
    status: TurboStatus,
    guard: Option<KeepaliveGuard>,
}

impl TurboLink {
    pub fn new(
        transport: Arc<dyn Transport>,
        frames: mpsc::Receiver<Frame>,
        config: TurboConfig,
    ) -> Self {
        let keepalive = Keepalive::new(Arc::clone(&transport), config.keepalive_interval);
        Self {
            transport,
            frames,
            config,
            keepalive,
            status: TurboStatus::standard(),
            guard: None,
        }
    }

    pub fn status(&self) -> TurboStatus {
        self.status
    }

    /// Handle for callers that need the heartbeat held across their own
    /// long-running traffic, a bulk transfer for instance.
    pub fn keepalive(&self) -> &Keepalive {
        &self.keepalive
    }

    /// Negotiates the highest speed not exceeding `requested_factor`.
    ///
    /// Tries the vendor query/set path first and falls back to the
    /// generic capability negotiation. Returns the factor actually in
    /// effect afterwards. On failure the link drops back to 1x and the
    /// error is [`TurboError::NegotiationFailed`].
    pub async fn set_speed(&mut self, requested_factor: f32) -> Result<f32, TurboError> {
        let target = index_for_factor(requested_factor).min(self.config.max_speed_index);
        if target <= 1 {
            tracing::info!("Dropping link to standard speed");
            self.downgrade();
            return Ok(1.0);
        }

        match self.vendor_negotiate(target).await {
            Ok(index) => {
                self.engage(index);
                return Ok(self.status.factor);
            }
            Err(TurboError::Transport(e)) => return Err(TurboError::Transport(e)),
            Err(e) => {
                tracing::debug!("Vendor speed path failed ({e}), trying generic negotiation");
            }
        }

        match self.generic_negotiate(target).await {
            Ok(index) => {
                self.engage(index);
                Ok(self.status.factor)
            }
            Err(TurboError::Transport(e)) => Err(TurboError::Transport(e)),
            Err(_) => {
                self.downgrade();
                Err(TurboError::NegotiationFailed)
            }
        }
    }

    /// Vendor path: read the current index, set the target, read back
    /// and confirm the device accepted it.
    async fn vendor_negotiate(&mut self, target: u8) -> Result<u8, TurboError> {
        let reply = self
            .exchange(
                FrameBuilder::new(TURBO_PREFIX, turbo_kind::SPEED_QUERY).finish(),
                turbo_kind::SPEED_REPLY,
            )
            .await?;
        let current = reply.payload().first().copied().unwrap_or(1);
        tracing::debug!(current, target, "Vendor speed query answered");

        let mut set = FrameBuilder::new(TURBO_PREFIX, turbo_kind::SPEED_SET);
        set.put_u7(target);
        self.transport.send(&set.finish())?;

        let confirm = self
            .exchange(
                FrameBuilder::new(TURBO_PREFIX, turbo_kind::SPEED_QUERY).finish(),
                turbo_kind::SPEED_REPLY,
            )
            .await?;
        match confirm.payload().first() {
            Some(&index) if index == target => Ok(index),
            _ => Err(TurboError::NegotiationFailed),
        }
    }

    /// Generic path: ask for the supported and certified index masks,
    /// pick the best match and negotiate it. The acknowledgement still
    /// arrives at the original speed.
    async fn generic_negotiate(&mut self, target: u8) -> Result<u8, TurboError> {
        let answer = self
            .exchange(
                FrameBuilder::new(TURBO_PREFIX, turbo_kind::SPEED_REQUEST).finish(),
                turbo_kind::SPEED_ANSWER,
            )
            .await?;
        let payload = answer.payload();
        if payload.len() < 4 {
            return Err(TurboError::NegotiationFailed);
        }
        let supported = join_u14(payload[0], payload[1]);
        let certified = join_u14(payload[2], payload[3]);
        tracing::debug!(supported, certified, "Speed capability masks received");

        let index = best_index_in_mask(certified, target)
            .or_else(|| best_index_in_mask(supported, target))
            .ok_or(TurboError::NegotiationFailed)?;

        let mut negotiate = FrameBuilder::new(TURBO_PREFIX, turbo_kind::SPEED_NEGOTIATE);
        negotiate.put_u7(index);
        self.exchange(negotiate.finish(), turbo_kind::SPEED_ACK)
            .await?;
        Ok(index)
    }

    /// Sends `request` and waits for a turbo frame of `reply_kind`,
    /// skipping unrelated frames, bounded by the negotiation timeout.
    async fn exchange(&mut self, request: Vec<u8>, reply_kind: u8) -> Result<Frame, TurboError> {
        self.transport.send(&request)?;

        let wait = self.config.negotiation_timeout;
        loop {
            match timeout(wait, self.frames.recv()).await {
                Ok(Some(frame)) if frame.kind() == reply_kind => return Ok(frame),
                Ok(Some(frame)) => {
                    tracing::trace!(kind = frame.kind(), "Skipping unrelated turbo frame");
                }
                Ok(None) => return Err(TurboError::StreamClosed),
                Err(_) => return Err(TurboError::NegotiationFailed),
            }
        }
    }

    fn engage(&mut self, index: u8) {
        self.status = TurboStatus {
            index,
            factor: factor_for(index),
        };
        tracing::info!(index, factor = self.status.factor, "Link speed elevated");
        self.keepalive.set_engaged(true);
        if self.guard.is_none() {
            self.guard = Some(self.keepalive.acquire());
        }
    }

    fn downgrade(&mut self) {
        self.status = TurboStatus::standard();
        self.guard = None;
        self.keepalive.set_engaged(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::MockTransport;
    use crate::wire::split_u14;
    use std::time::Duration;

    fn test_config() -> TurboConfig {
        TurboConfig {
            negotiation_timeout: Duration::from_millis(50),
            keepalive_interval: Duration::from_millis(300),
            max_speed_index: 11,
        }
    }

    fn turbo_frame(kind: u8, payload: &[u8]) -> Frame {
        let mut builder = FrameBuilder::new(TURBO_PREFIX, kind);
        builder.put_slice(payload);
        Frame::parse(builder.finish()).unwrap()
    }

    /// Answers vendor speed queries, echoing back whatever index was
    /// last set. With `accepts` false the device ignores SET.
    fn vendor_device(
        mut outbound: tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>,
        frames: mpsc::Sender<Frame>,
        accepts: bool,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut current = 1u8;
            while let Some(bytes) = outbound.recv().await {
                let Ok(frame) = Frame::parse(bytes) else {
                    continue;
                };
                match frame.kind() {
                    turbo_kind::SPEED_QUERY => {
                        let _ = frames.send(turbo_frame(turbo_kind::SPEED_REPLY, &[current])).await;
                    }
                    turbo_kind::SPEED_SET if accepts => {
                        current = frame.payload()[0];
                    }
                    _ => {}
                }
            }
        })
    }

    #[tokio::test]
    async fn test_vendor_path_elevates_and_starts_heartbeat() {
        let transport = Arc::new(MockTransport::new());
        let outbound = transport.observe();
        let (frame_tx, frame_rx) = mpsc::channel(8);
        let device = vendor_device(outbound, frame_tx, true);

        let mut link = TurboLink::new(transport, frame_rx, test_config());
        let factor = link.set_speed(8.0).await.unwrap();

        assert_eq!(factor, 8.0);
        assert_eq!(link.status().index, 7);
        assert!(link.keepalive().is_running());
        device.abort();
    }

    #[tokio::test]
    async fn test_requested_factor_clamps_to_model_maximum() {
        let transport = Arc::new(MockTransport::new());
        let outbound = transport.observe();
        let (frame_tx, frame_rx) = mpsc::channel(8);
        let device = vendor_device(outbound, frame_tx, true);

        let mut link = TurboLink::new(
            transport,
            frame_rx,
            TurboConfig {
                max_speed_index: 4,
                ..test_config()
            },
        );
        let factor = link.set_speed(20.0).await.unwrap();

        assert_eq!(factor, 4.0);
        assert_eq!(link.status().index, 4);
        device.abort();
    }

    #[tokio::test]
    async fn test_generic_fallback_when_vendor_path_ignored() {
        let transport = Arc::new(MockTransport::new());
        let mut outbound = transport.observe();
        let (frame_tx, frame_rx) = mpsc::channel(8);

        // Mute on the vendor kinds, fluent in the generic ones. The
        // certified mask tops out at index 5, below the request.
        let device = tokio::spawn(async move {
            while let Some(bytes) = outbound.recv().await {
                let Ok(frame) = Frame::parse(bytes) else {
                    continue;
                };
                match frame.kind() {
                    turbo_kind::SPEED_REQUEST => {
                        let supported = split_u14(0b0111_1111_1111);
                        let certified = split_u14(0b0001_1111);
                        let mut payload = Vec::new();
                        payload.extend_from_slice(&supported);
                        payload.extend_from_slice(&certified);
                        let _ = frame_tx
                            .send(turbo_frame(turbo_kind::SPEED_ANSWER, &payload))
                            .await;
                    }
                    turbo_kind::SPEED_NEGOTIATE => {
                        let _ = frame_tx.send(turbo_frame(turbo_kind::SPEED_ACK, &[])).await;
                    }
                    _ => {}
                }
            }
        });

        let mut link = TurboLink::new(transport, frame_rx, test_config());
        let factor = link.set_speed(8.0).await.unwrap();

        assert_eq!(link.status().index, 5);
        assert_eq!(factor, 5.0);
        assert!(link.keepalive().is_running());
        device.abort();
    }

    #[tokio::test]
    async fn test_silent_device_leaves_link_at_standard_speed() {
        let transport = Arc::new(MockTransport::new());
        let (_frame_tx, frame_rx) = mpsc::channel::<Frame>(8);

        let mut link = TurboLink::new(transport, frame_rx, test_config());
        let err = link.set_speed(8.0).await.unwrap_err();

        assert!(matches!(err, TurboError::NegotiationFailed));
        assert_eq!(link.status().index, 1);
        assert!(!link.status().elevated());
        assert!(!link.keepalive().is_running());
    }

    #[tokio::test]
    async fn test_device_rejecting_set_falls_back_then_fails() {
        let transport = Arc::new(MockTransport::new());
        let outbound = transport.observe();
        let (frame_tx, frame_rx) = mpsc::channel(8);
        // Replies to queries but never applies SET, and knows nothing
        // about the generic negotiation.
        let device = vendor_device(outbound, frame_tx, false);

        let mut link = TurboLink::new(transport, frame_rx, test_config());
        let err = link.set_speed(4.0).await.unwrap_err();

        assert!(matches!(err, TurboError::NegotiationFailed));
        assert_eq!(link.status().factor, 1.0);
        device.abort();
    }

    #[tokio::test]
    async fn test_dropping_to_standard_stops_heartbeat() {
        let transport = Arc::new(MockTransport::new());
        let outbound = transport.observe();
        let (frame_tx, frame_rx) = mpsc::channel(8);
        let device = vendor_device(outbound, frame_tx, true);

        let mut link = TurboLink::new(transport, frame_rx, test_config());
        link.set_speed(8.0).await.unwrap();
        assert!(link.keepalive().is_running());

        let factor = link.set_speed(1.0).await.unwrap();
        assert_eq!(factor, 1.0);
        assert!(!link.keepalive().is_running());
        device.abort();
    }
}
