use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use hyperion_core::{BridgeEvent, ChainResult, LastClaimEvent};

use crate::instance::{HyperionInstance, LoopKind, OrchestratorLoop};

/// Outcome of one scan window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Done,
    NonceGap,
}

/// Relays counterparty bridge events to the home chain as claims.
#[derive(Debug)]
pub struct Oracle {
    instance: Arc<HyperionInstance>,
    last_checked_height: Option<u64>,
    last_resync: Instant,
    resync_requested: bool,
}

impl Oracle {
    pub fn new(instance: Arc<HyperionInstance>) -> Self {
        Self {
            instance,
            last_checked_height: None,
            last_resync: Instant::now(),
            resync_requested: false,
        }
    }

    pub fn last_checked_height(&self) -> Option<u64> {
        self.last_checked_height
    }

    fn resync_height(&self, last_claim: &LastClaimEvent) -> u64 {
        last_claim
            .event_height
            .max(self.instance.params().bridge_contract_start_height)
    }

    /// Where the next window starts, rewinding to the last acknowledged claim
    /// on first run, when a resync was requested and every
    /// `auto_resync_interval`.
    fn window_start(&mut self, last_claim: &LastClaimEvent) -> u64 {
        let resync_due = self.last_resync.elapsed() >= self.instance.conf().auto_resync_interval;
        match self.last_checked_height {
            Some(height) if !resync_due && !self.resync_requested => height,
            previous => {
                let start = self.resync_height(last_claim);
                if previous.is_some() {
                    info!(
                        from = ?previous,
                        to = start,
                        requested = self.resync_requested,
                        "Resyncing oracle to the last acknowledged claim"
                    );
                }
                self.last_resync = Instant::now();
                self.resync_requested = false;
                start
            }
        }
    }

    async fn send_claims(&self, events: &[BridgeEvent]) -> ChainResult<()> {
        let instance = &self.instance;
        for bulk in events.chunks(instance.conf().max_claims_per_bulk.max(1)) {
            let result = instance
                .home()
                .send_claims(instance.hyperion_id(), bulk)
                .await;
            let response = instance.checked_broadcast(result).await?;
            for event in bulk {
                let kind: &'static str = event.kind().into();
                instance
                    .metrics()
                    .claims_sent()
                    .with_label_values(&[instance.chain_label().as_str(), kind])
                    .inc();
                instance.state().add(kind, 1);
            }
            info!(
                claims = bulk.len(),
                first_nonce = bulk.first().map(|e| e.event_nonce()),
                last_nonce = bulk.last().map(|e| e.event_nonce()),
                tx_hash = %response.tx_hash,
                "Sent claims"
            );
        }
        Ok(())
    }

    async fn scan(&mut self, last_claim: &LastClaimEvent) -> ChainResult<Scan> {
        let instance = self.instance.clone();
        let start = self.window_start(last_claim);
        let head = instance
            .read("latest_block", || instance.bridge().latest_block())
            .await?;
        instance.state().set_latest_counterparty_height(head);
        let Some(confirmed) = head.checked_sub(instance.conf().confirmation_delay) else {
            return Ok(Scan::Done);
        };
        if confirmed < start {
            debug!(start, confirmed, "No confirmed blocks to scan");
            return Ok(Scan::Done);
        }
        let end = confirmed.min(start + instance.conf().blocks_to_search);

        let mut events = instance
            .read("filter_events", || instance.bridge().filter_events(start, end))
            .await?;
        let last_nonce = last_claim.event_nonce;
        events.retain(|nonce| nonce > last_nonce);
        if events.is_empty() {
            self.advance(end);
            return Ok(Scan::Done);
        }

        let events = events.into_sorted();
        if let Some(first) = events.first() {
            if first.event_nonce() != last_nonce + 1 {
                warn!(
                    expected = last_nonce + 1,
                    found = first.event_nonce(),
                    start,
                    "Event nonce gap in scan window, resyncing"
                );
                self.resync_requested = true;
                return Ok(Scan::NonceGap);
            }
        }

        self.send_claims(&events).await?;
        self.advance(end);
        Ok(Scan::Done)
    }

    fn advance(&mut self, height: u64) {
        self.last_checked_height = Some(height);
        let state = self.instance.state();
        state.set_last_scanned_height(height);
        self.instance
            .metrics()
            .last_scanned_height()
            .with_label_values(&[&self.instance.chain_label()])
            .set(height as i64);
    }
}

#[async_trait]
impl OrchestratorLoop for Oracle {
    fn kind(&self) -> LoopKind {
        LoopKind::Oracle
    }

    fn interval(&self) -> Duration {
        self.instance.conf().loop_duration
    }

    #[instrument(skip(self), fields(last_checked = ?self.last_checked_height))]
    async fn tick(&mut self) -> ChainResult<()> {
        let instance = self.instance.clone();
        let hyperion_id = instance.hyperion_id();
        let last_claim = instance
            .read("last_claim_event", || instance.home().last_claim_event(hyperion_id))
            .await?;
        instance
            .state()
            .set_last_observed_event_nonce(last_claim.event_nonce);
        instance
            .metrics()
            .last_observed_event_nonce()
            .with_label_values(&[&instance.chain_label()])
            .set(last_claim.event_nonce as i64);

        if self.scan(&last_claim).await? == Scan::NonceGap {
            debug!("Rescanning from the last acknowledged claim");
            self.scan(&last_claim).await?;
        }
        Ok(())
    }
}
