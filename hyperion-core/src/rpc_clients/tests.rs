use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use super::*;
use crate::{ChainCommunicationError, ChainResult};

/// Client that records calls and fails or sleeps on demand
#[derive(Debug, Clone)]
struct ClientMock {
    name: &'static str,
    fail: bool,
    sleep: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl ClientMock {
    fn new(name: &'static str, fail: bool) -> Self {
        Self {
            name,
            fail,
            sleep: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn slow(name: &'static str, sleep: Duration) -> Self {
        Self {
            sleep: Some(sleep),
            ..Self::new(name, false)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn request(self) -> ChainResult<&'static str> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(sleep) = self.sleep {
            tokio::time::sleep(sleep).await;
        }
        if self.fail {
            Err(ChainCommunicationError::CustomError(format!(
                "{} failed to get block",
                self.name
            )))
        } else {
            Ok(self.name)
        }
    }
}

fn pool(clients: &[ClientMock]) -> RpcPool<ClientMock> {
    clients
        .iter()
        .fold(RpcPool::builder("test"), |b, c| {
            b.add_primary(format!("http://{}", c.name), c.clone())
        })
        .build()
}

#[tokio::test]
async fn empty_pool_has_no_clients() {
    let pool: RpcPool<ClientMock> = RpcPool::builder("empty").build();
    let err = pool
        .call_eth(|c| Box::pin(c.request()))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainCommunicationError::NoClients));
}

#[tokio::test]
async fn round_robin_advances_per_call() {
    let clients = [
        ClientMock::new("a", false),
        ClientMock::new("b", false),
        ClientMock::new("c", false),
    ];
    let pool = pool(&clients);
    let mut served = vec![];
    for _ in 0..4 {
        served.push(pool.call_rpc(|c| Box::pin(c.request())).await.unwrap());
    }
    assert_eq!(served, vec!["a", "b", "c", "a"]);
    assert_eq!(pool.endpoints()[0].reputation, 2);
}

#[tokio::test]
async fn failures_rotate_and_penalize() {
    let clients = [ClientMock::new("bad", true), ClientMock::new("good", false)];
    let pool = pool(&clients);
    // warm up reputation of the bad endpoint so the penalty is visible
    pool.restore(&EndpointInfo {
        url: "http://bad".into(),
        reputation: 5,
        primary: true,
        tested: true,
        usage: vec![],
    });

    let served = pool.call_rpc(|c| Box::pin(c.request())).await.unwrap();
    assert_eq!(served, "good");
    let infos = pool.endpoints();
    assert_eq!(infos[0].reputation, 4);
    assert_eq!(infos[1].reputation, 1);
    assert!(!infos[0].usage[0].success);
}

#[tokio::test]
async fn reputation_floors_at_zero() {
    let clients = [ClientMock::new("bad", true)];
    let pool = pool(&clients);
    let err = pool
        .call_eth(|c| Box::pin(c.request()))
        .await
        .unwrap_err();
    assert!(err.is_stale_endpoint());
    assert_eq!(clients[0].calls(), DEFAULT_MAX_RETRIES);
    assert_eq!(pool.endpoints()[0].reputation, 0);
}

#[tokio::test]
async fn random_selection_tries_distinct_endpoints_first() {
    let clients = [
        ClientMock::new("x", true),
        ClientMock::new("y", true),
        ClientMock::new("z", true),
    ];
    let pool = pool(&clients);
    let _ = pool.call_eth(|c| Box::pin(c.request())).await;
    assert_eq!(
        clients.iter().map(ClientMock::calls).collect::<Vec<_>>(),
        vec![1, 1, 1]
    );
}

#[tokio::test(start_paused = true)]
async fn attempts_time_out() {
    let clients = [
        ClientMock::slow("slow", Duration::from_secs(30)),
        ClientMock::new("fast", false),
    ];
    let pool = pool(&clients);
    let (served, url) = pool
        .call_with(Selection::RoundRobin, |c| Box::pin(c.request()))
        .await
        .unwrap();
    assert_eq!(served, "fast");
    assert_eq!(url, "http://fast");
}

#[tokio::test]
async fn dynamic_add_and_idempotent_close() {
    let pool = pool(&[ClientMock::new("a", false)]);
    assert!(pool.add_endpoint("http://b", ClientMock::new("b", false)));
    assert!(!pool.add_endpoint("http://b", ClientMock::new("b", false)));
    let added = &pool.endpoints()[1];
    assert_eq!(added.reputation, 0);
    assert!(!added.tested);
    assert!(!added.primary);

    pool.close();
    pool.close();
    assert!(pool.is_closed());
    assert!(pool.is_empty());
    let err = pool
        .call_rpc(|c| Box::pin(c.request()))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainCommunicationError::NoClients));
}
