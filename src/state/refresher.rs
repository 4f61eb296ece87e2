use crate::state::messages::NetworkRequest;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;

/// Background poll of the tournament snapshot. The initial load is requested
/// separately on startup.
pub struct PeriodicRefresher {
    network_requests: mpsc::Sender<NetworkRequest>,
    every: Duration,
}

impl PeriodicRefresher {
    pub fn new(network_requests: mpsc::Sender<NetworkRequest>, every: Duration) -> Self {
        Self { network_requests, every }
    }

    pub async fn run(self) {
        let mut poll_interval = interval(self.every);
        // Skip the immediate first tick so startup loading isn't double-triggered.
        poll_interval.tick().await;

        loop {
            poll_interval.tick().await;
            if self
                .network_requests
                .send(NetworkRequest::RefreshSnapshot)
                .await
                .is_err()
            {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn polls_after_each_interval_but_not_on_startup() {
        let (tx, mut rx) = mpsc::channel(4);
        let task = tokio::spawn(PeriodicRefresher::new(tx, Duration::from_secs(30)).run());

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(matches!(rx.recv().await, Some(NetworkRequest::RefreshSnapshot)));
        task.abort();
    }
}
