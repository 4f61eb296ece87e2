use crate::session::MatchWrite;
use crate::state::messages::{NetworkRequest, NetworkResponse};
use log::{debug, error};
use matchday_api::client::{ApiResult, TournamentApi};
use matchday_api::MatchStats;
use tokio::sync::mpsc;

pub struct NetworkWorker {
    client: TournamentApi,
    requests: mpsc::Receiver<NetworkRequest>,
    responses: mpsc::Sender<NetworkResponse>,
}

impl NetworkWorker {
    pub fn new(
        client: TournamentApi,
        requests: mpsc::Receiver<NetworkRequest>,
        responses: mpsc::Sender<NetworkResponse>,
    ) -> Self {
        Self { client, requests, responses }
    }

    pub async fn run(mut self) {
        while let Some(request) = self.requests.recv().await {
            let result = match request {
                NetworkRequest::LoadSnapshot => Ok(self.handle_load_snapshot().await),
                NetworkRequest::RefreshSnapshot => self.handle_refresh_snapshot().await,
                NetworkRequest::WriteMatch { token, match_id, write } => {
                    Ok(self.handle_write(token, &match_id, &write).await)
                }
                NetworkRequest::UpdateStats { match_id, stats } => {
                    self.handle_update_stats(match_id, &stats).await
                }
            };

            debug!("network request complete");
            let response = result.unwrap_or_else(|err| NetworkResponse::Error {
                message: err.to_string(),
            });

            if let Err(e) = self.responses.send(response).await {
                error!("Failed to send network response: {e}");
                break;
            }
        }
    }

    async fn handle_load_snapshot(&self) -> NetworkResponse {
        debug!("loading tournament from {}", self.client.base_url());
        match self.client.fetch_snapshot().await {
            Ok(snapshot) => NetworkResponse::SnapshotLoaded { snapshot },
            Err(e) => NetworkResponse::LoadFailed { message: e.to_string() },
        }
    }

    async fn handle_refresh_snapshot(&self) -> ApiResult<NetworkResponse> {
        debug!("refreshing tournament");
        let snapshot = self.client.fetch_snapshot().await?;
        Ok(NetworkResponse::SnapshotRefreshed { snapshot })
    }

    /// Writes always settle: the session needs the outcome to confirm or roll back.
    async fn handle_write(
        &self,
        token: u64,
        match_id: &str,
        write: &MatchWrite,
    ) -> NetworkResponse {
        debug!("write {token} for match {match_id}");
        let result = match write {
            MatchWrite::Update(update) => self.client.update_match(match_id, update).await,
            MatchWrite::Status { status, minute, event } => {
                self.client
                    .update_match_status(match_id, *status, *minute, event.as_ref())
                    .await
            }
        };
        NetworkResponse::WriteSettled {
            token,
            result: result.map_err(|e| e.to_string()),
        }
    }

    async fn handle_update_stats(
        &self,
        match_id: String,
        stats: &MatchStats,
    ) -> ApiResult<NetworkResponse> {
        debug!("saving stats for match {match_id}");
        self.client.update_match_stats(&match_id, stats).await?;
        Ok(NetworkResponse::StatsSaved { match_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchday_api::{EventKind, MatchEvent, MatchStatus};
    use mockito::Matcher;
    use serde_json::json;

    async fn exchange(server: &mockito::Server, request: NetworkRequest) -> NetworkResponse {
        let (req_tx, req_rx) = mpsc::channel(1);
        let (resp_tx, mut resp_rx) = mpsc::channel(1);
        let client = TournamentApi::new().with_base_url(server.url());
        let worker = tokio::spawn(NetworkWorker::new(client, req_rx, resp_tx).run());
        req_tx.send(request).await.unwrap();
        let response = resp_rx.recv().await.unwrap();
        worker.abort();
        response
    }

    #[tokio::test]
    async fn card_write_settles_with_the_updated_match() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/matches/m1/status")
            .match_body(Matcher::PartialJson(json!({
                "status": "live",
                "minute": 33,
                "event": { "type": "yellow_card", "team": "away" }
            })))
            .with_header("content-type", "application/json")
            .with_body(r#"{"_id":"m1","homeTeamId":"home","awayTeamId":"away","status":"live"}"#)
            .create_async()
            .await;

        let event = MatchEvent {
            id: "event1".into(),
            kind: Some(EventKind::YellowCard),
            player_id: "a1".into(),
            player_name: "Dee".into(),
            team: Some("away".into()),
            minute: 33,
            description: "Yellow card for Dee".into(),
            out_player_id: None,
        };
        let write =
            MatchWrite::Status { status: MatchStatus::Live, minute: 33, event: Some(event) };
        let request = NetworkRequest::WriteMatch { token: 4, match_id: "m1".into(), write };
        let response = exchange(&server, request).await;

        mock.assert_async().await;
        let NetworkResponse::WriteSettled { token, result } = response else {
            panic!("expected a settled write, got {response:?}");
        };
        assert_eq!(token, 4);
        assert_eq!(result.unwrap().id, "m1");
    }

    #[tokio::test]
    async fn failed_write_still_settles() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/matches/m1")
            .with_status(500)
            .create_async()
            .await;

        let write = MatchWrite::Update(Default::default());
        let request = NetworkRequest::WriteMatch { token: 9, match_id: "m1".into(), write };
        let response = exchange(&server, request).await;

        let NetworkResponse::WriteSettled { token: 9, result: Err(message) } = response else {
            panic!("expected a failed write, got {response:?}");
        };
        assert!(message.contains("500"), "{message}");
    }

    #[tokio::test]
    async fn rejected_poll_is_an_error_not_an_empty_tournament() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/tournament")
            .with_status(429)
            .create_async()
            .await;

        let response = exchange(&server, NetworkRequest::RefreshSnapshot).await;
        let NetworkResponse::Error { message } = response else {
            panic!("expected an error, got {response:?}");
        };
        assert!(message.contains("429"), "{message}");
    }

    #[tokio::test]
    async fn unreachable_service_fails_the_initial_load() {
        let server = mockito::Server::new_async().await;
        let url = server.url();
        drop(server);

        let (req_tx, req_rx) = mpsc::channel(1);
        let (resp_tx, mut resp_rx) = mpsc::channel(1);
        let client = TournamentApi::new().with_base_url(url);
        tokio::spawn(NetworkWorker::new(client, req_rx, resp_tx).run());
        req_tx.send(NetworkRequest::LoadSnapshot).await.unwrap();

        assert!(matches!(resp_rx.recv().await, Some(NetworkResponse::LoadFailed { .. })));
    }
}
