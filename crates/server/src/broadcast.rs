use std::time::Duration;

use async_trait::async_trait;
use deckhand_core::broadcast::{BroadcastClient, BroadcastError, Track};
use reqwest::StatusCode;
use serde::Serialize;

/// JSON adapter for the broadcast control service.
pub struct HttpBroadcastClient {
    http: reqwest::Client,
    endpoint_url: String,
}

#[derive(Serialize)]
struct AutomationBody {
    enabled: bool,
}

impl HttpBroadcastClient {
    pub fn new(endpoint_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("deckhand/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { http, endpoint_url: endpoint_url.trim_end_matches('/').to_owned() })
    }
}

fn unavailable(error: reqwest::Error) -> BroadcastError {
    BroadcastError::Unavailable(error.to_string())
}

#[async_trait]
impl BroadcastClient for HttpBroadcastClient {
    async fn list_tracks(&self) -> Result<Vec<Track>, BroadcastError> {
        let response = self
            .http
            .get(format!("{}/tracks", self.endpoint_url))
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?;
        response.json().await.map_err(|error| BroadcastError::InvalidResponse(error.to_string()))
    }

    async fn set_automation(&self, track_id: i32, enabled: bool) -> Result<Track, BroadcastError> {
        let response = self
            .http
            .put(format!("{}/tracks/{track_id}/automation", self.endpoint_url))
            .json(&AutomationBody { enabled })
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BroadcastError::TrackNotFound(track_id));
        }
        let response = response.error_for_status().map_err(unavailable)?;
        response.json().await.map_err(|error| BroadcastError::InvalidResponse(error.to_string()))
    }

    async fn move_scene_to_next(&self, track_id: i32) -> Result<(), BroadcastError> {
        let response = self
            .http
            .post(format!("{}/tracks/{track_id}/scene/next", self.endpoint_url))
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BroadcastError::TrackNotFound(track_id));
        }
        response.error_for_status().map(drop).map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use deckhand_core::broadcast::{BroadcastClient, BroadcastError, Track};
    use httpmock::prelude::*;
    use serde_json::json;

    use super::HttpBroadcastClient;

    fn client(server: &MockServer) -> HttpBroadcastClient {
        HttpBroadcastClient::new(&server.base_url(), Duration::from_secs(5)).expect("client")
    }

    #[tokio::test]
    async fn list_tracks_decodes_the_service_payload() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/tracks");
                then.status(200).json_body(json!([
                    { "id": 1, "name": "morning", "enabled": true },
                    { "id": 2, "name": "evening", "enabled": false }
                ]));
            })
            .await;

        let tracks = client(&server).list_tracks().await.expect("tracks");

        assert_eq!(
            tracks,
            vec![
                Track { id: 1, name: "morning".to_owned(), enabled: true },
                Track { id: 2, name: "evening".to_owned(), enabled: false },
            ]
        );
    }

    #[tokio::test]
    async fn set_automation_puts_the_flag() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT).path("/tracks/1/automation").json_body(json!({ "enabled": false }));
                then.status(200).json_body(json!({ "id": 1, "name": "morning", "enabled": false }));
            })
            .await;

        let track = client(&server).set_automation(1, false).await.expect("updated");

        assert!(!track.enabled);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_track_maps_to_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/tracks/9/automation");
                then.status(404);
            })
            .await;

        let error = client(&server).set_automation(9, true).await.expect_err("404");
        assert_eq!(error, BroadcastError::TrackNotFound(9));
    }

    #[tokio::test]
    async fn move_scene_to_next_posts_to_the_track() {
        let server = MockServer::start_async().await;
        let next = server
            .mock_async(|when, then| {
                when.method(POST).path("/tracks/2/scene/next");
                then.status(204);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/tracks/9/scene/next");
                then.status(404);
            })
            .await;

        let client = client(&server);
        client.move_scene_to_next(2).await.expect("moved");
        assert_eq!(client.move_scene_to_next(9).await, Err(BroadcastError::TrackNotFound(9)));
        next.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_are_unavailable_and_bad_payloads_invalid() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/tracks");
                then.status(503);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/tracks/1/automation");
                then.status(200).body("not json");
            })
            .await;

        let client = client(&server);
        assert!(matches!(client.list_tracks().await, Err(BroadcastError::Unavailable(_))));
        assert!(matches!(
            client.set_automation(1, true).await,
            Err(BroadcastError::InvalidResponse(_))
        ));
    }
}
