//! HTTP dispatcher for execution services.

use super::{CommandExecutor, DispatchReport};
use crate::config::ExecutionConfig;
use crate::error::DispatchError;
use crate::model::{Command, CommandKind, Side};
use crate::strategy::DEFAULT_TARGET_PLATFORM;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Body of `POST {base_url}/trade`.
#[derive(Debug, Clone, Serialize)]
pub struct TradeRequest<'a> {
    pub account_id: &'a str,
    pub market_id: &'a str,
    pub side: Side,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub shares: Decimal,
    /// `false` asks the service to simulate instead of committing
    pub confirm: bool,
}

impl<'a> TradeRequest<'a> {
    pub fn from_command(command: &'a Command, dry_run: bool) -> Self {
        Self {
            account_id: &command.account_id,
            market_id: &command.market_id,
            side: command.side,
            price: command.price,
            shares: command.shares,
            confirm: !dry_run,
        }
    }
}

/// Routes commands to the execution service for their platform.
pub struct CommandDispatcher {
    http: Client,
    endpoints: HashMap<String, String>,
    dry_run: bool,
}

impl CommandDispatcher {
    /// Create a dispatcher from configuration.
    pub fn new(config: &ExecutionConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let endpoints = config
            .endpoints
            .iter()
            .map(|(platform, url)| (platform.clone(), url.trim_end_matches('/').to_string()))
            .collect();

        Ok(Self {
            http,
            endpoints,
            dry_run: config.dry_run,
        })
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Trade endpoint for `platform`. Tags without a configured endpoint go
    /// to the default platform's service.
    fn trade_url(&self, platform: &str) -> Result<String, DispatchError> {
        let base = match self.endpoints.get(platform) {
            Some(base) => base,
            None => {
                let base = self
                    .endpoints
                    .get(DEFAULT_TARGET_PLATFORM)
                    .ok_or_else(|| DispatchError::UnknownPlatform(platform.to_string()))?;
                warn!(
                    %platform,
                    fallback = DEFAULT_TARGET_PLATFORM,
                    "No endpoint for platform, routing to default service"
                );
                base
            }
        };
        Ok(format!("{base}/trade"))
    }

    /// Send one order to its execution service.
    ///
    /// Returns the service's JSON response. Anything but HTTP 200 is
    /// `Rejected`, carrying the body as JSON when it parses and as a string
    /// otherwise.
    #[instrument(skip(self, command), fields(platform = %command.platform, account = %command.account_id))]
    pub async fn place_order(&self, command: &Command) -> Result<Value, DispatchError> {
        let url = self.trade_url(&command.platform)?;
        let request = TradeRequest::from_command(command, self.dry_run);
        debug!(%url, ?request, "Sending trade request");

        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status != StatusCode::OK {
            let body = serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text));
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&text).map_err(|e| DispatchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl CommandExecutor for CommandDispatcher {
    async fn execute_commands(&self, commands: &[Command]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for command in commands {
            match command.kind {
                CommandKind::PlaceOrder => match self.place_order(command).await {
                    Ok(response) => {
                        info!(
                            platform = %command.platform,
                            account = %command.account_id,
                            market = %command.market_id,
                            side = %command.side,
                            price = %command.price,
                            shares = %command.shares,
                            dry_run = self.dry_run,
                            %response,
                            "Order placed"
                        );
                        report.placed += 1;
                    }
                    Err(e) => {
                        error!(
                            platform = %command.platform,
                            account = %command.account_id,
                            market = %command.market_id,
                            side = %command.side,
                            error = %e,
                            "Failed to place order"
                        );
                        report.failed += 1;
                    }
                },
                CommandKind::CancelOrder => {
                    warn!(
                        platform = %command.platform,
                        account = %command.account_id,
                        market = %command.market_id,
                        "cancel_order is not implemented, command not sent"
                    );
                    report.unimplemented += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Document;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(endpoints: &[(&str, &str)], dry_run: bool) -> ExecutionConfig {
        ExecutionConfig {
            dry_run,
            request_timeout_secs: 5,
            endpoints: endpoints
                .iter()
                .map(|(p, u)| (p.to_string(), u.to_string()))
                .collect(),
        }
    }

    fn order(platform: &str, account: &str) -> Command {
        Command {
            kind: CommandKind::PlaceOrder,
            platform: platform.to_string(),
            account_id: account.to_string(),
            market_id: "M1".to_string(),
            side: Side::No,
            price: dec!(0.60),
            shares: dec!(10),
            metadata: Document::new().with("original_fill", "1-0"),
        }
    }

    // =========================================================================
    // Request Shape
    // =========================================================================

    #[tokio::test]
    async fn test_place_order_posts_trade_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/trade"))
            .and(body_json(json!({
                "account_id": "B",
                "market_id": "M1",
                "side": "no",
                "price": 0.6,
                "shares": 10.0,
                "confirm": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"order_id": "o-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher =
            CommandDispatcher::new(&config_for(&[("predict", server.uri().as_str())], false)).unwrap();
        let response = dispatcher.place_order(&order("predict", "B")).await.unwrap();

        assert_eq!(response, json!({"order_id": "o-1"}));
    }

    #[tokio::test]
    async fn test_dry_run_sends_confirm_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/trade"))
            .and(body_partial_json(json!({"confirm": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"simulated": true})))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher =
            CommandDispatcher::new(&config_for(&[("predict", server.uri().as_str())], true)).unwrap();
        assert!(dispatcher.is_dry_run());

        let report = dispatcher.execute_commands(&[order("predict", "B")]).await;
        assert_eq!(report.placed, 1);
    }

    #[tokio::test]
    async fn test_routes_by_platform() {
        let predict = MockServer::start().await;
        let polymarket = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/trade"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&predict)
            .await;
        Mock::given(method("POST"))
            .and(path("/trade"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(2)
            .mount(&polymarket)
            .await;

        let poly_base = format!("{}/", polymarket.uri());
        let dispatcher = CommandDispatcher::new(&config_for(
            &[("predict", predict.uri().as_str()), ("polymarket", poly_base.as_str())],
            false,
        ))
        .unwrap();

        let report = dispatcher
            .execute_commands(&[
                order("polymarket", "B"),
                order("predict", "C"),
                order("polymarket", "D"),
            ])
            .await;

        assert_eq!(report.placed, 3);
    }

    // =========================================================================
    // Failure Isolation
    // =========================================================================

    #[tokio::test]
    async fn test_rejection_does_not_stop_later_commands() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/trade"))
            .and(body_partial_json(json!({"account_id": "bad"})))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"detail": "no market"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/trade"))
            .and(body_partial_json(json!({"account_id": "good"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher =
            CommandDispatcher::new(&config_for(&[("predict", server.uri().as_str())], false)).unwrap();
        let report = dispatcher
            .execute_commands(&[order("predict", "bad"), order("predict", "good")])
            .await;

        assert_eq!(
            report,
            DispatchReport {
                placed: 1,
                failed: 1,
                unimplemented: 0
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_body_is_decoded_best_effort() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/trade"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let dispatcher =
            CommandDispatcher::new(&config_for(&[("predict", server.uri().as_str())], false)).unwrap();
        let err = dispatcher.place_order(&order("predict", "B")).await.unwrap_err();

        match err {
            DispatchError::Rejected { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, json!("upstream down"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_success_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/trade"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .mount(&server)
            .await;

        let dispatcher =
            CommandDispatcher::new(&config_for(&[("predict", server.uri().as_str())], false)).unwrap();
        let err = dispatcher.place_order(&order("predict", "B")).await.unwrap_err();

        assert!(matches!(err, DispatchError::Decode(_)));
    }

    #[tokio::test]
    async fn test_unmatched_platform_falls_back_to_predict() {
        let predict = MockServer::start().await;
        let polymarket = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/trade"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(3)
            .mount(&predict)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&polymarket)
            .await;

        let dispatcher = CommandDispatcher::new(&config_for(
            &[
                ("predict", predict.uri().as_str()),
                ("polymarket", polymarket.uri().as_str()),
            ],
            false,
        ))
        .unwrap();

        let report = dispatcher
            .execute_commands(&[order("", "B"), order("Predict", "C"), order("kalshi", "D")])
            .await;

        assert_eq!(report.placed, 3);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_unknown_platform_without_default_is_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let dispatcher =
            CommandDispatcher::new(&config_for(&[("polymarket", server.uri().as_str())], false))
                .unwrap();

        let err = dispatcher.place_order(&order("kalshi", "B")).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownPlatform(ref p) if p == "kalshi"));

        let report = dispatcher.execute_commands(&[order("kalshi", "B")]).await;
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_transport_error_is_counted() {
        // Nothing listens on port 9 locally
        let dispatcher =
            CommandDispatcher::new(&config_for(&[("predict", "http://127.0.0.1:9")], false))
                .unwrap();

        let err = dispatcher.place_order(&order("predict", "B")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
    }

    #[tokio::test]
    async fn test_cancel_order_is_unimplemented() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let dispatcher =
            CommandDispatcher::new(&config_for(&[("predict", server.uri().as_str())], false)).unwrap();
        let mut cancel = order("predict", "B");
        cancel.kind = CommandKind::CancelOrder;

        let report = dispatcher.execute_commands(&[cancel]).await;

        assert_eq!(report.unimplemented, 1);
        assert_eq!(report.total(), 1);
    }
}
