//! `/api/query`: read queries on GET, operator commands on POST. The
//! `type` query parameter selects the handler, POST bodies are JSON.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::{routing, Json, Router};
use cosmrs::proto::cosmos::base::v1beta1::Coin;
use derive_new::new;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use hyperion_base::{ApiError, ApiResult, ApiSuccess};
use hyperion_core::utils::parse_address;
use hyperion_core::{
    BridgeContract, ChainId, CounterpartyChainParams, HomeChain, HyperionId, POWER_THRESHOLD,
    U256,
};

use crate::instance::DEFAULT_BLOCKS_TO_SEARCH;
use crate::loops::latest_eth_valset;
use crate::orchestrator::{operative_chains, InstanceManager};

const QUERY_PATH: &str = "/api/query";

#[derive(Debug, Clone, Deserialize)]
struct QueryParams {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    chain_id: Option<ChainId>,
}

#[derive(Debug, Deserialize)]
struct ChainBody {
    chain_id: ChainId,
}

#[derive(Debug, Deserialize)]
struct HyperionBody {
    hyperion_id: HyperionId,
}

#[derive(Debug, Deserialize)]
struct CoinBody {
    denom: String,
    amount: String,
}

impl From<CoinBody> for Coin {
    fn from(coin: CoinBody) -> Self {
        Coin {
            denom: coin.denom,
            amount: coin.amount,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProposeBody {
    params: CounterpartyChainParams,
    deposit: CoinBody,
}

#[derive(Debug, Deserialize)]
struct VoteBody {
    proposal_id: u64,
}

#[derive(Debug, Deserialize)]
struct ChainSettingsBody {
    chain_id: ChainId,
    settings: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct SendToChainBody {
    dest_chain_id: ChainId,
    dest: String,
    amount: CoinBody,
    bridge_fee: CoinBody,
}

#[derive(Debug, Deserialize)]
struct SendToHomeBody {
    chain_id: ChainId,
    token: String,
    amount: String,
    /// Hex address credited on the home chain, this orchestrator by default
    #[serde(default)]
    recipient: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeployErc20Body {
    chain_id: ChainId,
    denom: String,
    name: String,
    symbol: String,
    decimals: u8,
}

fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|err| ApiError::bad_request(format!("invalid body: {err}")))
}

fn required_chain(params: &QueryParams) -> Result<ChainId, ApiError> {
    params
        .chain_id
        .ok_or_else(|| ApiError::bad_request(format!("{} requires chain_id", params.kind)))
}

fn unknown(kind: &str) -> ApiError {
    ApiError::bad_request(format!("unknown query type {kind}"))
}

/// The admin routes of the orchestrator.
#[derive(new, Clone, Debug)]
pub struct AdminApi {
    manager: Arc<InstanceManager>,
}

impl AdminApi {
    pub fn router(&self) -> Router {
        Router::new()
            .route(QUERY_PATH, routing::get(query).post(command))
            .with_state(self.clone())
    }
}

async fn query(State(api): State<AdminApi>, Query(params): Query<QueryParams>) -> ApiResult {
    let manager = &api.manager;
    match params.kind.as_str() {
        "stats" => ApiSuccess::new(manager.stats()),
        "list-operative-chains" => {
            ApiSuccess::new(operative_chains(manager.home().as_ref()).await?)
        }
        "chain-settings" => {
            ApiSuccess::new(manager.data_dir().chain_settings(required_chain(&params)?)?)
        }
        "fees" => ApiSuccess::new(manager.data_dir().fees(params.chain_id)?),
        "rpcs" => ApiSuccess::new(manager.rpcs(required_chain(&params)?)),
        "paused" => {
            let bridge = manager.bridge(required_chain(&params)?).await?;
            ApiSuccess::new(bridge.paused().await?)
        }
        other => Err(unknown(other)),
    }
}

async fn command(
    State(api): State<AdminApi>,
    Query(params): Query<QueryParams>,
    Json(body): Json<Value>,
) -> ApiResult {
    let manager = &api.manager;
    let home = manager.home();
    info!(kind = %params.kind, "Admin command");
    match params.kind.as_str() {
        "run-hyperion" => {
            let ChainBody { chain_id } = parse_body(body)?;
            ApiSuccess::new(manager.start(chain_id).await?)
        }
        "stop-hyperion" => {
            let ChainBody { chain_id } = parse_body(body)?;
            if !manager.stop(chain_id).await? {
                return Err(ApiError::bad_request(format!(
                    "no hyperion instance running for chain {chain_id}"
                )));
            }
            ApiSuccess::new(chain_id)
        }
        "register-hyperion" => {
            let HyperionBody { hyperion_id } = parse_body(body)?;
            ApiSuccess::new(home.set_orchestrator_addresses(hyperion_id).await?)
        }
        "deploy-hyperion" => {
            let ChainBody { chain_id } = parse_body(body)?;
            let params = manager.counterparty_params(chain_id).await?;
            let valset = home.current_valset(params.hyperion_id).await?;
            let bridge = manager.bridge(chain_id).await?;
            ApiSuccess::new(
                bridge
                    .initialize(params.hyperion_id, POWER_THRESHOLD, &valset)
                    .await?,
            )
        }
        "propose-hyperion" => {
            let ProposeBody { params, deposit } = parse_body(body)?;
            ApiSuccess::new(
                home.propose_counterparty_chain(&params, deposit.into())
                    .await?,
            )
        }
        "vote-proposal" => {
            let VoteBody { proposal_id } = parse_body(body)?;
            ApiSuccess::new(home.vote_yes(proposal_id).await?)
        }
        "set-chain-settings" => {
            let ChainSettingsBody { chain_id, settings } = parse_body(body)?;
            let merged = manager.data_dir().set_chain_settings(chain_id, &settings)?;
            if manager.is_running(chain_id) {
                info!(chain_id, "Chain settings apply on the next start of the instance");
            }
            ApiSuccess::new(merged)
        }
        "pause-hyperion" => {
            let ChainBody { chain_id } = parse_body(body)?;
            ApiSuccess::new(manager.bridge(chain_id).await?.emergency_pause().await?)
        }
        "unpause-hyperion" => {
            let ChainBody { chain_id } = parse_body(body)?;
            ApiSuccess::new(manager.bridge(chain_id).await?.emergency_unpause().await?)
        }
        "force-set-valset" => {
            let ChainBody { chain_id } = parse_body(body)?;
            let params = manager.counterparty_params(chain_id).await?;
            let bridge = manager.bridge(chain_id).await?;
            let valset = latest_eth_valset(
                bridge.as_ref(),
                params.bridge_contract_start_height,
                DEFAULT_BLOCKS_TO_SEARCH,
            )
            .await?
            .ok_or_else(|| ApiError::internal("no valset update found on the contract"))?;
            let last_nonce = bridge.state_last_event_nonce().await?;
            let last_height = bridge.state_last_event_height().await?;
            ApiSuccess::new(
                home.force_set_valset(params.hyperion_id, &valset, last_nonce, last_height)
                    .await?,
            )
        }
        "send-to-chain" => {
            let SendToChainBody {
                dest_chain_id,
                dest,
                amount,
                bridge_fee,
            } = parse_body(body)?;
            ApiSuccess::new(
                home.send_to_chain(dest_chain_id, &dest, amount.into(), bridge_fee.into())
                    .await?,
            )
        }
        "send-to-home" => {
            let SendToHomeBody {
                chain_id,
                token,
                amount,
                recipient,
            } = parse_body(body)?;
            let token = parse_address(&token).map_err(|e| ApiError::bad_request(e.to_string()))?;
            let amount = U256::from_dec_str(&amount)
                .map_err(|e| ApiError::bad_request(format!("invalid amount: {e}")))?;
            let recipient = match recipient {
                Some(recipient) => parse_address(&recipient)
                    .map_err(|e| ApiError::bad_request(e.to_string()))?,
                None => home.eth_address(),
            };
            let bridge = manager.bridge(chain_id).await?;
            ApiSuccess::new(
                bridge
                    .send_to_home(token, amount, recipient.as_bytes())
                    .await?,
            )
        }
        "deploy-erc20" => {
            let DeployErc20Body {
                chain_id,
                denom,
                name,
                symbol,
                decimals,
            } = parse_body(body)?;
            let bridge = manager.bridge(chain_id).await?;
            ApiSuccess::new(
                bridge
                    .deploy_erc20(&denom, &name, &symbol, decimals)
                    .await?,
            )
        }
        other => Err(unknown(other)),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use hyperion_base::ApiResponse;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::test_utils::offline_manager;

    async fn call(
        api: &AdminApi,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, ApiResponse) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let body = match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        };
        let response = api
            .router()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn api() -> AdminApi {
        AdminApi::new(offline_manager())
    }

    #[tokio::test]
    async fn unknown_types_are_rejected() {
        let api = api();
        let (status, response) = call(&api, Method::GET, "/api/query?type=nope", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("unknown query type nope"));

        let (status, _) = call(
            &api,
            Method::POST,
            "/api/query?type=launch-missiles",
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stats_are_empty_without_instances() {
        let (status, response) = call(&api(), Method::GET, "/api/query?type=stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(response.success);
        assert_eq!(response.data, Some(json!([])));
    }

    #[tokio::test]
    async fn chain_settings_roundtrip() {
        let api = api();
        let (status, response) = call(
            &api,
            Method::POST,
            "/api/query?type=set-chain-settings",
            Some(json!({"chain_id": 97, "settings": {"min_batch_fee_usd": 25.0}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{response:?}");

        let (_, response) = call(
            &api,
            Method::GET,
            "/api/query?type=chain-settings&chain_id=97",
            None,
        )
        .await;
        let data = response.data.unwrap();
        assert_eq!(data["min_batch_fee_usd"], json!(25.0));
        assert_eq!(data["batch_offset_dur"], json!("2m"));
    }

    #[tokio::test]
    async fn invalid_chain_settings_are_a_bad_request() {
        let (status, response) = call(
            &api(),
            Method::POST,
            "/api/query?type=set-chain-settings",
            Some(json!({"chain_id": 97, "settings": {"valset_offset_dur": "soon"}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn missing_arguments_are_reported() {
        let api = api();
        let (status, response) =
            call(&api, Method::GET, "/api/query?type=chain-settings", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.error.as_deref(),
            Some("chain-settings requires chain_id")
        );

        let (status, _) = call(
            &api,
            Method::POST,
            "/api/query?type=run-hyperion",
            Some(json!({"hyperion_id": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stopping_an_idle_chain_is_a_bad_request() {
        let (status, response) = call(
            &api(),
            Method::POST,
            "/api/query?type=stop-hyperion",
            Some(json!({"chain_id": 97})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.error.as_deref(),
            Some("no hyperion instance running for chain 97")
        );
    }

    #[tokio::test]
    async fn fee_ledger_starts_empty() {
        let (status, response) =
            call(&api(), Method::GET, "/api/query?type=fees&chain_id=97", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.data, Some(json!([])));
    }
}
