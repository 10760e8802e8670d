//! JSON-RPC client for a Lotus node.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use serde::{
    de::{DeserializeOwned, IgnoredAny},
    Deserialize, Serialize,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{FilterEstimate, MinerBalances, NodeClient, RpcError, RpcResult};
use crate::{
    amount::TokenAmount,
    bitfield::SectorSample,
    config::NodeConfig,
    error::{FipDataError, Result},
    types::{
        ChainEpoch, MinerId, MinerSectorCount, Partition, SectorOnChainInfo, TipSet, TipSetKey,
    },
};

/// ID address of the reward actor.
const REWARD_ACTOR: &str = "f02";

/// ID address of the storage power actor.
const POWER_ACTOR: &str = "f04";

/// JSON-RPC 2.0 request
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// `StateReadState` envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ActorState<S> {
    balance: TokenAmount,
    state: S,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MinerState {
    locked_funds: TokenAmount,
    initial_pledge: TokenAmount,
    fee_debt: TokenAmount,
    pre_commit_deposits: TokenAmount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RewardState {
    this_epoch_reward_smoothed: FilterEstimate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PowerState {
    #[serde(rename = "ThisEpochQAPowerSmoothed")]
    this_epoch_qa_power_smoothed: FilterEstimate,
}

/// A [`NodeClient`] speaking the Lotus `Filecoin.*` JSON-RPC API over HTTP.
///
/// Every call is bounded by the configured timeout and aborts as soon as
/// the cancellation token fires.
#[derive(Debug)]
pub struct LotusClient {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    timeout: Duration,
    cancel: CancellationToken,
    next_id: AtomicU64,
}

impl LotusClient {
    pub fn new(config: &NodeConfig, cancel: CancellationToken) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| FipDataError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            token: config.lotus_token.clone(),
            timeout: config.rpc_timeout,
            cancel,
            next_id: AtomicU64::new(1),
        })
    }

    /// The HTTP endpoint requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> RpcResult<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RpcError::Cancelled),
            res = tokio::time::timeout(self.timeout, self.call_once(method, params)) => {
                res.unwrap_or(Err(RpcError::Timeout(self.timeout)))
            }
        }
    }

    async fn call_once<T: DeserializeOwned>(&self, method: &str, params: Value) -> RpcResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };
        trace!("rpc #{id} {method}");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RpcError::Http(response.status().as_u16()));
        }

        let json_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))?;

        if let Some(error) = json_response.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        match json_response.result {
            Some(value) => {
                serde_json::from_value(value).map_err(|e| RpcError::Decode(e.to_string()))
            }
            // A null result is fine for callers expecting an Option.
            None => serde_json::from_value(Value::Null).map_err(|_| RpcError::MissingResult),
        }
    }
}

#[async_trait]
impl NodeClient for LotusClient {
    async fn chain_head(&self) -> RpcResult<TipSet> {
        self.call("Filecoin.ChainHead", json!([])).await
    }

    async fn tipset_by_height(&self, height: ChainEpoch) -> RpcResult<TipSet> {
        self.call(
            "Filecoin.ChainGetTipSetByHeight",
            json!([height, TipSetKey::empty()]),
        )
        .await
    }

    async fn list_miners(&self, tsk: &TipSetKey) -> RpcResult<Vec<MinerId>> {
        let miners: Option<Vec<MinerId>> =
            self.call("Filecoin.StateListMiners", json!([tsk])).await?;
        Ok(miners.unwrap_or_default())
    }

    async fn miner_sector_count(
        &self,
        miner: &MinerId,
        tsk: &TipSetKey,
    ) -> RpcResult<MinerSectorCount> {
        self.call("Filecoin.StateMinerSectorCount", json!([miner, tsk]))
            .await
    }

    async fn miner_deadline_count(&self, miner: &MinerId, tsk: &TipSetKey) -> RpcResult<u64> {
        let deadlines: Option<Vec<IgnoredAny>> = self
            .call("Filecoin.StateMinerDeadlines", json!([miner, tsk]))
            .await?;
        Ok(deadlines.map_or(0, |d| d.len() as u64))
    }

    async fn miner_partitions(
        &self,
        miner: &MinerId,
        deadline: u64,
        tsk: &TipSetKey,
    ) -> RpcResult<Vec<Partition>> {
        let partitions: Option<Vec<Partition>> = self
            .call("Filecoin.StateMinerPartitions", json!([miner, deadline, tsk]))
            .await?;
        Ok(partitions.unwrap_or_default())
    }

    async fn miner_sectors(
        &self,
        miner: &MinerId,
        selector: Option<&SectorSample>,
        tsk: &TipSetKey,
    ) -> RpcResult<Vec<SectorOnChainInfo>> {
        let sectors: Option<Vec<SectorOnChainInfo>> = self
            .call("Filecoin.StateMinerSectors", json!([miner, selector, tsk]))
            .await?;
        Ok(sectors.unwrap_or_default())
    }

    async fn miner_available_balance(
        &self,
        miner: &MinerId,
        tsk: &TipSetKey,
    ) -> RpcResult<TokenAmount> {
        self.call("Filecoin.StateMinerAvailableBalance", json!([miner, tsk]))
            .await
    }

    async fn miner_balances(&self, miner: &MinerId, tsk: &TipSetKey) -> RpcResult<MinerBalances> {
        let actor: ActorState<MinerState> = self
            .call("Filecoin.StateReadState", json!([miner, tsk]))
            .await?;
        Ok(MinerBalances {
            balance: actor.balance,
            locked_funds: actor.state.locked_funds,
            initial_pledge: actor.state.initial_pledge,
            fee_debt: actor.state.fee_debt,
            pre_commit_deposits: actor.state.pre_commit_deposits,
        })
    }

    async fn reward_estimate(&self, tsk: &TipSetKey) -> RpcResult<FilterEstimate> {
        let actor: ActorState<RewardState> = self
            .call("Filecoin.StateReadState", json!([REWARD_ACTOR, tsk]))
            .await?;
        Ok(actor.state.this_epoch_reward_smoothed)
    }

    async fn network_qa_power_estimate(&self, tsk: &TipSetKey) -> RpcResult<FilterEstimate> {
        let actor: ActorState<PowerState> = self
            .call("Filecoin.StateReadState", json!([POWER_ACTOR, tsk]))
            .await?;
        Ok(actor.state.this_epoch_qa_power_smoothed)
    }

    async fn initial_pledge_for_sector(
        &self,
        duration: ChainEpoch,
        sector_size: u64,
        verified_size: u64,
        tsk: &TipSetKey,
    ) -> RpcResult<TokenAmount> {
        self.call(
            "Filecoin.StateMinerInitialPledgeForSector",
            json!([duration, sector_size, verified_size, tsk]),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CidJson;
    use httpmock::prelude::*;

    fn client_for(server: &MockServer, timeout: Duration) -> (LotusClient, CancellationToken) {
        let cancel = CancellationToken::new();
        let config = NodeConfig {
            lotus_addr: server.url("/rpc/v1"),
            lotus_token: "secret".to_string(),
            rpc_timeout: timeout,
        };
        (LotusClient::new(&config, cancel.clone()).unwrap(), cancel)
    }

    fn tsk() -> TipSetKey {
        TipSetKey(vec![CidJson {
            cid: "bafy2head".to_string(),
        }])
    }

    #[tokio::test]
    async fn test_chain_head_sends_bearer_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/rpc/v1")
                    .header("Authorization", "Bearer secret")
                    .json_body_partial(r#"{"jsonrpc":"2.0","method":"Filecoin.ChainHead"}"#);
                then.status(200).json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {"Cids": [{"/": "bafy2head"}], "Blocks": [], "Height": 4200000}
                }));
            })
            .await;

        let (client, _cancel) = client_for(&server, Duration::from_secs(5));
        let head = client.chain_head().await.unwrap();
        assert_eq!(head.height, 4_200_000);
        assert_eq!(head.key(), tsk());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_miners_parses_ids() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .json_body_partial(r#"{"method":"Filecoin.StateListMiners"}"#);
                then.status(200).json_body(json!({
                    "jsonrpc": "2.0", "id": 1, "result": ["f010", "f09"]
                }));
            })
            .await;

        let (client, _cancel) = client_for(&server, Duration::from_secs(5));
        let miners = client.list_miners(&tsk()).await.unwrap();
        assert_eq!(miners, vec![MinerId::new(10), MinerId::new(9)]);
    }

    #[tokio::test]
    async fn test_null_list_result_is_empty() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .json_body_partial(r#"{"method":"Filecoin.StateMinerPartitions"}"#);
                then.status(200)
                    .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": null}));
            })
            .await;

        let (client, _cancel) = client_for(&server, Duration::from_secs(5));
        let partitions = client
            .miner_partitions(&MinerId::new(1000), 3, &tsk())
            .await
            .unwrap();
        assert!(partitions.is_empty());
    }

    #[tokio::test]
    async fn test_null_required_result_is_missing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200)
                    .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": null}));
            })
            .await;

        let (client, _cancel) = client_for(&server, Duration::from_secs(5));
        assert_eq!(
            client.chain_head().await.unwrap_err(),
            RpcError::MissingResult
        );
    }

    #[tokio::test]
    async fn test_rpc_error_object() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": {"code": 1, "message": "actor not found"}
                }));
            })
            .await;

        let (client, _cancel) = client_for(&server, Duration::from_secs(5));
        let err = client
            .miner_sector_count(&MinerId::new(1234), &tsk())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RpcError::Rpc {
                code: 1,
                message: "actor not found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(500);
            })
            .await;

        let (client, _cancel) = client_for(&server, Duration::from_secs(5));
        assert_eq!(client.chain_head().await.unwrap_err(), RpcError::Http(500));
    }

    #[tokio::test]
    async fn test_call_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200)
                    .delay(Duration::from_secs(2))
                    .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": []}));
            })
            .await;

        let timeout = Duration::from_millis(100);
        let (client, _cancel) = client_for(&server, timeout);
        assert_eq!(
            client.list_miners(&tsk()).await.unwrap_err(),
            RpcError::Timeout(timeout)
        );
    }

    #[tokio::test]
    async fn test_cancelled_call_fails_fast() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200)
                    .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": []}));
            })
            .await;

        let (client, cancel) = client_for(&server, Duration::from_secs(5));
        cancel.cancel();
        assert_eq!(
            client.list_miners(&tsk()).await.unwrap_err(),
            RpcError::Cancelled
        );
        mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_miner_balances_from_state() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .json_body_partial(r#"{"method":"Filecoin.StateReadState"}"#);
                then.status(200).json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {
                        "Balance": "5000",
                        "Code": {"/": "bafk2miner"},
                        "State": {
                            "LockedFunds": "1000",
                            "InitialPledge": "3000",
                            "FeeDebt": "0",
                            "PreCommitDeposits": "200",
                            "VestingFunds": {"/": "bafy2vest"}
                        }
                    }
                }));
            })
            .await;

        let (client, _cancel) = client_for(&server, Duration::from_secs(5));
        let balances = client
            .miner_balances(&MinerId::new(1234), &tsk())
            .await
            .unwrap();
        assert_eq!(balances.balance, TokenAmount::from(5000));
        assert_eq!(balances.locked_funds, TokenAmount::from(1000));
        assert_eq!(balances.initial_pledge, TokenAmount::from(3000));
        assert!(balances.fee_debt.is_zero());
        assert_eq!(balances.pre_commit_deposits, TokenAmount::from(200));
    }
}
