#![allow(missing_docs)]
#![allow(clippy::too_many_arguments)]

use ethers::contract::{abigen, EthEvent};
use ethers::types::{Address, U256};

abigen!(
    HyperionBridgeInternal,
    r#"[
        struct ValsetArgs { address[] validators; uint256[] powers; uint256 valsetNonce; uint256 rewardAmount; address rewardToken; }
        function initialize(bytes32 hyperionId, uint256 powerThreshold, address[] validators, uint256[] powers)
        function updateValset(ValsetArgs newValset, ValsetArgs currentValset, uint8[] v, bytes32[] r, bytes32[] s)
        function submitBatch(ValsetArgs currentValset, uint8[] v, bytes32[] r, bytes32[] s, uint256[] amounts, address[] destinations, uint256[] fees, uint256 batchNonce, address tokenContract, uint256 batchTimeout)
        function sendToCosmos(address tokenContract, bytes32 destination, uint256 amount)
        function deployERC20(string cosmosDenom, string name, string symbol, uint8 decimals)
        function emergencyPause()
        function emergencyUnpause()
        function paused() view returns (bool)
        function state_lastValsetNonce() view returns (uint256)
        function state_lastValsetCheckpoint() view returns (bytes32)
        function state_lastEventNonce() view returns (uint256)
        function state_lastEventHeight() view returns (uint256)
        function state_lastValsetHeight() view returns (uint256)
        function state_hyperionId() view returns (bytes32)
        function lastBatchNonce(address erc20Address) view returns (uint256)
    ]"#
);

abigen!(
    Erc20,
    r#"[
        function approve(address spender, uint256 amount) returns (bool)
        function allowance(address owner, address spender) view returns (uint256)
        function symbol() view returns (string)
        function decimals() view returns (uint8)
    ]"#
);

/// `decimals()` selector, called raw so non-standard tokens still answer.
pub const DECIMALS_SELECTOR: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(
    name = "SendToHeliosEvent",
    abi = "SendToHeliosEvent(address,address,bytes32,uint256,uint256,string)"
)]
pub struct SendToHeliosEventFilter {
    #[ethevent(indexed)]
    pub token_contract: Address,
    #[ethevent(indexed)]
    pub sender: Address,
    #[ethevent(indexed)]
    pub destination: [u8; 32],
    pub amount: U256,
    pub event_nonce: U256,
    pub data: String,
}

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(
    name = "TransactionBatchExecutedEvent",
    abi = "TransactionBatchExecutedEvent(uint256,address,uint256)"
)]
pub struct TransactionBatchExecutedEventFilter {
    #[ethevent(indexed)]
    pub batch_nonce: U256,
    #[ethevent(indexed)]
    pub token: Address,
    pub event_nonce: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(
    name = "ValsetUpdatedEvent",
    abi = "ValsetUpdatedEvent(uint256,uint256,uint256,address,address[],uint256[])"
)]
pub struct ValsetUpdatedEventFilter {
    #[ethevent(indexed)]
    pub new_valset_nonce: U256,
    pub event_nonce: U256,
    pub reward_amount: U256,
    pub reward_token: Address,
    pub validators: Vec<Address>,
    pub powers: Vec<U256>,
}

#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(
    name = "ERC20DeployedEvent",
    abi = "ERC20DeployedEvent(string,address,string,string,uint8,uint256)"
)]
pub struct Erc20DeployedEventFilter {
    pub cosmos_denom: String,
    #[ethevent(indexed)]
    pub token_contract: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub event_nonce: U256,
}
