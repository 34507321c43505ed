use cosmrs::proto::cosmos::base::v1beta1::Coin;
use cosmrs::{AccountId, Any};
use k256::sha2::{Digest, Sha256};
use tracing::{info, instrument};

use hyperion_core::{ChainResult, CounterpartyChainParams, HomeTxResponse, HyperionId, Valset};

use crate::convert::{self, fmt_address};
use crate::proto::{self, gov, to_any};
use crate::{HeliosClient, HeliosError};

/// Address of the module account `name`, which is the authority of
/// module parameter messages.
pub fn module_address(prefix: &str, name: &str) -> Result<String, HeliosError> {
    let hash = Sha256::digest(name.as_bytes());
    Ok(AccountId::new(prefix, &hash[..20])?.to_string())
}

/// Operator facing broadcasts that are not part of the relaying loops.
impl HeliosClient {
    /// Bind this key as orchestrator of `hyperion_id`.
    #[instrument(skip(self))]
    pub async fn set_orchestrator_addresses(
        &self,
        hyperion_id: HyperionId,
    ) -> ChainResult<HomeTxResponse> {
        let address = self.address();
        let msg = proto::MsgSetOrchestratorAddresses {
            sender: address.clone(),
            orchestrator: address,
            eth_address: fmt_address(&self.signer().eth_address()),
            hyperion_id,
        };
        self.broadcast(vec![to_any(&msg)]).await
    }

    /// Remove the orchestrator binding of this key.
    #[instrument(skip(self))]
    pub async fn unset_orchestrator_addresses(
        &self,
        hyperion_id: HyperionId,
    ) -> ChainResult<HomeTxResponse> {
        let msg = proto::MsgUnSetOrchestratorAddresses {
            sender: self.address(),
            eth_address: fmt_address(&self.signer().eth_address()),
            hyperion_id,
        };
        self.broadcast(vec![to_any(&msg)]).await
    }

    /// Overwrite the module's valset and last observed event to match the
    /// counterparty contract.
    #[instrument(skip(self, valset), fields(valset_nonce = valset.nonce))]
    pub async fn force_set_valset(
        &self,
        hyperion_id: HyperionId,
        valset: &Valset,
        last_observed_event_nonce: u64,
        last_observed_height: u64,
    ) -> ChainResult<HomeTxResponse> {
        let msg = proto::MsgForceSetValsetAndLastObservedEventNonce {
            signer: self.address(),
            hyperion_id,
            valset: Some(convert::valset_to_proto(hyperion_id, valset)),
            last_observed_event_nonce,
            last_observed_ethereum_block_height: last_observed_height,
        };
        self.broadcast(vec![to_any(&msg)]).await
    }

    /// Withdraw `amount` to `dest` on the counterparty chain.
    #[instrument(skip(self))]
    pub async fn send_to_chain(
        &self,
        dest_chain_id: u64,
        dest: &str,
        amount: Coin,
        bridge_fee: Coin,
    ) -> ChainResult<HomeTxResponse> {
        let msg = proto::MsgSendToChain {
            sender: self.address(),
            dest_chain_id,
            dest: dest.to_owned(),
            amount: Some(amount),
            bridge_fee: Some(bridge_fee),
        };
        self.broadcast(vec![to_any(&msg)]).await
    }

    /// Submit a governance proposal executing `messages`.
    #[instrument(skip(self, messages), fields(messages = messages.len()))]
    pub async fn submit_proposal(
        &self,
        messages: Vec<Any>,
        title: &str,
        summary: &str,
        deposit: Coin,
    ) -> ChainResult<HomeTxResponse> {
        let msg = gov::MsgSubmitProposal {
            messages,
            initial_deposit: vec![deposit],
            proposer: self.address(),
            metadata: String::new(),
            title: title.to_owned(),
            summary: summary.to_owned(),
            expedited: false,
        };
        let response = self.broadcast(vec![to_any(&msg)]).await?;
        info!(tx_hash = %response.tx_hash, "Submitted proposal");
        Ok(response)
    }

    /// Vote yes on `proposal_id`.
    #[instrument(skip(self))]
    pub async fn vote_yes(&self, proposal_id: u64) -> ChainResult<HomeTxResponse> {
        let msg = gov::MsgVote {
            proposal_id,
            voter: self.address(),
            option: gov::VOTE_OPTION_YES,
            metadata: String::new(),
        };
        self.broadcast(vec![to_any(&msg)]).await
    }

    /// Propose registering a new counterparty chain.
    pub async fn propose_counterparty_chain(
        &self,
        params: &CounterpartyChainParams,
        deposit: Coin,
    ) -> ChainResult<HomeTxResponse> {
        let msg = counterparty_chain_msg(self.conf().prefix(), params)?;
        let title = format!("Add {} to hyperion", params.bridge_chain_name);
        let summary = format!(
            "Register bridge {:?} on chain {} as hyperion id {}",
            params.bridge_contract_address, params.bridge_chain_id, params.hyperion_id
        );
        self.submit_proposal(vec![msg], &title, &summary, deposit)
            .await
    }
}

fn counterparty_chain_msg(prefix: &str, params: &CounterpartyChainParams) -> ChainResult<Any> {
    let msg = proto::MsgAddCounterpartyChainParams {
        authority: module_address(prefix, "gov")?,
        counterparty_chain_params: Some(convert::params_to_proto(params)),
    };
    Ok(to_any(&msg))
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    #[test]
    fn gov_module_address() {
        assert_eq!(
            module_address("cosmos", "gov").unwrap(),
            "cosmos10d07y265gmmuvt4z0w9aw880jnsr700j6zn9kn"
        );
    }

    #[test]
    fn counterparty_proposal_targets_gov_authority() {
        let params = CounterpartyChainParams {
            hyperion_id: 21,
            bridge_chain_id: 11155111,
            bridge_chain_name: "Sepolia".into(),
            ..Default::default()
        };
        let any = counterparty_chain_msg("helios", &params).unwrap();
        assert_eq!(any.type_url, "/helios.hyperion.v1.MsgAddCounterpartyChainParams");
        let msg = proto::MsgAddCounterpartyChainParams::decode(any.value.as_slice()).unwrap();
        assert_eq!(msg.authority, module_address("helios", "gov").unwrap());
        assert_eq!(msg.counterparty_chain_params.unwrap().hyperion_id, 21);
    }
}
