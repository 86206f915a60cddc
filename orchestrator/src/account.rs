use anchor_spl::associated_token::get_associated_token_address_with_program_id;
use anchor_spl::token::spl_token;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tracing::instrument;

use crate::error::Result;
use crate::relay::RelayClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Undeployed,
    Deployed,
}

/// A participant's on-chain presence: the token account the ledger mints into and burns from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbstractedAccount {
    pub owner: Pubkey,
    pub address: Pubkey,
    pub status: DeploymentStatus,
}

impl AbstractedAccount {
    pub fn is_deployed(&self) -> bool {
        self.status == DeploymentStatus::Deployed
    }
}

/// Derives account addresses from owner keys. The address is a pure function
/// of (owner, mint, token program, associated token program).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountDeriver {
    mint: Pubkey,
}

impl AccountDeriver {
    pub fn new(mint: Pubkey) -> Self {
        Self { mint }
    }

    pub fn mint(&self) -> Pubkey {
        self.mint
    }

    pub fn address(&self, owner: &Pubkey) -> Pubkey {
        get_associated_token_address_with_program_id(owner, &self.mint, &spl_token::ID)
    }

    /// Address plus a single read of its deployment status.
    #[instrument(skip(self, relay))]
    pub async fn derive<R: RelayClient + ?Sized>(
        &self,
        relay: &R,
        owner: &Pubkey,
    ) -> Result<AbstractedAccount> {
        let address = self.address(owner);
        let status = match relay.account_exists(&address).await? {
            true => DeploymentStatus::Deployed,
            false => DeploymentStatus::Undeployed,
        };

        Ok(AbstractedAccount {
            owner: *owner,
            address,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRelay;

    #[test]
    fn address_is_deterministic() {
        let deriver = AccountDeriver::new(Pubkey::new_unique());
        let owner = Pubkey::new_unique();

        assert_eq!(deriver.address(&owner), deriver.address(&owner));
        assert_ne!(deriver.address(&owner), deriver.address(&Pubkey::new_unique()));
    }

    #[test]
    fn address_depends_on_mint() {
        let owner = Pubkey::new_unique();

        assert_ne!(
            AccountDeriver::new(Pubkey::new_unique()).address(&owner),
            AccountDeriver::new(Pubkey::new_unique()).address(&owner)
        );
    }

    #[tokio::test]
    async fn derive_reports_deployment_status() {
        let relay = FakeRelay::default();
        let deriver = AccountDeriver::new(Pubkey::new_unique());
        let owner = Pubkey::new_unique();

        let account = deriver.derive(&relay, &owner).await.unwrap();
        assert_eq!(account.status, DeploymentStatus::Undeployed);

        relay.deploy(account.address);
        let account = deriver.derive(&relay, &owner).await.unwrap();
        assert!(account.is_deployed());
        assert_eq!(account.address, deriver.address(&owner));
    }
}
