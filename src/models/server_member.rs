//! A guild member. Members of different guilds are separate entities even
//! when they share a platform user account.

use crate::core::error::PersistResult;
use crate::entity::{Entity, EntityMeta, ValidationError, Validator};
use crate::repository::Repository;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMember {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub discord_user_id: String,
    pub discord_server_id: String,
    pub discord_member_id: String,

    /// Member ids of the primary and secondary owners
    #[serde(default)]
    pub owner_discord_id: String,
    #[serde(default)]
    pub sec_owner_discord_ids: Vec<String>,

    #[serde(default)]
    pub owner: Option<Box<ServerMember>>,
    #[serde(default)]
    pub sec_owners: Vec<ServerMember>,
}

impl ServerMember {
    pub fn new<U, S, M>(discord_user_id: U, discord_server_id: S, discord_member_id: M) -> Self
    where
        U: Into<String>,
        S: Into<String>,
        M: Into<String>,
    {
        Self {
            meta: EntityMeta::default(),
            discord_user_id: discord_user_id.into(),
            discord_server_id: discord_server_id.into(),
            discord_member_id: discord_member_id.into(),
            owner_discord_id: String::new(),
            sec_owner_discord_ids: Vec::new(),
            owner: None,
            sec_owners: Vec::new(),
        }
    }

    /// Fill `owner` and `sec_owners` from the owner member ids
    ///
    /// Owners are matched on `discord_member_id`; ids with no stored member are skipped.
    pub async fn load_owners(&mut self, repository: &Repository<ServerMember>) -> PersistResult<()> {
        self.owner = if self.owner_discord_id.is_empty() {
            None
        } else {
            repository
                .find_one("discord_member_id", self.owner_discord_id.as_str())
                .await?
                .map(Box::new)
        };

        let mut sec_owners = Vec::with_capacity(self.sec_owner_discord_ids.len());
        for id in &self.sec_owner_discord_ids {
            if let Some(member) = repository.find_one("discord_member_id", id.as_str()).await? {
                sec_owners.push(member);
            }
        }
        self.sec_owners = sec_owners;
        Ok(())
    }
}

impl Entity for ServerMember {
    const ENTITY_TYPE: &'static str = "server_members";

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Validator::new(Self::ENTITY_TYPE)
            .required("discord_user_id", &self.discord_user_id)
            .required("discord_server_id", &self.discord_server_id)
            .required("discord_member_id", &self.discord_member_id)
            .finish()
    }

    fn embedded_fields() -> &'static [&'static str] {
        &["owner", "sec_owners"]
    }
}
