use crate::entity::{Entity, EntityMeta, ValidationError, Validator};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A chat guild, looked up by its platform snowflake id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub discord_id: String,
}

fn snowflake() -> &'static Regex {
    static SNOWFLAKE: OnceLock<Regex> = OnceLock::new();
    SNOWFLAKE.get_or_init(|| Regex::new(r"^[0-9]{1,20}$").expect("snowflake pattern is valid"))
}

impl Server {
    pub fn new<S: Into<String>>(discord_id: S) -> Self {
        Self {
            meta: EntityMeta::default(),
            discord_id: discord_id.into(),
        }
    }
}

impl Entity for Server {
    const ENTITY_TYPE: &'static str = "servers";

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Validator::new(Self::ENTITY_TYPE)
            .required("discord_id", &self.discord_id)
            .pattern("discord_id", &self.discord_id, snowflake())
            .finish()
    }
}
