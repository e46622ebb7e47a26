//! 参与者仓储的 PostgreSQL 实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use domain::{
    Address, ConversationId, Participant, ParticipantRepository, ParticipantRole,
    RepositoryError, RepositoryResult, UserId,
};

use super::{invalid_data, map_sqlx_err};

#[derive(Debug, FromRow)]
struct ParticipantRecord {
    conversation_id: Uuid,
    address: String,
    role: String,
    user_id: Option<Uuid>,
    joined_at: DateTime<Utc>,
}

fn parse_role(value: &str) -> RepositoryResult<ParticipantRole> {
    match value {
        "owner" => Ok(ParticipantRole::Owner),
        "maker" => Ok(ParticipantRole::Maker),
        "taker" => Ok(ParticipantRole::Taker),
        "member" => Ok(ParticipantRole::Member),
        other => Err(invalid_data(format!("unknown participant role: {other}"))),
    }
}

impl TryFrom<ParticipantRecord> for Participant {
    type Error = RepositoryError;

    fn try_from(value: ParticipantRecord) -> Result<Self, Self::Error> {
        Ok(Participant {
            conversation_id: ConversationId::from(value.conversation_id),
            address: Address::parse(value.address).map_err(|err| invalid_data(err.to_string()))?,
            role: parse_role(&value.role)?,
            user_id: value.user_id.map(UserId::from),
            joined_at: value.joined_at,
        })
    }
}

#[derive(Clone)]
pub struct PgParticipantRepository {
    pool: PgPool,
}

impl PgParticipantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParticipantRepository for PgParticipantRepository {
    async fn upsert(&self, participant: Participant) -> RepositoryResult<Participant> {
        let record = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            INSERT INTO conversation_participants (conversation_id, address, role, user_id, joined_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (conversation_id, address)
            DO UPDATE SET role = EXCLUDED.role, user_id = EXCLUDED.user_id
            RETURNING conversation_id, address, role, user_id, joined_at
            "#,
        )
        .bind(Uuid::from(participant.conversation_id))
        .bind(participant.address.as_str())
        .bind(participant.role.as_str())
        .bind(participant.user_id.map(Uuid::from))
        .bind(participant.joined_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Participant::try_from(record)
    }

    async fn find(
        &self,
        conversation_id: ConversationId,
        address: &Address,
    ) -> RepositoryResult<Option<Participant>> {
        let record = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            SELECT conversation_id, address, role, user_id, joined_at
            FROM conversation_participants
            WHERE conversation_id = $1 AND address = $2
            "#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(address.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Participant::try_from).transpose()
    }

    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> RepositoryResult<Vec<Participant>> {
        let records = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            SELECT conversation_id, address, role, user_id, joined_at
            FROM conversation_participants
            WHERE conversation_id = $1
            ORDER BY joined_at ASC
            "#,
        )
        .bind(Uuid::from(conversation_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Participant::try_from).collect()
    }

    async fn list_conversation_ids_by_address(
        &self,
        address: &Address,
    ) -> RepositoryResult<Vec<ConversationId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT conversation_id FROM conversation_participants
            WHERE address = $1
            ORDER BY joined_at ASC
            "#,
        )
        .bind(address.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(ids.into_iter().map(ConversationId::from).collect())
    }
}
