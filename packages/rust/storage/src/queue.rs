//! The per-lead enrichment queue.
//!
//! A message is visible when `vt_ms <= now`. Claiming pushes `vt_ms` into the
//! future by the visibility timeout, so an unacknowledged message becomes
//! claimable again once that window lapses. Acknowledging deletes the row.

use chrono::Utc;
use leadsmith_shared::{LeadsmithError, QueueMessage, Result};
use libsql::params;

use crate::{Storage, storage_err};

impl Storage {
    /// Append a message for `lead_id`, immediately visible. Returns its `msg_id`.
    pub async fn enqueue_message(&self, lead_id: &str, campaign_id: &str) -> Result<i64> {
        let now = Utc::now();
        let mut rows = self
            .conn
            .query(
                "INSERT INTO lead_enrichment_queue (lead_id, campaign_id, vt_ms, enqueued_at)
                 VALUES (?1, ?2, ?3, ?4)
                 RETURNING msg_id",
                params![lead_id, campaign_id, now.timestamp_millis(), now.to_rfc3339()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => row.get::<i64>(0).map_err(storage_err),
            None => Err(LeadsmithError::Storage("enqueue returned no msg_id".into())),
        }
    }

    /// Claim up to `count` visible messages, hiding them for
    /// `visibility_timeout_secs`.
    pub async fn claim_messages(
        &self,
        count: u32,
        visibility_timeout_secs: u32,
    ) -> Result<Vec<QueueMessage>> {
        self.claim_messages_at(count, visibility_timeout_secs, Utc::now().timestamp_millis())
            .await
    }

    /// [`Storage::claim_messages`] against an explicit clock, in milliseconds.
    ///
    /// Selection and the visibility bump happen in one statement, so two
    /// concurrent claimants never receive the same message.
    pub async fn claim_messages_at(
        &self,
        count: u32,
        visibility_timeout_secs: u32,
        now_ms: i64,
    ) -> Result<Vec<QueueMessage>> {
        let hidden_until = now_ms + i64::from(visibility_timeout_secs) * 1000;
        let mut rows = self
            .conn
            .query(
                "UPDATE lead_enrichment_queue
                 SET vt_ms = ?1, read_ct = read_ct + 1
                 WHERE msg_id IN (
                     SELECT msg_id FROM lead_enrichment_queue
                     WHERE vt_ms <= ?2
                     ORDER BY msg_id
                     LIMIT ?3
                 )
                 RETURNING msg_id, lead_id",
                params![hidden_until, now_ms, count],
            )
            .await
            .map_err(storage_err)?;

        let mut messages = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            messages.push(QueueMessage {
                msg_id: row.get::<i64>(0).map_err(storage_err)?,
                lead_id: row.get::<String>(1).map_err(storage_err)?,
            });
        }
        // RETURNING order is unspecified
        messages.sort_by_key(|m| m.msg_id);
        Ok(messages)
    }

    /// Permanently remove a message. Returns `false` if it was already gone.
    pub async fn ack_message(&self, msg_id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM lead_enrichment_queue WHERE msg_id = ?1",
                params![msg_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(deleted > 0)
    }

    /// Number of messages in the queue, hidden or not.
    pub async fn queue_depth(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM lead_enrichment_queue", params![])
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;

    #[tokio::test]
    async fn claim_hides_then_releases() {
        let storage = test_storage().await;
        for lead in ["l1", "l2", "l3"] {
            storage.enqueue_message(lead, "c1").await.unwrap();
        }
        let now = chrono::Utc::now().timestamp_millis();

        let first = storage.claim_messages_at(2, 120, now).await.unwrap();
        assert_eq!(
            first.iter().map(|m| m.lead_id.as_str()).collect::<Vec<_>>(),
            ["l1", "l2"]
        );

        // Only l3 is still visible
        let second = storage.claim_messages_at(10, 120, now).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].lead_id, "l3");
        assert!(storage.claim_messages_at(10, 120, now).await.unwrap().is_empty());

        // A crashed worker never acks: after the timeout everything is claimable again
        let later = now + 121_000;
        let redelivered = storage.claim_messages_at(10, 120, later).await.unwrap();
        assert_eq!(redelivered.len(), 3);
    }

    #[tokio::test]
    async fn ack_removes_permanently() {
        let storage = test_storage().await;
        let msg_id = storage.enqueue_message("l1", "c1").await.unwrap();
        let claimed = storage.claim_messages(1, 0).await.unwrap();
        assert_eq!(claimed[0].msg_id, msg_id);

        assert!(storage.ack_message(msg_id).await.unwrap());
        assert!(!storage.ack_message(msg_id).await.unwrap());
        assert_eq!(storage.queue_depth().await.unwrap(), 0);

        let far_future = chrono::Utc::now().timestamp_millis() + 3_600_000;
        assert!(storage.claim_messages_at(1, 0, far_future).await.unwrap().is_empty());
    }
}
