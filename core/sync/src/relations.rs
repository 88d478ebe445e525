//! Notification-to-entity relation resolution.

use serde_json::{json, Value as Json};
use tracing::warn;

use lenda_common::{Record, Result};
use lenda_store::Store;

/// Link tags whose originating entity is a loan.
const LOAN_LINK_TAGS: [&str; 5] = [
    "LOAN_SUCCESS",
    "LOAN_PREPAYMENT",
    "LOAN_DELAY_INVESTOR",
    "BORROWER_HEAL",
    "LOAN_PENALTY_PAID",
];

/// Resolve relation rows for every notification that has none yet.
///
/// The anti-join in the store excludes already-resolved notifications, so
/// re-running this is a no-op for them. Notifications with an unrecognized
/// tag are skipped with a warning and stay pending; a later run picks them
/// up once the mapping learns the new tag.
///
/// Returns the number of relations written.
pub fn resolve_notification_relations(store: &Store) -> Result<usize> {
    let pending = store.unresolved_notifications()?;

    let mut relations: Vec<Record> = Vec::new();
    for (notification_id, link) in pending {
        let payload: Json = match serde_json::from_str(&link) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(notification_id, %e, "unparseable notification link, skipping");
                continue;
            }
        };

        let Some(tag) = payload.get("type").and_then(Json::as_str) else {
            warn!(notification_id, "notification link has no type tag, skipping");
            continue;
        };

        let (foreign_table, id_param) = if tag == "WALLET_INCOMING" {
            ("a_wallet", "walletId")
        } else if LOAN_LINK_TAGS.contains(&tag) {
            ("a_loans", "loanId")
        } else {
            warn!(tag, "new notification type, a mapping update is needed");
            continue;
        };

        let Some(foreign_id) = payload
            .pointer(&format!("/params/{}", id_param))
            .and_then(Json::as_i64)
        else {
            warn!(notification_id, tag, "notification link lacks its id parameter, skipping");
            continue;
        };

        let relation = json!({
            "notificationId": notification_id,
            "relationType": tag,
            "foreignId": foreign_id,
            "foreignTable": foreign_table,
        });
        relations.push(relation.as_object().cloned().unwrap_or_default());
    }

    let written = relations.len();
    store.upsert("z_notifications_relations", &relations)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lenda_store::SchemaRegistry;
    use serde_json::json;

    fn store_with_notifications(notifications: &[Json]) -> Store {
        let store = Store::in_memory(SchemaRegistry::builtin()).unwrap();
        let records: Vec<Record> = notifications
            .iter()
            .map(|n| n.as_object().unwrap().clone())
            .collect();
        store.upsert("a_notifications", &records).unwrap();
        store
    }

    #[test]
    fn test_wallet_and_loan_tags_resolve() {
        let store = store_with_notifications(&[
            json!({"id": 1, "link": {"type": "WALLET_INCOMING", "params": {"walletId": 9}}}),
            json!({"id": 2, "link": {"type": "LOAN_PREPAYMENT", "params": {"loanId": 42}}}),
        ]);

        let written = resolve_notification_relations(&store).unwrap();
        assert_eq!(written, 2);

        let wallet_rel = store.get_one("z_notifications_relations", 1).unwrap().unwrap();
        assert_eq!(wallet_rel["foreignTable"], json!("a_wallet"));
        assert_eq!(wallet_rel["foreignId"], json!(9));

        let loan_rel = store.get_one("z_notifications_relations", 2).unwrap().unwrap();
        assert_eq!(loan_rel["foreignTable"], json!("a_loans"));
        assert_eq!(loan_rel["relationType"], json!("LOAN_PREPAYMENT"));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let store = store_with_notifications(&[
            json!({"id": 1, "link": {"type": "LOAN_SUCCESS", "params": {"loanId": 7}}}),
        ]);

        assert_eq!(resolve_notification_relations(&store).unwrap(), 1);
        // Second pass finds nothing pending.
        assert_eq!(resolve_notification_relations(&store).unwrap(), 0);
        assert_eq!(
            store.get_all("z_notifications_relations", None).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_unknown_tag_is_skipped_and_stays_pending() {
        let store = store_with_notifications(&[
            json!({"id": 1, "link": {"type": "SOMETHING_NEW", "params": {"loanId": 3}}}),
            json!({"id": 2, "link": {"type": "LOAN_SUCCESS", "params": {"loanId": 3}}}),
        ]);

        assert_eq!(resolve_notification_relations(&store).unwrap(), 1);

        // The unknown one is retried on the next pass, not recorded as failed.
        let pending = store.unresolved_notifications().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, 1);
    }

    #[test]
    fn test_malformed_link_is_skipped() {
        let store = store_with_notifications(&[
            json!({"id": 1, "link": "not json at all"}),
        ]);

        assert_eq!(resolve_notification_relations(&store).unwrap(), 0);
    }
}
