//! Parameter discovery (C2): reconciles a telemetry message's metric keys
//! against persisted `DeviceParameter` rows, idempotently inserting any
//! that are new.

use std::collections::HashSet;

use chrono::Utc;
use factoryops_core::{DataType, DeviceId, FactoryId, MetricNumber};
use factoryops_state::SharedCache;
use factoryops_store::RelationalStore;

use crate::error::IngestError;
use crate::identity::IdentityCache;

/// Ensure every metric key in `metrics` has a persisted `DeviceParameter`
/// row, per §4.2's algorithm.
///
/// # Errors
///
/// Returns a transient or permanent store error if the insert fails for a
/// reason other than the expected unique-key conflict.
pub async fn ensure_registered<C, S>(
    identity: &IdentityCache<C, S>,
    store: &S,
    factory_id: FactoryId,
    device_id: DeviceId,
    metrics: &std::collections::HashMap<String, MetricNumber>,
) -> Result<(), IngestError>
where
    C: SharedCache + ?Sized + 'static,
    S: RelationalStore + ?Sized + 'static,
{
    let incoming_keys: HashSet<String> = metrics.keys().cloned().collect();

    let cached = match identity.cached_parameter_keys(device_id).await? {
        Some(keys) => keys,
        None => {
            let persisted = store.device_parameter_keys(device_id).await?;
            let persisted: HashSet<String> = persisted.into_iter().collect();
            identity.put_parameter_keys(device_id, persisted.clone()).await?;
            persisted
        }
    };

    let new_keys: Vec<&String> = incoming_keys.difference(&cached).collect();
    if new_keys.is_empty() {
        return Ok(());
    }

    let mut updated = cached;
    let now = Utc::now();
    for key in new_keys {
        let number = metrics[key];
        let data_type = infer_data_type(number);
        let inserted = store
            .insert_parameter_if_absent(factory_id, device_id, key, data_type, now)
            .await?;
        if inserted {
            tracing::debug!(device_id = device_id.get(), parameter_key = %key, "discovered new parameter");
        }
        updated.insert(key.clone());
    }

    identity.put_parameter_keys(device_id, updated).await?;
    Ok(())
}

fn infer_data_type(number: MetricNumber) -> DataType {
    match number {
        MetricNumber::Int(_) => DataType::Int,
        MetricNumber::Float(_) => DataType::Float,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factoryops_core::Factory;
    use factoryops_state_memory::MemorySharedCache;
    use factoryops_store::InMemoryStore;
    use std::str::FromStr;
    use std::sync::Arc;

    fn setup() -> (IdentityCache<MemorySharedCache, InMemoryStore>, Arc<InMemoryStore>, FactoryId, DeviceId) {
        let store = Arc::new(InMemoryStore::new());
        let factory = Factory {
            id: FactoryId::new(1),
            slug: "vpc".into(),
            name: "VPC".into(),
            timezone: chrono_tz::Tz::from_str("UTC").unwrap(),
            is_active: true,
        };
        store.seed_factory(factory.clone());
        let device_id = DeviceId::new(1);
        let identity = IdentityCache::new(Arc::new(MemorySharedCache::new()), Arc::clone(&store));
        (identity, store, factory.id, device_id)
    }

    #[tokio::test]
    async fn new_keys_are_inserted_once() {
        let (identity, store, factory_id, device_id) = setup();
        let mut metrics = std::collections::HashMap::new();
        metrics.insert("voltage".to_string(), MetricNumber::Float(231.4));
        metrics.insert("current".to_string(), MetricNumber::Int(3));

        ensure_registered(&identity, &store, factory_id, device_id, &metrics)
            .await
            .unwrap();

        let persisted = store.device_parameter_keys(device_id).await.unwrap();
        assert_eq!(persisted.len(), 2);

        // Second call with the same keys must not duplicate anything.
        ensure_registered(&identity, &store, factory_id, device_id, &metrics)
            .await
            .unwrap();
        let persisted = store.device_parameter_keys(device_id).await.unwrap();
        assert_eq!(persisted.len(), 2);
    }

    #[tokio::test]
    async fn infers_int_and_float_data_types() {
        let (identity, store, factory_id, device_id) = setup();
        let mut metrics = std::collections::HashMap::new();
        metrics.insert("count".to_string(), MetricNumber::Int(5));
        metrics.insert("ratio".to_string(), MetricNumber::Float(0.5));

        ensure_registered(&identity, &store, factory_id, device_id, &metrics)
            .await
            .unwrap();

        let params = store.list_parameters(device_id).await.unwrap();
        let count_param = params.iter().find(|p| p.parameter_key == "count").unwrap();
        let ratio_param = params.iter().find(|p| p.parameter_key == "ratio").unwrap();
        assert_eq!(count_param.data_type, DataType::Int);
        assert_eq!(ratio_param.data_type, DataType::Float);
    }
}
