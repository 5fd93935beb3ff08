//! `report.v1`: aggregates every other module's persisted output into one
//! payload. Reads only `stg_voc_outputs`/`stg_voc_evidence` (via `JobStore`),
//! never the in-memory analyzer results directly (§4.5.1).

use kb_jobstore::JobStore;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const MODULE_CODE: &str = "report.v1";

pub async fn build(job_store: &Arc<dyn JobStore>, job_id: i64) -> Result<Value, kb_jobstore::JobStoreError> {
    let outputs = job_store.list_voc_outputs(job_id).await?;

    let mut order = Vec::new();
    let mut modules = Map::new();
    let mut evidence_counts = Map::new();
    let mut merged_meta = Map::new();

    for o in &outputs {
        if o.module_code == MODULE_CODE {
            continue;
        }
        order.push(o.module_code.clone());

        if let Some(meta) = o.payload.get("meta").and_then(Value::as_object) {
            for (k, v) in meta {
                merged_meta.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        modules.insert(o.module_code.clone(), o.payload.clone());

        let count = job_store.count_voc_evidence(job_id, &o.module_code).await?;
        evidence_counts.insert(o.module_code.clone(), Value::from(count));
    }

    let available = !modules.is_empty();

    Ok(serde_json::json!({
        "available": available,
        "module_code": MODULE_CODE,
        "schema_version": 1,
        "data": {
            "module_order": order,
            "modules": modules,
            "evidence_counts": evidence_counts,
        },
        "meta": merged_meta,
    }))
}
