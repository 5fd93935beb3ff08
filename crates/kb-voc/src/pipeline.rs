//! `VocPipeline`: dispatches on `job.status` (§4.5). CRAWLING decides the crawl
//! plan and enqueues spider tasks, then releases the lease to wait on the
//! external callback; EXTRACTING loads datasets, runs every analyzer in the
//! fixed registry order, persists outputs/evidence, and builds `report.v1`.
//! Self-contained error handling: any failure here ends the job FAILED
//! directly (no retry path), unlike `IngestPipeline`.

use crate::analyzers::{analyzer_registry, AnalysisContext};
use crate::crawl::decide_crawl_units;
use crate::dataset::ResultsReader;
use crate::error::VocError;
use crate::spider_gateway::{SpiderEnqueuePayload, SpiderGateway};
use crate::{ai_enrichment, report};
use kb_core::config::LlmConfig;
use kb_core::entities::{spider_task_id, PipelineOutcome, TriggerMode, VocJob, VocJobStatus};
use kb_jobstore::JobStore;
use kb_llm::routing::ModelRoutingTable;
use kb_observability::CallbackTokenSigner;
use rand::RngCore;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub struct VocPipeline {
    pub job_store: Arc<dyn JobStore>,
    pub results_reader: Arc<dyn ResultsReader>,
    pub spider_gateway: SpiderGateway,
    pub signer: CallbackTokenSigner,
    pub public_base_url: Option<String>,
    pub routing: ModelRoutingTable,
    pub llm_config: LlmConfig,
    pub default_reviews_days: i64,
}

impl VocPipeline {
    pub async fn run(&self, job: &VocJob, now_ts: i64) -> PipelineOutcome {
        let stage = match job.status {
            VocJobStatus::Crawling => "CRAWLING",
            VocJobStatus::Extracting => "EXTRACTING",
            other => {
                warn!(job_id = job.job_id, status = ?other, "voc pipeline claimed a job in an unexpected status, skipping");
                return PipelineOutcome::Succeeded;
            }
        };

        let result = match job.status {
            VocJobStatus::Crawling => self.run_crawling(job, now_ts).await,
            VocJobStatus::Extracting => self.run_extracting(job, now_ts).await,
            _ => unreachable!("matched above"),
        };

        match result {
            Ok(()) => PipelineOutcome::Succeeded,
            Err(e) => {
                warn!(job_id = job.job_id, error = %e, "voc job failed");
                let outcome = e.to_outcome();
                let _ = self.job_store.fail_voc_job(job.job_id, e.error_code(), &e.to_string(), stage).await;
                outcome
            }
        }
    }

    async fn run_crawling(&self, job: &VocJob, now_ts: i64) -> Result<(), VocError> {
        let target_asins = string_list(&job.params, "target_asins");
        let competitor_asins = string_list(&job.params, "competitor_asins");
        let keywords = string_list(&job.params, "keywords");
        let trigger_mode = trigger_mode_from_params(&job.params);

        if trigger_mode == TriggerMode::Off {
            return self.skip_to_extracting(job).await;
        }

        let units = decide_crawl_units(
            self.results_reader.as_ref(),
            &job.site_code,
            &target_asins,
            &competitor_asins,
            &keywords,
            trigger_mode,
            now_ts,
        )
        .await?;

        if units.is_empty() {
            return self.skip_to_extracting(job).await;
        }

        let base_url = self
            .public_base_url
            .as_ref()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or(VocError::MissingConfig("PUBLIC_BASE_URL"))?;

        let mut pending = Vec::with_capacity(units.len());
        for unit in &units {
            let task_id = spider_task_id(job.job_id, unit.run_type, &unit.scope_value);
            let token = random_token();
            let token_hash = self.signer.hash_token(&token);
            self.job_store
                .create_spider_task(job.job_id, &task_id, unit.run_type, unit.scope_type, &unit.scope_value, &token_hash)
                .await?;

            let callback_url = format!(
                "{}/voc/spider/callback/{}?run_type={}&scope_type={}&scope_value={}",
                base_url.trim_end_matches('/'),
                job.job_id,
                urlencode(unit.run_type),
                urlencode(unit.scope_type),
                urlencode(&unit.scope_value),
            );

            let enqueue_payload = SpiderEnqueuePayload {
                task_id: task_id.clone(),
                run_type: unit.run_type,
                site_code: job.site_code.clone(),
                scope_type: unit.scope_type,
                scope_value: unit.scope_value.clone(),
                callback_url,
                callback_token: token,
                extra: json!({}),
            };
            self.spider_gateway.enqueue(&enqueue_payload).await?;

            pending.push(json!({
                "task_id": task_id,
                "run_type": unit.run_type,
                "scope_type": unit.scope_type,
                "scope_value": unit.scope_value,
            }));
        }

        let mut params = job.params.clone();
        params["pending_crawl"] = Value::Array(pending.clone());
        self.job_store.update_voc_job_params(job.job_id, params).await?;
        self.job_store.update_voc_job_status(job.job_id, VocJobStatus::Crawling, Some("crawling")).await?;
        self.job_store.release_voc_lock(job.job_id).await?;

        info!(job_id = job.job_id, pending = pending.len(), "voc job enqueued spider tasks");
        Ok(())
    }

    async fn skip_to_extracting(&self, job: &VocJob) -> Result<(), VocError> {
        self.job_store.update_voc_job_status(job.job_id, VocJobStatus::Extracting, Some("extracting")).await?;
        self.job_store.release_voc_lock(job.job_id).await?;
        Ok(())
    }

    async fn run_extracting(&self, job: &VocJob, now_ts: i64) -> Result<(), VocError> {
        self.job_store.update_voc_job_status(job.job_id, VocJobStatus::Analyzing, Some("analyzing")).await?;

        let target_asins = string_list(&job.params, "target_asins");
        let competitor_asins = string_list(&job.params, "competitor_asins");
        let mut asins: Vec<String> = target_asins.iter().chain(competitor_asins.iter()).cloned().collect();
        asins.sort();
        asins.dedup();
        let mut keywords = string_list(&job.params, "keywords");
        keywords.sort();
        keywords.dedup();

        let reviews_days = job
            .params
            .get("time_window")
            .and_then(|w| w.get("reviews_days"))
            .and_then(Value::as_i64)
            .unwrap_or(self.default_reviews_days);
        let review_time_from = now_ts - reviews_days * 86_400;

        let review_dataset = self.results_reader.load_review_dataset(&job.site_code, &asins, review_time_from, now_ts).await?;
        let listing_dataset = self.results_reader.load_listing_dataset(&job.site_code, &asins).await?;
        let keyword_dataset = self.results_reader.load_keyword_serp_dataset(&job.site_code, &keywords).await?;

        let ctx = AnalysisContext {
            review_dataset,
            listing_dataset,
            keyword_dataset,
            target_asins,
            competitor_asins,
            keywords,
        };

        self.job_store.update_voc_job_status(job.job_id, VocJobStatus::Persisting, Some("persisting")).await?;

        for analyzer in analyzer_registry() {
            let module_code = analyzer.module_code();
            let (mut payload, evidence_rows) =
                analyzer.analyze(&ctx).map_err(|e| VocError::Analysis { module_code, message: e.0 })?;

            ai_enrichment::enrich(&self.routing, &self.llm_config, module_code, &mut payload).await;

            self.job_store.upsert_voc_output(job.job_id, module_code, 1, payload).await?;
            self.job_store.clear_voc_evidence(job.job_id, module_code).await?;
            if !evidence_rows.is_empty() {
                self.job_store.insert_voc_evidence_many(job.job_id, module_code, evidence_rows).await?;
            }
        }

        let mut report_payload = report::build(&self.job_store, job.job_id).await?;
        ai_enrichment::enrich(&self.routing, &self.llm_config, report::MODULE_CODE, &mut report_payload).await;
        let report_meta = report_payload.get("meta").cloned().unwrap_or_else(|| json!({}));
        self.job_store.upsert_voc_report(job.job_id, "v1", report_payload, report_meta).await?;

        self.job_store.update_voc_job_status(job.job_id, VocJobStatus::Done, None).await?;
        info!(job_id = job.job_id, "voc job done");
        Ok(())
    }
}

fn string_list(params: &Value, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn trigger_mode_from_params(params: &Value) -> TriggerMode {
    match params.get("trigger_mode").and_then(Value::as_str).unwrap_or("AUTO").to_uppercase().as_str() {
        "FORCE" => TriggerMode::Force,
        "OFF" => TriggerMode::Off,
        _ => TriggerMode::Auto,
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
