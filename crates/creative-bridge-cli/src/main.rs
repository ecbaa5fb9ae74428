mod cli;
mod timeout;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use creative_bridge_core::config::AppConfig;
use creative_bridge_core::dsp::MockDspClient;
use creative_bridge_core::provider::MockSnippetProvider;
use creative_bridge_core::store::InMemoryCreativeStore;
use creative_bridge_core::{
    BatchReport, CreativeConfig, CreativeProcessor, CreativeValidator, ProcessingStage,
};
use serde_json::Value as JsonValue;
use simple_logger::SimpleLogger;

use crate::cli::{Cli, Command, ProcessArgs};
use crate::timeout::TimeoutSnippetProvider;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let raw = tokio::fs::read_to_string(&cli.config)
        .await
        .with_context(|| format!("reading settings {}", cli.config.display()))?;
    let settings = AppConfig::from_toml_str(&raw)
        .with_context(|| format!("loading settings {}", cli.config.display()))?;

    SimpleLogger::new()
        .with_level(settings.logging.level)
        .init()
        .context("installing logger")?;

    match cli.command {
        Command::Snippets => {
            for id in MockSnippetProvider::new().snippet_ids() {
                println!("{}", id);
            }
            Ok(())
        }
        Command::Process(args) => run_process(&settings, args).await,
    }
}

fn build_processor(settings: &AppConfig) -> CreativeProcessor {
    let provider = TimeoutSnippetProvider::new(
        Arc::new(MockSnippetProvider::new()),
        Duration::from_millis(settings.snippet_provider.fetch_timeout_ms),
    );
    CreativeProcessor::new(
        Arc::new(provider),
        Arc::new(InMemoryCreativeStore::new()),
        Arc::new(MockDspClient::new()),
    )
    .with_validator(CreativeValidator::new(
        settings.snippet_provider.domain.clone(),
    ))
}

/// Parse items one at a time so a malformed entry is reported instead of
/// failing the whole file.
fn parse_items(items: Vec<JsonValue>, report: &mut BatchReport) -> Vec<(usize, CreativeConfig)> {
    let mut configs = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let name = item
            .get("name")
            .and_then(JsonValue::as_str)
            .unwrap_or("<unnamed>")
            .to_string();
        match serde_json::from_value::<CreativeConfig>(item) {
            Ok(config) => configs.push((index, config)),
            Err(e) => {
                log::error!("Creative {} rejected: {}", name, e);
                report.record_failure(index, name, ProcessingStage::Validation, e);
            }
        }
    }
    configs
}

async fn run_process(settings: &AppConfig, args: ProcessArgs) -> Result<()> {
    let raw = tokio::fs::read_to_string(&args.creatives)
        .await
        .with_context(|| format!("reading creatives {}", args.creatives.display()))?;
    let items: Vec<JsonValue> = serde_json::from_str(&raw)
        .with_context(|| format!("{} must hold a JSON array", args.creatives.display()))?;

    let advertiser_id = if args.upload {
        match args
            .advertiser_id
            .clone()
            .or_else(|| settings.dsp.default_advertiser_id.clone())
        {
            Some(id) => Some(id),
            None => bail!("--upload needs --advertiser-id or [dsp] default_advertiser_id"),
        }
    } else {
        None
    };

    let processor = build_processor(settings);
    let mut report = BatchReport {
        total: items.len(),
        ..Default::default()
    };

    let (positions, configs): (Vec<usize>, Vec<CreativeConfig>) =
        parse_items(items, &mut report).into_iter().unzip();
    let batch = processor.process_batch(&configs).await;

    for mut success in batch.succeeded {
        success.index = positions[success.index];
        report.succeeded.push(success);
    }
    for mut failure in batch.failed {
        failure.index = positions[failure.index];
        report.failed.push(failure);
    }

    if let Some(advertiser_id) = advertiser_id {
        let mut uploaded = Vec::with_capacity(report.succeeded.len());
        for mut success in std::mem::take(&mut report.succeeded) {
            match processor
                .upload_to_dsp(&success.creative.creative_id, &advertiser_id)
                .await
            {
                Ok(creative) => {
                    success.creative = creative;
                    uploaded.push(success);
                }
                Err(e) => {
                    log::error!("Upload of {} failed: {}", success.creative.name, e);
                    report.record_failure(
                        success.index,
                        success.creative.name.clone(),
                        e.stage(),
                        &e,
                    );
                }
            }
        }
        report.succeeded = uploaded;
    }

    report.succeeded.sort_by_key(|s| s.index);
    report.failed.sort_by_key(|f| f.index);

    let stored = processor
        .list_processed_creatives(0, settings.processing.page_size)
        .await?;
    log::info!(
        "{} of {} creatives succeeded, {} in store",
        report.succeeded.len(),
        report.total,
        stored.len()
    );

    let output = if args.summary {
        serde_json::json!({
            "total": report.total,
            "succeeded": report.succeeded.iter().map(|s| serde_json::json!({
                "index": s.index,
                "name": s.creative.name,
                "creative_id": s.creative.creative_id,
                "creative_type": s.creative.creative_type,
                "warnings": s.creative.processing_metadata.warnings,
                "upload": s.creative.upload,
            })).collect::<Vec<_>>(),
            "failed": report.failed,
        })
    } else {
        serde_json::to_value(&report)?
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO_CREATIVES: &str = include_str!("../../../demos/creatives.json");
    const DEMO_SETTINGS: &str = include_str!("../../../creative-bridge.toml");

    #[test]
    fn demo_files_load() {
        let settings = AppConfig::from_toml_str(DEMO_SETTINGS).expect("demo settings");
        assert_eq!(
            settings.dsp.default_advertiser_id.as_deref(),
            Some("ADV-DEMO-001")
        );

        let items: Vec<JsonValue> = serde_json::from_str(DEMO_CREATIVES).unwrap();
        let mut report = BatchReport::default();
        let configs = parse_items(items, &mut report);
        assert_eq!(configs.len(), 4);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].index, 4);
        assert_eq!(report.failed[0].name, "Misconfigured Phase 1");
        assert_eq!(report.failed[0].stage, ProcessingStage::Validation);
    }

    #[tokio::test]
    async fn demo_batch_isolates_failures() {
        let settings = AppConfig::from_toml_str(DEMO_SETTINGS).unwrap();
        let processor = build_processor(&settings);
        let items: Vec<JsonValue> = serde_json::from_str(DEMO_CREATIVES).unwrap();
        let mut report = BatchReport::default();
        let configs: Vec<CreativeConfig> = parse_items(items, &mut report)
            .into_iter()
            .map(|(_, c)| c)
            .collect();

        let batch = processor.process_batch(&configs).await;
        assert_eq!(batch.succeeded.len(), 3);
        assert_eq!(batch.failed.len(), 1);
        assert_eq!(batch.failed[0].stage, ProcessingStage::Fetch);
    }
}
