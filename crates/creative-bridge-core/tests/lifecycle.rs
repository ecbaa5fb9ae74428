use std::sync::Arc;

use creative_bridge_core::dsp::MockDspClient;
use creative_bridge_core::provider::MockSnippetProvider;
use creative_bridge_core::store::{CreativeStore, InMemoryCreativeStore, StoreError};
use creative_bridge_core::{
    CreativeConfig, CreativeFormat, CreativeProcessor, ProcessingError, ProcessingStage,
    ViewabilityConfig, ViewabilityPhase, ViewabilityVendor,
};
use futures::executor::block_on;

const RUNWAY_URL: &str = "https://snippet.kargo.com/snippet/dm/81298";
const PREROLL_URL: &str = "https://snippet.kargo.com/snippet/dm/81172";

struct Harness {
    processor: CreativeProcessor,
    store: Arc<InMemoryCreativeStore>,
    dsp: Arc<MockDspClient>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryCreativeStore::new());
    let dsp = Arc::new(MockDspClient::new());
    let processor = CreativeProcessor::new(
        Arc::new(MockSnippetProvider::new()),
        store.clone(),
        dsp.clone(),
    );
    Harness {
        processor,
        store,
        dsp,
    }
}

fn runway(name: &str) -> CreativeConfig {
    let viewability = ViewabilityConfig::new(
        ViewabilityPhase::Phase1,
        vec![ViewabilityVendor::DoubleVerify],
        "platform_native",
    )
    .unwrap();
    CreativeConfig::new(name, CreativeFormat::Runway, "320x50", RUNWAY_URL, viewability)
}

fn preroll(name: &str) -> CreativeConfig {
    let viewability = ViewabilityConfig::new(
        ViewabilityPhase::Phase2,
        vec![ViewabilityVendor::Ias, ViewabilityVendor::DoubleVerify],
        "s2s_plus_wrapped",
    )
    .unwrap()
    .with_s2s("SEAT1", "PUB1");
    CreativeConfig::new(
        name,
        CreativeFormat::EnhancedPreroll,
        "300x50",
        PREROLL_URL,
        viewability,
    )
    .with_duration(15)
}

#[test]
fn list_is_newest_first_and_pages_stably() {
    let h = harness();
    let mut ids = Vec::new();
    for name in ["first", "second", "third"] {
        ids.push(block_on(h.processor.process_creative(&runway(name))).unwrap().creative_id);
    }

    let all = block_on(h.processor.list_processed_creatives(0, 10)).unwrap();
    let names: Vec<&str> = all.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["third", "second", "first"]);

    let page = block_on(h.processor.list_processed_creatives(1, 1)).unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].creative_id, ids[1]);

    assert!(block_on(h.processor.list_processed_creatives(3, 10)).unwrap().is_empty());
}

#[test]
fn creative_ids_are_unique() {
    let h = harness();
    let a = block_on(h.processor.process_creative(&runway("same"))).unwrap();
    let b = block_on(h.processor.process_creative(&runway("same"))).unwrap();
    assert_ne!(a.creative_id, b.creative_id);
}

#[test]
fn get_returns_stored_creative_or_none() {
    let h = harness();
    let created = block_on(h.processor.process_creative(&runway("stored"))).unwrap();

    let found = block_on(h.processor.get_processed_creative(&created.creative_id))
        .unwrap()
        .expect("creative should be stored");
    assert_eq!(found, created);

    assert!(block_on(h.processor.get_processed_creative("missing"))
        .unwrap()
        .is_none());
}

#[test]
fn delete_is_safe_to_repeat() {
    let h = harness();
    let created = block_on(h.processor.process_creative(&runway("doomed"))).unwrap();

    assert!(block_on(h.processor.delete_processed_creative(&created.creative_id)).unwrap());
    assert!(!block_on(h.processor.delete_processed_creative(&created.creative_id)).unwrap());
    assert!(!block_on(h.processor.delete_processed_creative("never-existed")).unwrap());
    assert!(block_on(h.processor.get_processed_creative(&created.creative_id))
        .unwrap()
        .is_none());
}

#[test]
fn store_refuses_duplicate_ids() {
    let h = harness();
    let created = block_on(h.processor.process_creative(&runway("dup"))).unwrap();
    let err = block_on(h.store.save(&created)).unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(ref id) if *id == created.creative_id));
}

#[test]
fn upload_records_external_id_and_status() {
    let h = harness();
    let display = block_on(h.processor.process_creative(&runway("Display"))).unwrap();
    let video = block_on(h.processor.process_creative(&preroll("Brand Preroll"))).unwrap();

    let uploaded = block_on(h.processor.upload_to_dsp(&display.creative_id, "ADV1")).unwrap();
    let record = uploaded.upload.as_ref().expect("upload recorded");
    assert_eq!(record.status, "APPROVED");
    assert!(uploaded.updated_at >= uploaded.created_at);
    assert_eq!(uploaded.processed_code, display.processed_code);

    let reloaded = block_on(h.processor.get_processed_creative(&display.creative_id))
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.upload, uploaded.upload);

    let video = block_on(h.processor.upload_to_dsp(&video.creative_id, "ADV1")).unwrap();
    let video_record = video.upload.unwrap();
    assert_eq!(video_record.status, "PENDING");

    let remote = h.dsp.get_creative(&video_record.dsp_creative_id).unwrap();
    assert_eq!(remote.name, "Brand Preroll");
    assert_eq!(h.dsp.upload_count(), 2);
}

#[test]
fn upload_of_unknown_creative_is_not_found() {
    let h = harness();
    let err = block_on(h.processor.upload_to_dsp("nope", "ADV1")).unwrap_err();
    assert!(matches!(err, ProcessingError::CreativeNotFound(_)));
    assert_eq!(err.stage(), ProcessingStage::Upload);
    assert_eq!(h.dsp.upload_count(), 0);
}
