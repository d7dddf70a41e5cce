//! Pipeline Integration Tests
//!
//! End-to-end runs over small N-Quads corpora written to disk:
//! - phase 1 signals feeding phase 2 skipping
//! - classification of postal, locality and foreign-only publishers
//! - determinism across worker counts
//! - failed files, file restriction, event budget and manual overrides

use event_sources::config::PipelineConfig;
use event_sources::extraction::StopReason;
use event_sources::pipeline::{Pipeline, RunOptions};
use event_sources::scoring::{Classification, ClassificationRecord, DecisionRule};
use event_sources::signals::{DomainRecord, DomainSignal};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
const SCHEMA: &str = "http://schema.org/";

fn setup_test_environment(test_name: &str) -> std::io::Result<String> {
    let test_dir = format!("test_data_pipeline_{}", test_name);
    let _ = fs::remove_dir_all(&test_dir);
    fs::create_dir_all(&test_dir)?;
    Ok(test_dir)
}

fn cleanup_test_environment(test_dir: &str) {
    let _ = fs::remove_dir_all(test_dir);
}

/// One Event page: the Event, its place and the place's postal address.
fn event_page(domain: &str, page: usize, address: &[(&str, &str)]) -> String {
    let graph = format!("<https://{}/events/{}>", domain, page);
    let mut quads = format!(
        "_:e <{rdf}> <{s}Event> {g} .\n\
         _:e <{s}name> \"Event {page}\" {g} .\n\
         _:e <{s}startDate> \"2024-07-0{day}\" {g} .\n\
         _:e <{s}location> _:p {g} .\n\
         _:p <{s}address> _:a {g} .\n",
        rdf = RDF_TYPE,
        s = SCHEMA,
        g = graph,
        page = page,
        day = page % 9 + 1,
    );
    for (property, value) in address {
        quads.push_str(&format!("_:a <{}{}> \"{}\" {} .\n", SCHEMA, property, value, graph));
    }
    quads
}

fn pages(domain: &str, count: usize, address: &[(&str, &str)]) -> String {
    (0..count).map(|page| event_page(domain, page, address)).collect()
}

fn write_plain(dir: &str, name: &str, content: &str) -> PathBuf {
    let path = PathBuf::from(format!("{}/{}", dir, name));
    let mut file = File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.sync_all().unwrap();
    path
}

fn write_gzip(dir: &str, name: &str, content: &str) -> PathBuf {
    let path = PathBuf::from(format!("{}/{}", dir, name));
    let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap().sync_all().unwrap();
    path
}

fn lookup() -> Vec<DomainRecord> {
    vec![
        DomainRecord::new("jazzclub.com", "com"),
        DomainRecord::new("pubnight.com", "com"),
        DomainRecord::new("festival.co.uk", "uk"),
        DomainRecord::new("torontobeats.com", "com"),
    ]
}

/// Two part files covering four publishers.
fn corpus(test_dir: &str) -> Vec<PathBuf> {
    let toronto = [("addressLocality", "Toronto"), ("postalCode", "M5B 2H1")];
    let part0 = format!(
        "{}{}",
        pages("jazzclub.com", 3, &toronto),
        pages("pubnight.com", 1, &[("addressLocality", "London"), ("addressRegion", "England")]),
    );
    let part1 = format!(
        "{}{}{}",
        pages("festival.co.uk", 4, &toronto),
        pages("jazzclub.com", 2, &toronto).replace("/events/", "/shows/"),
        pages("torontobeats.com", 1, &[("addressLocality", "Scarborough")]),
    );
    vec![write_gzip(test_dir, "part-0.gz", &part0), write_plain(test_dir, "part-1.nq", &part1)]
}

fn run_pipeline(config: PipelineConfig, files: &[PathBuf], options: &RunOptions) -> Pipeline {
    let mut pipeline = Pipeline::new(config).unwrap();
    pipeline.classify_domains(&lookup());
    pipeline.run(files, options);
    pipeline
}

fn record<'a>(pipeline: &'a Pipeline, domain: &str) -> &'a ClassificationRecord {
    pipeline.classification(domain).unwrap_or_else(|| panic!("no record for {}", domain))
}

#[test]
fn test_postal_code_publisher_is_included() {
    let test_dir = setup_test_environment("postal_include").unwrap();
    let files = corpus(&test_dir);
    let pipeline = run_pipeline(PipelineConfig::default(), &files, &RunOptions::default());

    let jazz = record(&pipeline, "jazzclub.com");
    assert_eq!(jazz.signal, DomainSignal::Neutral);
    assert_eq!(jazz.total_events, 5);
    assert_eq!(jazz.postal_matches, 5);
    assert_eq!(jazz.classification, Classification::Include);
    assert_eq!(jazz.decided_by, DecisionRule::Confident);
    assert_eq!(jazz.confidence, 1.0);
    assert!(jazz.match_reasons.contains(&"postal_code".to_string()));

    cleanup_test_environment(&test_dir);
}

#[test]
fn test_single_foreign_event_falls_to_low_score() {
    let test_dir = setup_test_environment("london_low_score").unwrap();
    let files = corpus(&test_dir);
    let pipeline = run_pipeline(PipelineConfig::default(), &files, &RunOptions::default());

    let pub_night = record(&pipeline, "pubnight.com");
    assert_eq!(pub_night.total_events, 1);
    assert_eq!(pub_night.anti_pattern_hits, 1);
    assert_eq!(pub_night.matched_events, 0);
    assert_eq!(pub_night.classification, Classification::Exclude);
    // below the sample floor, so the anti-pattern rule does not fire
    assert_eq!(pub_night.decided_by, DecisionRule::LowScore);
    assert_eq!(pub_night.confidence, 0.0);

    cleanup_test_environment(&test_dir);
}

#[test]
fn test_negative_domain_is_skipped_and_never_included() {
    let test_dir = setup_test_environment("negative_skip").unwrap();
    let files = corpus(&test_dir);
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    pipeline.classify_domains(&lookup());
    let report = pipeline.run(&files, &RunOptions::default());

    let festival = record(&pipeline, "festival.co.uk");
    assert_eq!(festival.signal, DomainSignal::Negative);
    assert_eq!(festival.classification, Classification::Exclude);
    assert_eq!(festival.decided_by, DecisionRule::NegativeSignal);
    assert_eq!(festival.total_events, 0);
    assert!(report.stats.skipped_negative > 0);

    cleanup_test_environment(&test_dir);
}

#[test]
fn test_revisiting_negative_domains_scores_them_on_evidence() {
    let test_dir = setup_test_environment("negative_revisit").unwrap();
    let files = corpus(&test_dir);
    let config = PipelineConfig { revisit_negative_domains: true, ..PipelineConfig::default() };
    let pipeline = run_pipeline(config, &files, &RunOptions::default());

    let festival = record(&pipeline, "festival.co.uk");
    assert_eq!(festival.signal, DomainSignal::Negative);
    assert_eq!(festival.total_events, 4);
    assert_eq!(festival.classification, Classification::Include);

    cleanup_test_environment(&test_dir);
}

#[test]
fn test_small_positive_sample_goes_to_review() {
    let test_dir = setup_test_environment("review_queue").unwrap();
    let files = corpus(&test_dir);
    let pipeline = run_pipeline(PipelineConfig::default(), &files, &RunOptions::default());

    let beats = record(&pipeline, "torontobeats.com");
    assert_eq!(beats.signal, DomainSignal::Positive);
    assert_eq!(beats.locality_matches, 1);
    assert_eq!(beats.classification, Classification::Unknown);
    assert_eq!(beats.decided_by, DecisionRule::InsufficientSample);

    let queue: Vec<&str> = pipeline.review_queue().iter().map(|r| r.domain.as_str()).collect();
    assert_eq!(queue, vec!["torontobeats.com"]);

    cleanup_test_environment(&test_dir);
}

#[test]
fn test_classifications_are_ranked_and_samples_bounded() {
    let test_dir = setup_test_environment("ranking").unwrap();
    let files = corpus(&test_dir);
    let pipeline = run_pipeline(PipelineConfig::default(), &files, &RunOptions::default());

    let ranked = pipeline.classifications();
    assert_eq!(ranked.len(), 4);
    assert_eq!(ranked[0].domain, "jazzclub.com");
    assert!(ranked.windows(2).all(|w| w[0].confidence >= w[1].confidence));

    let samples = pipeline.event_samples();
    assert_eq!(samples.len(), 3);
    assert!(samples.iter().all(|e| e.domain == "jazzclub.com" && e.location.is_some()));

    cleanup_test_environment(&test_dir);
}

#[test]
fn test_results_do_not_depend_on_worker_count() {
    let test_dir = setup_test_environment("determinism").unwrap();
    let mut files = corpus(&test_dir);
    for part in 2..6 {
        let content = pages(&format!("venue{}.com", part), part, &[("postalCode", "M4Y 1X5")]);
        files.push(write_plain(&test_dir, &format!("part-{}.nq", part), &content));
    }

    let collect = |workers: usize, files: &[PathBuf]| -> Vec<ClassificationRecord> {
        let config = PipelineConfig { workers, ..PipelineConfig::default() };
        let pipeline = run_pipeline(config, files, &RunOptions::default());
        let records: Vec<ClassificationRecord> = pipeline.classifications().into_iter().cloned().collect();
        records
    };

    let single = collect(1, &files);
    let pooled = collect(4, &files);
    let mut reversed_files = files.clone();
    reversed_files.reverse();
    let reversed = collect(3, &reversed_files);

    assert_eq!(single, pooled);
    assert_eq!(single, reversed);
    assert_eq!(
        serde_json::to_string(&single).unwrap(),
        serde_json::to_string(&reversed).unwrap()
    );

    cleanup_test_environment(&test_dir);
}

#[test]
fn test_failed_files_are_reported_and_skipped() {
    let test_dir = setup_test_environment("file_failures").unwrap();
    let mut files = corpus(&test_dir);
    files.push(PathBuf::from(format!("{}/missing.gz", test_dir)));
    let broken = PathBuf::from(format!("{}/broken.gz", test_dir));
    fs::write(&broken, [0x1f, 0x8b, 0x00, 0x42, 0x13, 0x37, 0x00, 0x00]).unwrap();
    files.push(broken);

    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    pipeline.classify_domains(&lookup());
    let report = pipeline.run(&files, &RunOptions::default());

    assert_eq!(report.files_processed, 2);
    assert_eq!(report.files_failed.len(), 2);
    assert!(report.files_failed.iter().any(|f| f.path.ends_with("missing.gz")));
    assert!(report.files_failed.iter().any(|f| f.path.ends_with("broken.gz")));
    assert_eq!(record(&pipeline, "jazzclub.com").classification, Classification::Include);

    cleanup_test_environment(&test_dir);
}

#[test]
fn test_only_files_restricts_the_run() {
    let test_dir = setup_test_environment("only_files").unwrap();
    let files = corpus(&test_dir);
    let options = RunOptions { only_files: vec!["part-0.gz".to_string()], ..Default::default() };
    let pipeline = run_pipeline(PipelineConfig::default(), &files, &options);

    assert_eq!(record(&pipeline, "jazzclub.com").total_events, 3);
    assert!(pipeline.classification("torontobeats.com").is_none());

    cleanup_test_environment(&test_dir);
}

#[test]
fn test_event_budget_stops_the_run() {
    let test_dir = setup_test_environment("event_budget").unwrap();
    let files = corpus(&test_dir);
    let mut pipeline = Pipeline::new(PipelineConfig { workers: 2, ..PipelineConfig::default() }).unwrap();
    pipeline.classify_domains(&lookup());
    let report = pipeline.run(&files, &RunOptions { max_events: Some(2), ..Default::default() });

    assert_eq!(report.stats.events_emitted, 2);
    assert_eq!(report.stopped, Some(StopReason::BudgetExhausted));
    let folded: u64 = pipeline.classifications().iter().map(|r| r.total_events).sum();
    assert_eq!(folded, 2);

    cleanup_test_environment(&test_dir);
}

#[test]
fn test_cancelled_run_still_classifies() {
    let test_dir = setup_test_environment("cancelled").unwrap();
    let files = corpus(&test_dir);
    let cancel = Arc::new(AtomicBool::new(true));
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    pipeline.classify_domains(&lookup());
    let report = pipeline.run(&files, &RunOptions { cancel: Some(cancel), ..Default::default() });

    assert_eq!(report.stopped, Some(StopReason::Cancelled));
    assert_eq!(report.stats.events_emitted, 0);

    cleanup_test_environment(&test_dir);
}

#[test]
fn test_manual_override_marks_record_reviewed() {
    let test_dir = setup_test_environment("override").unwrap();
    let files = corpus(&test_dir);
    let mut pipeline = run_pipeline(PipelineConfig::default(), &files, &RunOptions::default());

    pipeline.override_classification("torontobeats.com", Classification::Include).unwrap();
    let beats = record(&pipeline, "torontobeats.com");
    assert_eq!(beats.classification, Classification::Include);
    assert_eq!(beats.decided_by, DecisionRule::ManualOverride);
    assert!(beats.reviewed);
    assert!(pipeline.review_queue().is_empty());

    cleanup_test_environment(&test_dir);
}

#[test]
fn test_report_counts_classifications() {
    let test_dir = setup_test_environment("report_counts").unwrap();
    let files = corpus(&test_dir);
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    pipeline.classify_domains(&lookup());
    let report = pipeline.run(&files, &RunOptions::default());

    assert_eq!(report.files_processed, 2);
    assert!(report.files_failed.is_empty());
    assert_eq!(report.domains_with(Classification::Include), 1);
    assert_eq!(report.domains_with(Classification::Exclude), 2);
    assert_eq!(report.domains_with(Classification::Unknown), 1);
    assert_eq!(report.events_by_classification.get(&Classification::Include), Some(&5));
    assert_eq!(report.stats.malformed_lines, 0);
    assert_eq!(report.malformed_percent, 0.0);

    cleanup_test_environment(&test_dir);
}
